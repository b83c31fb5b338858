//! Engine configuration.
//!
//! Every tunable constant of the battle rules lives here with its default, so
//! a deployment can adjust balance from a RON file without touching code.
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const SAVE_DIR_VAR: &str = "MONSTER_BATTLE_SAVE_DIR";
pub const SEED_VAR: &str = "MONSTER_BATTLE_SEED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory that holds one roster record per trainer.
    pub save_dir: PathBuf,
    /// Storage entries shown per roster page.
    pub entries_per_page: usize,
    /// Fixed seed for every random draw. `None` seeds from the OS.
    pub seed: Option<u64>,
    pub mechanics: Mechanics,
    pub capture: CaptureConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("userdata"),
            entries_per_page: 20,
            seed: None,
            mechanics: Mechanics::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = ron::from_str(&text)?;
        config.with_env_overrides()
    }

    /// Environment variables:
    /// - `MONSTER_BATTLE_SAVE_DIR` - roster directory
    /// - `MONSTER_BATTLE_SEED` - fixed RNG seed
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(dir) = env::var(SAVE_DIR_VAR) {
            self.save_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var(SEED_VAR) {
            let seed = raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                var: SEED_VAR,
                value: raw.clone(),
            })?;
            self.seed = Some(seed);
        }
        Ok(self)
    }
}

/// Battle rule constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mechanics {
    /// Poison and burn deal max HP divided by this at end of turn.
    pub residual_divisor: u16,
    pub confusion_self_hit_percent: u8,
    pub thaw_percent: u8,
    pub full_paralysis_percent: u8,
    pub confusion_min_turns: u8,
    pub confusion_max_turns: u8,
    pub sleep_min_turns: u8,
    pub sleep_max_turns: u8,
    pub confusion_self_hit_power: u8,
    pub stab_multiplier: f64,
    /// Damage variance floor in percent. The ceiling is always 100.
    pub variance_min_percent: u8,
}

impl Default for Mechanics {
    fn default() -> Self {
        Self {
            residual_divisor: 8,
            confusion_self_hit_percent: 50,
            thaw_percent: 20,
            full_paralysis_percent: 25,
            confusion_min_turns: 2,
            confusion_max_turns: 5,
            sleep_min_turns: 1,
            sleep_max_turns: 7,
            confusion_self_hit_power: 40,
            stab_multiplier: 1.5,
            variance_min_percent: 85,
        }
    }
}

impl Mechanics {
    pub fn sleep_turns(&self) -> RangeInclusive<u8> {
        self.sleep_min_turns..=self.sleep_max_turns.max(self.sleep_min_turns)
    }

    pub fn confusion_turns(&self) -> RangeInclusive<u8> {
        self.confusion_min_turns..=self.confusion_max_turns.max(self.confusion_min_turns)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub ball_modifier: f64,
    pub sleep_freeze_bonus: f64,
    pub other_status_bonus: f64,
    /// Number of independent checks a capture must pass.
    pub shake_checks: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ball_modifier: 1.0,
            sleep_freeze_bonus: 2.0,
            other_status_bonus: 1.5,
            shake_checks: 4,
        }
    }
}
