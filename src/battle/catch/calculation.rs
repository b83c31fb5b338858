use crate::battle::rng::TurnRng;
use crate::combatant::Combatant;
use crate::config::CaptureConfig;
use schema::StatusCondition;

/// Capture probability in `[0, 1]`.
/// `((3M - 2H) * rate * ball * status) / (3M * 255)`, capped at 1.
pub fn capture_probability(
    max_hp: u16,
    current_hp: u16,
    catch_rate: u8,
    status: Option<StatusCondition>,
    config: &CaptureConfig,
) -> f64 {
    let max_hp = max_hp.max(1) as f64;
    let current_hp = (current_hp as f64).min(max_hp);
    let hp_factor = (3.0 * max_hp - 2.0 * current_hp) / (3.0 * max_hp);
    let status_multiplier = calculate_status_multiplier(status, config);
    let probability = hp_factor * catch_rate as f64 * config.ball_modifier * status_multiplier / 255.0;
    probability.clamp(0.0, 1.0)
}

pub fn capture_probability_for(target: &Combatant, config: &CaptureConfig) -> f64 {
    capture_probability(
        target.max_hp(),
        target.hp(),
        target.species().catch_rate,
        target.status(),
        config,
    )
}

/// Calculate status condition multiplier for capture
fn calculate_status_multiplier(status: Option<StatusCondition>, config: &CaptureConfig) -> f64 {
    match status {
        Some(StatusCondition::Asleep) | Some(StatusCondition::Frozen) => config.sleep_freeze_bonus,
        Some(_) => config.other_status_bonus,
        None => 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRoll {
    pub success: bool,
    /// Checks passed before the target broke free.
    pub shakes: u8,
}

/// Roll the shake checks. Each check passes with `p^(1/checks)`, so passing
/// all of them happens with probability `p`.
pub fn roll_capture(probability: f64, checks: u8, rng: &mut TurnRng) -> CaptureRoll {
    let checks = checks.max(1);
    if probability >= 1.0 {
        return CaptureRoll {
            success: true,
            shakes: checks,
        };
    }
    let threshold = probability.max(0.0).powf(1.0 / checks as f64);
    let mut shakes = 0;
    while shakes < checks {
        if rng.next_fraction("capture shake") >= threshold {
            return CaptureRoll {
                success: false,
                shakes,
            };
        }
        shakes += 1;
    }
    CaptureRoll {
        success: true,
        shakes,
    }
}

/// Get a descriptive capture chance category for display purposes
pub fn get_capture_rate_description(probability: f64) -> &'static str {
    match probability {
        p if p >= 0.8 => "Excellent",
        p if p >= 0.6 => "Very Good",
        p if p >= 0.4 => "Good",
        p if p >= 0.2 => "Fair",
        p if p >= 0.1 => "Poor",
        _ => "Very Poor",
    }
}
