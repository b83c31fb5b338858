use crate::{Move, MonsterType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// National index of a species. Also the slot it occupies in a trainer's dex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(pub u16);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:03}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub hp: u8,
    pub attack: u8,
    pub defense: u8,
    pub sp_attack: u8,
    pub sp_defense: u8,
    pub speed: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnEntry {
    pub level: u8,
    #[serde(rename = "move")]
    pub move_: Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesData {
    pub id: SpeciesId,
    pub name: String,
    pub types: Vec<MonsterType>,
    pub base_stats: BaseStats,
    /// Level-up moves in ascending level order.
    pub learnset: Vec<LearnEntry>,
    pub catch_rate: u8,
    /// Relative weight when this species appears in a location's spawn table.
    pub spawn_weight: u16,
    #[serde(default)]
    pub description: String,
}

impl SpeciesData {
    /// The most recent four moves learned at or below `level`.
    pub fn moves_at_level(&self, level: u8) -> Vec<Move> {
        let mut known: Vec<Move> = Vec::new();
        for entry in self.learnset.iter().filter(|e| e.level <= level) {
            if known.contains(&entry.move_) {
                continue;
            }
            if known.len() == 4 {
                known.remove(0);
            }
            known.push(entry.move_);
        }
        known
    }
}
