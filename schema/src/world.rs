use crate::SpeciesId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub u16);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnEntry {
    pub species: SpeciesId,
    pub min_level: u8,
    pub max_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationData {
    pub id: LocationId,
    pub name: String,
    /// A healing center allows heal, deposit, withdraw and release.
    pub has_center: bool,
    pub neighbors: Vec<LocationId>,
    #[serde(default)]
    pub spawns: Vec<SpawnEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerMember {
    pub species: SpeciesId,
    pub level: u8,
}

/// A scripted opponent that can be challenged at any location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerTemplate {
    pub name: String,
    pub squad: Vec<TrainerMember>,
}
