use crate::{LocationData, LocationId, MoveData, SpeciesData, SpeciesId, TrainerTemplate};
use serde::{Deserialize, Serialize};

/// The whole reference-data bundle, as authored and as shipped in the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogData {
    pub start_location: LocationId,
    pub starters: Vec<SpeciesId>,
    pub starter_level: u8,
    pub species: Vec<SpeciesData>,
    pub moves: Vec<MoveData>,
    pub locations: Vec<LocationData>,
    pub trainers: Vec<TrainerTemplate>,
}

impl CatalogData {
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
