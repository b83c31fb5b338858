//! Read-only reference data: species, moves, locations and scripted trainers.
//!
//! Loaded once at startup and shared behind an `Arc`; nothing here is ever
//! mutated, so lookups need no locking.
use crate::battle::rng::TurnRng;
use crate::combatant::Combatant;
use crate::errors::{CatalogError, CatalogResult};
use schema::{
    CatalogData, LocationData, LocationId, Move, MoveData, SpeciesData, SpeciesId, TrainerTemplate,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

static BUILTIN_CATALOG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/catalog.bin"));

#[derive(Debug)]
pub struct Catalog {
    species: HashMap<SpeciesId, Arc<SpeciesData>>,
    species_by_name: HashMap<String, SpeciesId>,
    moves: HashMap<Move, Arc<MoveData>>,
    locations: HashMap<LocationId, LocationData>,
    trainers: Vec<TrainerTemplate>,
    start_location: LocationId,
    starters: Vec<SpeciesId>,
    starter_level: u8,
    dex_size: usize,
}

impl Catalog {
    /// The data compiled into the binary from `data/`.
    pub fn builtin() -> CatalogResult<Self> {
        Self::from_data(CatalogData::from_bytes(BUILTIN_CATALOG)?)
    }

    /// Load a replacement catalog written as a single RON document.
    pub fn from_ron_file(path: &Path) -> CatalogResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_data(ron::from_str(&text)?)
    }

    pub fn from_data(data: CatalogData) -> CatalogResult<Self> {
        let moves: HashMap<Move, Arc<MoveData>> = data
            .moves
            .into_iter()
            .map(|m| (m.move_, Arc::new(m)))
            .collect();
        for species in &data.species {
            if let Some(missing) = species.learnset.iter().find(|e| !moves.contains_key(&e.move_)) {
                return Err(CatalogError::UnknownMove(missing.move_));
            }
        }
        let dex_size = data.species.iter().map(|s| s.id.0 as usize + 1).max().unwrap_or(0);
        let species_by_name = data
            .species
            .iter()
            .map(|s| (normalize_name(&s.name), s.id))
            .collect();
        let species: HashMap<SpeciesId, Arc<SpeciesData>> = data
            .species
            .into_iter()
            .map(|s| (s.id, Arc::new(s)))
            .collect();
        let locations: HashMap<LocationId, LocationData> =
            data.locations.into_iter().map(|l| (l.id, l)).collect();
        if !locations.contains_key(&data.start_location) {
            return Err(CatalogError::UnknownLocation(data.start_location));
        }
        if let Some(missing) = data.starters.iter().find(|id| !species.contains_key(id)) {
            return Err(CatalogError::UnknownSpecies(*missing));
        }

        tracing::debug!(
            species = species.len(),
            moves = moves.len(),
            locations = locations.len(),
            "catalog loaded"
        );

        Ok(Catalog {
            species,
            species_by_name,
            moves,
            locations,
            trainers: data.trainers,
            start_location: data.start_location,
            starters: data.starters,
            starter_level: data.starter_level,
            dex_size,
        })
    }

    pub fn species(&self, id: SpeciesId) -> Option<&Arc<SpeciesData>> {
        self.species.get(&id)
    }

    /// Case- and spacing-insensitive lookup, so "nidoran f" finds NIDORAN F.
    pub fn species_by_name(&self, name: &str) -> Option<&Arc<SpeciesData>> {
        self.species_by_name
            .get(&normalize_name(name))
            .and_then(|id| self.species.get(id))
    }

    pub fn move_data(&self, move_: Move) -> Option<&Arc<MoveData>> {
        self.moves.get(&move_)
    }

    pub fn location(&self, id: LocationId) -> Option<&LocationData> {
        self.locations.get(&id)
    }

    pub fn trainers(&self) -> &[TrainerTemplate] {
        &self.trainers
    }

    pub fn start_location(&self) -> LocationId {
        self.start_location
    }

    pub fn starters(&self) -> &[SpeciesId] {
        &self.starters
    }

    pub fn starter_level(&self) -> u8 {
        self.starter_level
    }

    /// Length of a trainer's dex array: one slot per possible species id.
    pub fn dex_size(&self) -> usize {
        self.dex_size
    }

    /// A fresh combatant with the moves its species knows at `level`.
    pub fn create_combatant(&self, species: SpeciesId, level: u8) -> CatalogResult<Combatant> {
        let data = self
            .species
            .get(&species)
            .ok_or(CatalogError::UnknownSpecies(species))?;
        let moves = data
            .moves_at_level(level)
            .into_iter()
            .map(|m| self.moves.get(&m).cloned().ok_or(CatalogError::UnknownMove(m)))
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Combatant::new(Arc::clone(data), level, moves))
    }

    /// Roll a wild combatant from a location's spawn table, weighted by each
    /// species' spawn weight. `None` when the location has nothing to spawn.
    pub fn spawn(&self, location: LocationId, rng: &mut TurnRng) -> CatalogResult<Option<Combatant>> {
        let location = self
            .locations
            .get(&location)
            .ok_or(CatalogError::UnknownLocation(location))?;
        let weights: Vec<u32> = location
            .spawns
            .iter()
            .map(|entry| {
                self.species
                    .get(&entry.species)
                    .map(|s| s.spawn_weight as u32)
                    .ok_or(CatalogError::UnknownSpecies(entry.species))
            })
            .collect::<CatalogResult<_>>()?;
        let Some(index) = rng.weighted_index(&weights, "wild species") else {
            return Ok(None);
        };
        let entry = &location.spawns[index];
        let level = rng.in_range(entry.min_level..=entry.max_level, "wild level");
        self.create_combatant(entry.species, level).map(Some)
    }

    /// Pick a scripted trainer at random and build their squad.
    pub fn challenge(&self, rng: &mut TurnRng) -> CatalogResult<Option<(String, Vec<Combatant>)>> {
        if self.trainers.is_empty() {
            return Ok(None);
        }
        let template = &self.trainers[rng.next_below(self.trainers.len() as u32, "trainer") as usize];
        let squad = template
            .squad
            .iter()
            .map(|member| self.create_combatant(member.species, member.level))
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Some((template.name.clone(), squad)))
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
