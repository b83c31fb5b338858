//! Locations and text layout helpers.

use crate::catalog::Catalog;
use crate::errors::{BattleResult, CatalogError, ValidationError};
use schema::LocationId;

/// Longest narration chunk the sequencer is handed.
pub const MAX_CHUNK_LINES: usize = 20;

/// Services, wild encounters and the numbered ways out of a location.
pub fn describe_location(catalog: &Catalog, id: LocationId) -> BattleResult<String> {
    let location = catalog.location(id).ok_or(CatalogError::UnknownLocation(id))?;
    let mut lines = vec![format!("== {} ==", location.name)];

    if location.has_center {
        lines.push("There is a POKEMON CENTER here: heal, deposit, withdraw, release.".to_string());
    }

    if location.spawns.is_empty() {
        lines.push("No wild monsters live here.".to_string());
    } else {
        let wild: Vec<String> = location
            .spawns
            .iter()
            .map(|entry| {
                let name = catalog
                    .species(entry.species)
                    .map_or("???", |s| s.name.as_str());
                format!("{} (Lv. {}-{})", name, entry.min_level, entry.max_level)
            })
            .collect();
        lines.push(format!("Wild: {}", wild.join(", ")));
    }

    lines.push("Travel to:".to_string());
    for (i, neighbor) in location.neighbors.iter().enumerate() {
        let name = catalog
            .location(*neighbor)
            .map_or("???", |l| l.name.as_str());
        lines.push(format!("{}. {}", i + 1, name));
    }
    Ok(lines.join("\n"))
}

/// Resolve a 0-based destination index against `from`'s neighbours.
pub fn destination(catalog: &Catalog, from: LocationId, index: usize) -> BattleResult<LocationId> {
    let location = catalog
        .location(from)
        .ok_or(CatalogError::UnknownLocation(from))?;
    let to = location
        .neighbors
        .get(index)
        .copied()
        .ok_or(ValidationError::InvalidDestination(index))?;
    Ok(to)
}

pub fn has_center(catalog: &Catalog, id: LocationId) -> bool {
    catalog.location(id).is_some_and(|l| l.has_center)
}

/// Split text into chunks of at most `per_chunk` lines. Lines are never broken.
pub fn paginate(text: &str, per_chunk: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    lines
        .chunks(per_chunk.max(1))
        .map(|chunk| chunk.join("\n"))
        .collect()
}
