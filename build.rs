use schema::{CatalogData, LocationData, LocationId, MoveData, SpeciesData, SpeciesId, TrainerTemplate};
use serde::Deserialize;
use std::collections::HashSet;
use std::{env, fs, path::PathBuf};

#[derive(Deserialize)]
struct WorldFile {
    start_location: LocationId,
    starters: Vec<SpeciesId>,
    starter_level: u8,
    locations: Vec<LocationData>,
    trainers: Vec<TrainerTemplate>,
}

fn read_ron<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> T {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    ron::from_str(&text).unwrap_or_else(|e| panic!("failed to parse {}: {}", path.display(), e))
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let data_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"))
        .join("data");

    let moves: Vec<MoveData> = read_ron(&data_dir.join("moves.ron"));
    let species: Vec<SpeciesData> = read_ron(&data_dir.join("species.ron"));
    let world: WorldFile = read_ron(&data_dir.join("world.ron"));

    // Cross-references are checked here so a bad data edit fails the build
    // instead of surfacing as a lookup error mid-battle.
    let known_moves: HashSet<_> = moves.iter().map(|m| m.move_).collect();
    let known_species: HashSet<_> = species.iter().map(|s| s.id).collect();
    for s in &species {
        for entry in &s.learnset {
            assert!(
                known_moves.contains(&entry.move_),
                "{} learns unknown move {:?}",
                s.name,
                entry.move_
            );
        }
    }
    let known_locations: HashSet<_> = world.locations.iter().map(|l| l.id).collect();
    assert!(known_locations.contains(&world.start_location), "unknown start location");
    for location in &world.locations {
        for neighbor in &location.neighbors {
            assert!(known_locations.contains(neighbor), "{} has unknown neighbor {}", location.name, neighbor);
        }
        for spawn in &location.spawns {
            assert!(known_species.contains(&spawn.species), "{} spawns unknown species {}", location.name, spawn.species);
            assert!(spawn.min_level <= spawn.max_level, "{} has an inverted level range", location.name);
        }
    }
    for id in world.starters.iter().chain(world.trainers.iter().flat_map(|t| t.squad.iter().map(|m| &m.species))) {
        assert!(known_species.contains(id), "unknown species {}", id);
    }

    let catalog = CatalogData {
        start_location: world.start_location,
        starters: world.starters,
        starter_level: world.starter_level,
        species,
        moves,
        locations: world.locations,
        trainers: world.trainers,
    };
    let bytes = catalog.to_bytes().expect("failed to encode catalog");
    fs::write(out_dir.join("catalog.bin"), bytes).expect("write catalog.bin");

    println!("cargo:rerun-if-changed=data/moves.ron");
    println!("cargo:rerun-if-changed=data/species.ron");
    println!("cargo:rerun-if-changed=data/world.ron");
}
