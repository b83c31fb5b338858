// Monster Battle Schema - Shared reference-data definitions
// Everything here is read-only game data: it is authored as RON under data/,
// compiled to a postcard blob by the build script, and decoded by the engine.

pub use catalog_data::*;
pub use monster_types::*;
pub use moves::*;
pub use species_data::*;
pub use world::*;

pub mod catalog_data;
pub mod monster_types;
pub mod moves;
pub mod species_data;
pub mod world;
