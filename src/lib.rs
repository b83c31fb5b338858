// In: src/lib.rs

//! Channel Monster Battle Engine
//!
//! A persistent-state, turn-based creature battle engine. Each channel hosts
//! at most one battle session; narration is released one chunk at a time
//! through a per-channel message sequencer. Reference data is compiled into
//! the binary at build time.

// --- MODULE DECLARATIONS ---
pub mod battle;
pub mod catalog;
pub mod combatant;
pub mod config;
pub mod errors;
pub mod ids;
pub mod persistence;
pub mod roster;
pub mod sequencer;
pub mod service;
pub mod world;

// --- PUBLIC API RE-EXPORTS ---

// --- From the `schema` crate ---
pub use schema::{
    BaseStats, LocationId, Move, MoveCategory, MoveData, MonsterType, SpeciesData, SpeciesId,
    StageStat, StatusCondition,
};

// --- From this crate's modules (`src/`) ---

// Battle session and its vocabulary.
pub use battle::opponent::Opponent;
pub use battle::rng::TurnRng;
pub use battle::session::{BattleSession, PlayerAction, Settlement};
pub use battle::state::{BattleEvent, EndReason, EventBus, SessionPhase, Side};

// Runtime types.
pub use catalog::Catalog;
pub use combatant::Combatant;
pub use config::EngineConfig;
pub use ids::{ChannelId, TrainerId};
pub use roster::Trainer;
pub use sequencer::{AdvanceSubscription, Chunk, ChunkId, MessageSequencer, NarrationSink};
pub use service::{BattleService, SessionEvent};

// Crate-specific error and result types.
pub use errors::{
    BattleError, BattleResult, CatalogError, ConfigError, RecordError, StateConflict, StoreError,
    ValidationError,
};
