use schema::{LocationId, Move, SpeciesId};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the battle engine.
///
/// Validation and state-conflict errors are rejections of a request: nothing
/// was mutated and the caller can simply report them. `Invariant` means the
/// engine found itself in a state it should never reach; the owning session
/// is torn down when this surfaces.
#[derive(Debug, Error)]
pub enum BattleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    StateConflict(#[from] StateConflict),
    #[error("internal battle error: {0}")]
    Invariant(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BattleError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        BattleError::Invariant(detail.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BattleError::Validation(_))
    }

    pub fn is_state_conflict(&self) -> bool {
        matches!(self, BattleError::StateConflict(_))
    }
}

/// A request that is malformed or not allowed right now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("you have not picked a starter yet")]
    NotStarted,
    #[error("you have already started your adventure")]
    AlreadyStarted,
    #[error("{0} is not one of the starters")]
    NotAStarter(String),
    #[error("there is no battle in this channel")]
    NoSession,
    #[error("someone is already battling here")]
    SessionFull,
    #[error("you are not part of this battle")]
    NotParticipant,
    #[error("you have already chosen an action this turn")]
    AlreadySubmitted,
    #[error("you have no monster able to battle")]
    NoEligibleCombatant,
    #[error("{0} is unable to battle")]
    CombatantCannotBattle(String),
    #[error("there is no move in slot {0}")]
    InvalidMoveIndex(usize),
    #[error("there's no PP left for {0}")]
    NoPpRemaining(String),
    #[error("there is no monster in slot {0}")]
    InvalidSquadIndex(usize),
    #[error("there is no stored monster at index {0}")]
    InvalidStorageIndex(usize),
    #[error("{0} is already out")]
    AlreadyActive(String),
    #[error("you must send out a replacement first")]
    ReplacementRequired,
    #[error("you can't catch a trainer's monster")]
    NotCapturable,
    #[error("you can't run from a trainer battle")]
    CannotRunFromTrainer,
    #[error("this location has no healing center")]
    NoHealingCenter,
    #[error("you can't deposit your last monster")]
    LastCombatant,
    #[error("your squad is full")]
    SquadFull,
    #[error("there is nothing to confirm")]
    NothingToConfirm,
    #[error("unknown species {0}")]
    UnknownSpecies(String),
    #[error("there is no destination {0} from here")]
    InvalidDestination(usize),
    #[error("nothing lives at {0}")]
    NoWildSpawns(String),
    #[error("there is nobody around to challenge")]
    NoChallengers,
    #[error("page {0} is out of range")]
    InvalidPage(usize),
}

/// A request that collides with existing state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("a battle is already in progress in this channel")]
    SessionExists,
    #[error("you are already in a battle")]
    TrainerInBattle,
    #[error("you can't do that during a battle")]
    BattleInProgress,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to decode catalog: {0}")]
    Decode(#[from] postcard::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown species {0}")]
    UnknownSpecies(SpeciesId),
    #[error("unknown move {0}")]
    UnknownMove(Move),
    #[error("unknown location {0}")]
    UnknownLocation(LocationId),
}

/// Problems reading a persisted roster record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is missing the {0} section")]
    MissingSection(&'static str),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: unknown species {id}")]
    UnknownSpecies { line: usize, id: u16 },
    #[error("line {line}: unknown move {name}")]
    UnknownMove { line: usize, name: String },
}

impl RecordError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        RecordError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid value {value:?} for {var}")]
    InvalidOverride { var: &'static str, value: String },
}

pub type BattleResult<T> = Result<T, BattleError>;
pub type CatalogResult<T> = Result<T, CatalogError>;
