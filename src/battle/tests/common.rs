use crate::battle::opponent::Opponent;
use crate::battle::rng::TurnRng;
use crate::battle::session::BattleSession;
use crate::catalog::Catalog;
use crate::combatant::Combatant;
use crate::config::EngineConfig;
use crate::ids::{ChannelId, TrainerId};
use crate::roster::Trainer;
use schema::{Move, MoveData, SpeciesId, StatusCondition};
use std::sync::{Arc, OnceLock};

/// The built-in catalog, decoded once per test binary.
pub fn test_catalog() -> Arc<Catalog> {
    static CATALOG: OnceLock<Arc<Catalog>> = OnceLock::new();
    CATALOG
        .get_or_init(|| Arc::new(Catalog::builtin().expect("built-in catalog should decode")))
        .clone()
}

pub fn move_data(move_: Move) -> Arc<MoveData> {
    match test_catalog().move_data(move_) {
        Some(data) => data.clone(),
        None => panic!("{:?} is missing from the catalog", move_),
    }
}

/// A builder for creating test combatants with common defaults.
///
/// # Example
/// ```ignore
/// let pikachu = TestCombatantBuilder::new(25, 25)
///     .with_moves(vec![Move::ThunderShock])
///     .with_status(StatusCondition::Paralyzed)
///     .build();
/// ```
pub struct TestCombatantBuilder {
    species: u16,
    level: u8,
    moves: Option<Vec<Move>>,
    status: Option<StatusCondition>,
    sleep_turns: Option<u8>,
    current_hp: Option<u16>,
}

impl TestCombatantBuilder {
    /// Creates a new builder for a given species id and level.
    pub fn new(species: u16, level: u8) -> Self {
        Self {
            species,
            level,
            moves: None,
            status: None,
            sleep_turns: None,
            current_hp: None,
        }
    }

    /// Replaces the learnset moves.
    pub fn with_moves(mut self, moves: Vec<Move>) -> Self {
        self.moves = Some(moves);
        self
    }

    pub fn with_status(mut self, status: StatusCondition) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_sleep_turns(mut self, turns: u8) -> Self {
        self.sleep_turns = Some(turns);
        self
    }

    /// Sets the current HP. If not set, HP will be max.
    pub fn with_hp(mut self, hp: u16) -> Self {
        self.current_hp = Some(hp);
        self
    }

    pub fn build(self) -> Combatant {
        let catalog = test_catalog();
        let mut combatant = match self.moves {
            None => catalog
                .create_combatant(SpeciesId(self.species), self.level)
                .unwrap_or_else(|err| panic!("failed to build species {}: {}", self.species, err)),
            Some(moves) => {
                let species = match catalog.species(SpeciesId(self.species)) {
                    Some(species) => species.clone(),
                    None => panic!("species {} is missing from the catalog", self.species),
                };
                Combatant::new(species, self.level, moves.into_iter().map(move_data).collect())
            }
        };

        // Status first: fainted combatants refuse new conditions.
        if let Some(status) = self.status {
            combatant.set_status(status);
        }
        if let Some(turns) = self.sleep_turns {
            combatant.volatile.sleep_turns = turns;
        }
        if let Some(hp) = self.current_hp {
            combatant.set_hp(hp);
        }
        combatant
    }
}

/// Creates a `TurnRng` instance with a long list of default values (50).
/// Useful for tests where the specific RNG outcome is not important, preventing panics from exhaustion.
pub fn predictable_rng() -> TurnRng {
    TurnRng::new_for_test(vec![50; 100])
}

/// A started trainer whose squad is exactly `squad`.
pub fn test_trainer(id: u64, squad: Vec<Combatant>) -> Trainer {
    let catalog = test_catalog();
    let mut trainer = Trainer::new(TrainerId(id), format!("TRAINER{}", id), &catalog);
    if let Err(err) = trainer.pick_starter("pikachu", &catalog) {
        panic!("starter pick failed: {}", err);
    }
    let mut battle_squad = trainer.enter_battle();
    battle_squad[0] = None;
    trainer.leave_battle(battle_squad);
    for combatant in squad {
        trainer.add_captured(combatant);
    }
    trainer
}

pub fn wild_session(wild: Combatant) -> BattleSession {
    session_against(Opponent::wild(wild))
}

pub fn session_against(opponent: Opponent) -> BattleSession {
    match BattleSession::new(ChannelId(1), opponent, &test_catalog(), &EngineConfig::default()) {
        Ok((session, _)) => session,
        Err(err) => panic!("failed to open session: {}", err),
    }
}
