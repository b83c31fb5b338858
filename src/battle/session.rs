//! The per-channel battle session: participant binding, action validation and
//! the phase machine that drives turn resolution.

use crate::battle::ai::{Behavior, MoveChoice, ScoringBehavior, WildBehavior};
use crate::battle::catch::can_attempt_capture;
use crate::battle::opponent::Opponent;
use crate::battle::rng::TurnRng;
use crate::battle::state::{BattleEvent, EndReason, EventBus, SessionPhase, Side};
use crate::battle::turn_orchestrator;
use crate::catalog::Catalog;
use crate::combatant::Combatant;
use crate::config::{CaptureConfig, EngineConfig, Mechanics};
use crate::errors::{BattleError, BattleResult, CatalogError, StateConflict, ValidationError};
use crate::ids::{ChannelId, TrainerId};
use crate::roster::{Squad, Trainer};
use schema::{Move, MoveData, SpeciesId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A validated request from the player bound to the session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Fight { move_index: usize },
    Switch { target_index: usize },
    Capture,
    Run,
}

/// An action queued for resolution, for either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnAction {
    Move(MoveChoice),
    Switch(usize),
    Capture,
    Run,
}

#[derive(Debug, Clone)]
pub(crate) struct PlayerSlot {
    pub(crate) trainer: TrainerId,
    pub(crate) trainer_name: String,
    pub(crate) squad: Squad,
    pub(crate) active: usize,
    /// The active combatant fainted; only a switch is accepted.
    pub(crate) awaiting_replacement: bool,
}

/// What a finished (or aborted) session hands back to the roster.
#[derive(Debug)]
pub struct Settlement {
    pub trainer: Option<TrainerId>,
    pub squad: Option<Squad>,
    pub captured: Option<Combatant>,
    pub seen: Vec<SpeciesId>,
    /// `None` when the session was torn down before reaching a result.
    pub reason: Option<EndReason>,
}

#[derive(Debug)]
pub struct BattleSession {
    channel: ChannelId,
    pub(crate) phase: SessionPhase,
    pub(crate) player: Option<PlayerSlot>,
    pub(crate) opponent: Opponent,
    pub(crate) pending: [Option<TurnAction>; 2],
    pub(crate) turn_number: u32,
    pub(crate) seen: Vec<SpeciesId>,
    pub(crate) mechanics: Mechanics,
    pub(crate) capture: CaptureConfig,
    pub(crate) struggle: Arc<MoveData>,
}

impl BattleSession {
    /// Open a session against `opponent` and narrate its arrival.
    pub fn new(
        channel: ChannelId,
        opponent: Opponent,
        catalog: &Catalog,
        config: &EngineConfig,
    ) -> BattleResult<(Self, EventBus)> {
        let struggle = catalog
            .move_data(Move::Struggle)
            .cloned()
            .ok_or(CatalogError::UnknownMove(Move::Struggle))?;
        let lead = opponent
            .active()
            .ok_or_else(|| BattleError::invariant("opponent has no combatant"))?;

        let mut bus = EventBus::new();
        match opponent.trainer_name() {
            None => bus.push(BattleEvent::WildAppeared {
                name: lead.name().to_string(),
                level: lead.level(),
            }),
            Some(trainer) => {
                bus.push(BattleEvent::TrainerChallenge {
                    trainer: trainer.to_string(),
                });
                bus.push(BattleEvent::SentOut {
                    side: Side::Opponent,
                    trainer: trainer.to_string(),
                    name: lead.name().to_string(),
                });
            }
        }
        bus.push(BattleEvent::Prompt {
            text: "Use join to step in!".to_string(),
        });
        let seen = vec![lead.species_id()];

        tracing::info!(%channel, opponent = %opponent.label(), "session opened");

        let session = BattleSession {
            channel,
            phase: SessionPhase::AwaitingOpponent,
            player: None,
            opponent,
            pending: [None, None],
            turn_number: 1,
            seen,
            mechanics: config.mechanics.clone(),
            capture: config.capture.clone(),
            struggle,
        };
        Ok((session, bus))
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn opponent(&self) -> &Opponent {
        &self.opponent
    }

    /// The trainer bound to the player side, if any.
    pub fn participant(&self) -> Option<TrainerId> {
        self.player.as_ref().map(|p| p.trainer)
    }

    pub fn is_awaiting_replacement(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.awaiting_replacement)
    }

    pub fn active(&self, side: Side) -> Option<&Combatant> {
        match side {
            Side::Player => self
                .player
                .as_ref()
                .and_then(|p| p.squad.get(p.active))
                .and_then(Option::as_ref),
            Side::Opponent => self.opponent.active(),
        }
    }

    pub fn active_mut(&mut self, side: Side) -> Option<&mut Combatant> {
        match side {
            Side::Player => self
                .player
                .as_mut()
                .and_then(|p| p.squad.get_mut(p.active))
                .and_then(Option::as_mut),
            Side::Opponent => self.opponent.active_mut(),
        }
    }

    /// Narration label for a side's active combatant.
    pub fn label(&self, side: Side) -> String {
        match side {
            Side::Player => self
                .active(Side::Player)
                .map_or_else(|| "???".to_string(), |c| c.name().to_string()),
            Side::Opponent => self.opponent.label(),
        }
    }

    pub(crate) fn trainer_name(&self, side: Side) -> String {
        match side {
            Side::Player => self
                .player
                .as_ref()
                .map(|p| p.trainer_name.clone())
                .unwrap_or_default(),
            Side::Opponent => self.opponent.trainer_name().unwrap_or("").to_string(),
        }
    }

    /// Bind `trainer` to the empty player slot. Their squad moves into the
    /// session until it settles. `choice` names a squad index; `None` sends
    /// out the first member able to battle.
    pub fn join(&mut self, trainer: &mut Trainer, choice: Option<usize>) -> BattleResult<EventBus> {
        if !trainer.is_started() {
            return Err(ValidationError::NotStarted.into());
        }
        if self.is_terminal() {
            return Err(ValidationError::NoSession.into());
        }
        if self.player.is_some() {
            return Err(ValidationError::SessionFull.into());
        }
        if trainer.in_battle() {
            return Err(StateConflict::TrainerInBattle.into());
        }
        let active = match choice {
            Some(index) => {
                let combatant = trainer
                    .squad()
                    .get(index)
                    .and_then(Option::as_ref)
                    .ok_or(ValidationError::InvalidSquadIndex(index))?;
                if !combatant.is_active() {
                    return Err(ValidationError::CombatantCannotBattle(combatant.name().to_string()).into());
                }
                index
            }
            None => trainer
                .first_eligible()
                .ok_or(ValidationError::NoEligibleCombatant)?,
        };

        for &species in &self.seen {
            trainer.mark_seen(species);
        }
        let squad = trainer.enter_battle();
        let trainer_name = trainer.name().to_string();
        tracing::info!(channel = %self.channel, trainer = %trainer.id(), "trainer joined");

        self.player = Some(PlayerSlot {
            trainer: trainer.id(),
            trainer_name: trainer_name.clone(),
            squad,
            active,
            awaiting_replacement: false,
        });
        self.phase = SessionPhase::AwaitingActions;

        let mut bus = EventBus::new();
        bus.push(BattleEvent::TrainerJoined {
            trainer: trainer_name.clone(),
        });
        bus.push(BattleEvent::SentOut {
            side: Side::Player,
            trainer: trainer_name,
            name: self.label(Side::Player),
        });
        bus.push(self.move_menu());
        Ok(bus)
    }

    /// Record the player's action for this turn. The opponent's action is
    /// chosen automatically, so a valid submission resolves the turn.
    pub fn submit_action(
        &mut self,
        trainer: TrainerId,
        action: PlayerAction,
        rng: &mut TurnRng,
    ) -> BattleResult<EventBus> {
        match self.phase {
            SessionPhase::Terminal(_) => return Err(ValidationError::NoSession.into()),
            SessionPhase::AwaitingOpponent => return Err(ValidationError::NotParticipant.into()),
            SessionPhase::Resolving => {
                return Err(BattleError::invariant("action submitted while a turn was resolving"))
            }
            SessionPhase::AwaitingActions => {}
        }
        let slot = self
            .player
            .as_ref()
            .filter(|p| p.trainer == trainer)
            .ok_or(ValidationError::NotParticipant)?;
        if self.pending[Side::Player.to_index()].is_some() {
            return Err(ValidationError::AlreadySubmitted.into());
        }

        if slot.awaiting_replacement {
            let PlayerAction::Switch { target_index } = action else {
                return Err(ValidationError::ReplacementRequired.into());
            };
            self.validate_switch(target_index)?;
            return turn_orchestrator::resolve_replacement(self, target_index);
        }

        let queued = self.validate_action(action)?;
        let reply = self.decide_opponent_action(rng)?;
        self.pending = [Some(queued), Some(reply)];
        tracing::debug!(channel = %self.channel, ?queued, ?reply, "actions collected");
        turn_orchestrator::resolve_turn(self, rng)
    }

    fn validate_action(&self, action: PlayerAction) -> Result<TurnAction, ValidationError> {
        match action {
            PlayerAction::Fight { move_index } => {
                let slot = self
                    .active(Side::Player)
                    .and_then(|c| c.moves.get(move_index))
                    .and_then(Option::as_ref)
                    .ok_or(ValidationError::InvalidMoveIndex(move_index))?;
                if slot.pp > 0 {
                    return Ok(TurnAction::Move(MoveChoice::Slot(move_index)));
                }
                let out_of_pp = self
                    .active(Side::Player)
                    .is_some_and(|c| c.moves.iter().flatten().all(|m| m.pp == 0));
                if out_of_pp {
                    return Ok(TurnAction::Move(MoveChoice::Struggle));
                }
                Err(ValidationError::NoPpRemaining(slot.data.name.clone()))
            }
            PlayerAction::Switch { target_index } => {
                self.validate_switch(target_index)?;
                Ok(TurnAction::Switch(target_index))
            }
            PlayerAction::Capture => {
                can_attempt_capture(&self.opponent)?;
                Ok(TurnAction::Capture)
            }
            PlayerAction::Run => {
                if !self.opponent.is_capturable() {
                    return Err(ValidationError::CannotRunFromTrainer);
                }
                Ok(TurnAction::Run)
            }
        }
    }

    fn validate_switch(&self, target_index: usize) -> Result<(), ValidationError> {
        let slot = self.player.as_ref().ok_or(ValidationError::NotParticipant)?;
        let target = slot
            .squad
            .get(target_index)
            .and_then(Option::as_ref)
            .ok_or(ValidationError::InvalidSquadIndex(target_index))?;
        if !target.is_active() {
            return Err(ValidationError::CombatantCannotBattle(target.name().to_string()));
        }
        if target_index == slot.active {
            return Err(ValidationError::AlreadyActive(target.name().to_string()));
        }
        Ok(())
    }

    fn decide_opponent_action(&self, rng: &mut TurnRng) -> BattleResult<TurnAction> {
        let attacker = self
            .active(Side::Opponent)
            .ok_or_else(|| BattleError::invariant("opponent has no active combatant"))?;
        let defender = self
            .active(Side::Player)
            .ok_or_else(|| BattleError::invariant("player has no active combatant"))?;
        let behavior: &dyn Behavior = if self.opponent.is_capturable() {
            &WildBehavior
        } else {
            &ScoringBehavior
        };
        Ok(TurnAction::Move(behavior.decide_move(
            attacker,
            defender,
            &self.mechanics,
            rng,
        )))
    }

    /// "What will X do?" with the move list, the squad and the remaining options.
    pub(crate) fn move_menu(&self) -> BattleEvent {
        let Some(slot) = self.player.as_ref() else {
            return BattleEvent::Prompt { text: String::new() };
        };
        let mut lines = vec![format!("What will {} do?", self.label(Side::Player))];
        if let Some(active) = self.active(Side::Player) {
            let moves: Vec<String> = active
                .moves
                .iter()
                .enumerate()
                .filter_map(|(i, m)| m.as_ref().map(|m| (i, m)))
                .map(|(i, m)| format!("{}. {} {}/{}", i + 1, m.data.name, m.pp, m.max_pp()))
                .collect();
            lines.push(format!("FIGHT: {}", moves.join(" | ")));
        }
        let squad: Vec<String> = slot
            .squad
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
            .map(|(i, c)| {
                let marker = if i == slot.active { "*" } else { "" };
                format!("{}. {}{} {}/{}", i + 1, c.name(), marker, c.hp(), c.max_hp())
            })
            .collect();
        lines.push(format!("SWITCH: {}", squad.join(" | ")));
        if self.opponent.is_capturable() {
            lines.push("CATCH | RUN".to_string());
        }
        BattleEvent::Prompt {
            text: lines.join("\n"),
        }
    }

    /// Consume the session. Squad members get their end-of-battle reset and
    /// a captured wild combatant is detached for its new owner.
    pub fn settle(self, rng: &mut TurnRng) -> Settlement {
        let reason = match self.phase {
            SessionPhase::Terminal(reason) => Some(reason),
            _ => None,
        };
        let sleep_turns = self.mechanics.sleep_turns();
        let (trainer, squad) = match self.player {
            Some(mut slot) => {
                for combatant in slot.squad.iter_mut().flatten() {
                    combatant.end_of_battle_reset(rng, sleep_turns.clone());
                }
                (Some(slot.trainer), Some(slot.squad))
            }
            None => (None, None),
        };
        let captured = match reason {
            Some(EndReason::Capture) => self.opponent.into_captured().map(|mut c| {
                c.end_of_battle_reset(rng, sleep_turns.clone());
                c
            }),
            _ => None,
        };
        Settlement {
            trainer,
            squad,
            captured,
            seen: self.seen,
            reason,
        }
    }
}
