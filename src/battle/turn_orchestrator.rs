use crate::battle::ai::MoveChoice;
use crate::battle::calculators::{resolution_commands, resolve_move, MoveContext};
use crate::battle::catch::resolve_capture;
use crate::battle::commands::{execute_command_batch, BattleCommand};
use crate::battle::rng::TurnRng;
use crate::battle::session::{BattleSession, TurnAction};
use crate::battle::state::{BattleEvent, EndReason, EventBus, SessionPhase, Side};
use crate::battle::stats::effective_speed;
use crate::combatant::Combatant;
use crate::errors::{BattleError, BattleResult};
use schema::StatusCondition;

/// Main entry point for turn resolution.
/// Both pending actions must be queued. Runs one complete turn and returns
/// every event it produced, in order.
pub fn resolve_turn(session: &mut BattleSession, rng: &mut TurnRng) -> BattleResult<EventBus> {
    let mut bus = EventBus::new();

    // 1. Initialization
    session.phase = SessionPhase::Resolving;
    bus.push(BattleEvent::TurnStarted {
        turn_number: session.turn_number,
    });
    let player_action = session.pending[Side::Player.to_index()]
        .take()
        .ok_or_else(|| BattleError::invariant("player action missing at resolution"))?;
    let opponent_action = session.pending[Side::Opponent.to_index()]
        .take()
        .ok_or_else(|| BattleError::invariant("opponent action missing at resolution"))?;

    // 2. Priority phase: running and switching happen before any move.
    match player_action {
        TurnAction::Run => {
            bus.push(BattleEvent::Fled {
                trainer: session.trainer_name(Side::Player),
            });
            end_battle(session, EndReason::Flee, &mut bus);
            return Ok(bus);
        }
        TurnAction::Switch(target) => execute_switch(session, target, &mut bus)?,
        _ => {}
    }

    // 3. Remaining actions by speed.
    for (side, action) in determine_action_order(session, player_action, opponent_action, rng)? {
        if session.is_terminal() || !both_active(session) {
            break;
        }
        match action {
            TurnAction::Move(choice) => execute_move(session, side, choice, rng, &mut bus)?,
            TurnAction::Capture => execute_capture(session, rng, &mut bus)?,
            TurnAction::Switch(_) | TurnAction::Run => {}
        }
    }

    // 4. End-of-turn phase
    if !session.is_terminal() {
        execute_end_turn_phase(session, &mut bus)?;
    }

    // 5. Faints, replacements and finalization
    if !session.is_terminal() {
        check_faints(session, &mut bus);
    }
    finalize_turn(session, &mut bus);
    Ok(bus)
}

/// Bring in a replacement for a fainted player combatant. No turn passes.
pub fn resolve_replacement(session: &mut BattleSession, target: usize) -> BattleResult<EventBus> {
    let mut bus = EventBus::new();
    let slot = session
        .player
        .as_mut()
        .ok_or_else(|| BattleError::invariant("replacement without a participant"))?;
    slot.active = target;
    slot.awaiting_replacement = false;
    bus.push(BattleEvent::SentOut {
        side: Side::Player,
        trainer: session.trainer_name(Side::Player),
        name: session.label(Side::Player),
    });
    bus.push(session.move_menu());
    Ok(bus)
}

/// Orders the acting sides. Higher effective speed goes first; exact ties are
/// settled by a coin flip. Captures are ordered like moves.
pub(crate) fn determine_action_order(
    session: &BattleSession,
    player_action: TurnAction,
    opponent_action: TurnAction,
    rng: &mut TurnRng,
) -> BattleResult<Vec<(Side, TurnAction)>> {
    let acts = |a: &TurnAction| matches!(a, TurnAction::Move(_) | TurnAction::Capture);
    let mut order = Vec::with_capacity(2);
    if acts(&player_action) {
        order.push((Side::Player, player_action));
    }
    if acts(&opponent_action) {
        order.push((Side::Opponent, opponent_action));
    }
    if order.len() < 2 {
        return Ok(order);
    }

    let speed = |side: Side| -> BattleResult<u16> {
        session
            .active(side)
            .map(effective_speed)
            .ok_or_else(|| BattleError::invariant(format!("no active combatant on {:?} side", side)))
    };
    let (player_speed, opponent_speed) = (speed(Side::Player)?, speed(Side::Opponent)?);
    let player_first = match player_speed.cmp(&opponent_speed) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => rng.coin_flip("speed tie"),
    };
    if !player_first {
        order.reverse();
    }
    Ok(order)
}

fn both_active(session: &BattleSession) -> bool {
    [Side::Player, Side::Opponent]
        .iter()
        .all(|&side| session.active(side).is_some_and(Combatant::is_active))
}

fn execute_switch(session: &mut BattleSession, target: usize, bus: &mut EventBus) -> BattleResult<()> {
    let trainer = session.trainer_name(Side::Player);
    bus.push(BattleEvent::Withdrew {
        side: Side::Player,
        trainer: trainer.clone(),
        name: session.label(Side::Player),
    });
    if let Some(current) = session.active_mut(Side::Player) {
        current.withdraw();
    }
    let slot = session
        .player
        .as_mut()
        .ok_or_else(|| BattleError::invariant("switch without a participant"))?;
    slot.active = target;
    bus.push(BattleEvent::SentOut {
        side: Side::Player,
        trainer,
        name: session.label(Side::Player),
    });
    Ok(())
}

fn execute_move(
    session: &mut BattleSession,
    side: Side,
    choice: MoveChoice,
    rng: &mut TurnRng,
    bus: &mut EventBus,
) -> BattleResult<()> {
    let attacker = session
        .active(side)
        .ok_or_else(|| BattleError::invariant(format!("no attacker on {:?} side", side)))?;
    let defender = session
        .active(side.opponent())
        .ok_or_else(|| BattleError::invariant(format!("no defender for {:?} side", side)))?;
    let (move_data, move_slot) = match choice {
        MoveChoice::Slot(index) => {
            let slot = attacker
                .moves
                .get(index)
                .and_then(Option::as_ref)
                .ok_or_else(|| BattleError::invariant(format!("move slot {} is empty", index)))?;
            (slot.data.clone(), Some(index))
        }
        MoveChoice::Struggle => (session.struggle.clone(), None),
    };

    let resolution = resolve_move(attacker, &move_data, defender, &session.mechanics, rng);
    tracing::debug!(?side, move_used = %move_data.move_, outcome = ?resolution.outcome, damage = resolution.damage, "move resolved");

    let attacker_name = session.label(side);
    let defender_name = session.label(side.opponent());
    let ctx = MoveContext {
        attacker_side: side,
        attacker_name: &attacker_name,
        defender_name: &defender_name,
        move_name: &move_data.name,
        move_slot,
    };
    let commands = resolution_commands(&resolution, &ctx);
    execute_command_batch(commands, session, bus)
}

fn execute_capture(session: &mut BattleSession, rng: &mut TurnRng, bus: &mut EventBus) -> BattleResult<()> {
    let target = session
        .active(Side::Opponent)
        .ok_or_else(|| BattleError::invariant("capture without a target"))?;
    let resolution = resolve_capture(
        &session.trainer_name(Side::Player),
        target,
        &session.label(Side::Opponent),
        &session.capture,
        rng,
    );
    let narration = resolution
        .events
        .into_iter()
        .map(BattleCommand::EmitEvent)
        .collect();
    execute_command_batch(narration, session, bus)?;
    if resolution.success {
        end_battle(session, EndReason::Capture, bus);
    }
    Ok(())
}

/// Residual status damage, confusion countdown and flinch expiry.
fn execute_end_turn_phase(session: &mut BattleSession, bus: &mut EventBus) -> BattleResult<()> {
    for side in [Side::Player, Side::Opponent] {
        let Some(combatant) = session.active(side) else {
            continue;
        };
        if !combatant.is_active() {
            continue;
        }
        if let Some(status @ (StatusCondition::Poisoned | StatusCondition::Burned)) = combatant.status() {
            let damage = (combatant.max_hp() / session.mechanics.residual_divisor.max(1)).max(1);
            bus.push(BattleEvent::ResidualDamage {
                target: session.label(side),
                status,
                damage,
            });
            let fainted = session
                .active_mut(side)
                .is_some_and(|c| c.apply_damage(damage));
            if fainted {
                bus.push(BattleEvent::Fainted {
                    side,
                    name: session.label(side),
                });
            }
        }
    }

    for side in [Side::Player, Side::Opponent] {
        let label = session.label(side);
        let Some(combatant) = session.active_mut(side) else {
            continue;
        };
        combatant.volatile.flinched = false;
        if combatant.is_active() && combatant.is_confused() {
            combatant.volatile.confusion_turns -= 1;
            if combatant.volatile.confusion_turns == 0 {
                bus.push(BattleEvent::ConfusionEnded { target: label });
            }
        }
    }
    Ok(())
}

/// Decide what the fainting of either active combatant means for the battle.
fn check_faints(session: &mut BattleSession, bus: &mut EventBus) {
    let player_down = !session.active(Side::Player).is_some_and(Combatant::is_active);
    let opponent_down = !session.active(Side::Opponent).is_some_and(Combatant::is_active);
    if !player_down && !opponent_down {
        return;
    }

    let opponent_spent = opponent_down && session.opponent.on_faint().is_none();
    let player_spent = player_down
        && !session
            .player
            .as_ref()
            .is_some_and(|p| p.squad.iter().flatten().any(Combatant::is_active));

    match (player_spent, opponent_spent) {
        (true, true) => return end_battle(session, EndReason::MutualFaint, bus),
        (false, true) => return end_battle(session, EndReason::Win, bus),
        (true, false) => return end_battle(session, EndReason::Loss, bus),
        (false, false) => {}
    }

    if opponent_down {
        if let Some(next) = session.active(Side::Opponent) {
            let species = next.species_id();
            let name = next.name().to_string();
            if !session.seen.contains(&species) {
                session.seen.push(species);
            }
            bus.push(BattleEvent::SentOut {
                side: Side::Opponent,
                trainer: session.trainer_name(Side::Opponent),
                name,
            });
        }
    }
    if player_down {
        if let Some(slot) = session.player.as_mut() {
            slot.awaiting_replacement = true;
        }
        bus.push(BattleEvent::ReplacementNeeded {
            trainer: session.trainer_name(Side::Player),
        });
    }
}

fn end_battle(session: &mut BattleSession, reason: EndReason, bus: &mut EventBus) {
    session.phase = SessionPhase::Terminal(reason);
    bus.push(BattleEvent::BattleEnded { reason });
    tracing::info!(channel = %session.channel(), ?reason, "battle ended");
}

fn finalize_turn(session: &mut BattleSession, bus: &mut EventBus) {
    session.pending = [None, None];
    if session.is_terminal() {
        return;
    }
    session.turn_number += 1;
    session.phase = SessionPhase::AwaitingActions;
    if !session.is_awaiting_replacement() {
        bus.push(session.move_menu());
    }
}
