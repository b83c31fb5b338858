use crate::battle::session::BattleSession;
use crate::battle::state::{BattleEvent, EventBus, Side};
use crate::combatant::Combatant;
use crate::errors::{BattleError, BattleResult};
use schema::{StageStat, StatusCondition};

/// Atomic commands representing final state changes
#[derive(Debug, Clone, PartialEq)]
pub enum BattleCommand {
    DealDamage {
        target: Side,
        amount: u16,
    },
    ChangeStatStage {
        target: Side,
        stat: StageStat,
        delta: i8,
    },
    SetStatus {
        target: Side,
        status: StatusCondition,
        sleep_turns: u8,
    },
    ClearStatus {
        target: Side,
    },
    SetSleepTurns {
        target: Side,
        turns: u8,
    },
    SetConfusion {
        target: Side,
        turns: u8,
    },
    SetFlinch {
        target: Side,
        flinched: bool,
    },
    UseMove {
        target: Side,
        move_slot: usize,
    },
    EmitEvent(BattleEvent),
}

/// Execute a batch of commands in order
pub fn execute_command_batch(
    commands: Vec<BattleCommand>,
    session: &mut BattleSession,
    bus: &mut EventBus,
) -> BattleResult<()> {
    for command in commands {
        execute_command(command, session, bus)?;
    }
    Ok(())
}

/// Helper function to execute commands that operate on an active combatant
fn with_active<F>(target: Side, session: &mut BattleSession, operation: F) -> BattleResult<()>
where
    F: FnOnce(&mut Combatant),
{
    let combatant = session
        .active_mut(target)
        .ok_or_else(|| BattleError::invariant(format!("no active combatant on {:?} side", target)))?;
    operation(combatant);
    Ok(())
}

pub fn execute_command(
    command: BattleCommand,
    session: &mut BattleSession,
    bus: &mut EventBus,
) -> BattleResult<()> {
    let label = target_of(&command)
        .map(|side| session.label(side))
        .unwrap_or_default();
    match command {
        BattleCommand::EmitEvent(event) => {
            bus.push(event);
            Ok(())
        }
        BattleCommand::DealDamage { target, amount } => {
            let mut fainted = false;
            let mut remaining_hp = 0;
            let mut max_hp = 0;
            with_active(target, session, |c| {
                fainted = c.apply_damage(amount);
                remaining_hp = c.hp();
                max_hp = c.max_hp();
            })?;
            bus.push(BattleEvent::DamageDealt {
                side: target,
                target: label.clone(),
                damage: amount,
                remaining_hp,
                max_hp,
            });
            if fainted {
                bus.push(BattleEvent::Fainted {
                    side: target,
                    name: label,
                });
            }
            Ok(())
        }
        BattleCommand::ChangeStatStage { target, stat, delta } => {
            let mut applied = 0;
            with_active(target, session, |c| applied = c.adjust_stage(stat, delta))?;
            bus.push(BattleEvent::StatStageChanged {
                target: label,
                stat,
                requested: delta,
                applied,
            });
            Ok(())
        }
        BattleCommand::SetStatus {
            target,
            status,
            sleep_turns,
        } => {
            let mut applied = false;
            with_active(target, session, |c| {
                applied = c.set_status(status);
                if applied && status == StatusCondition::Asleep {
                    c.volatile.sleep_turns = sleep_turns;
                }
            })?;
            if applied {
                bus.push(BattleEvent::StatusApplied { target: label, status });
            }
            Ok(())
        }
        BattleCommand::ClearStatus { target } => with_active(target, session, |c| c.clear_status()),
        BattleCommand::SetSleepTurns { target, turns } => {
            with_active(target, session, |c| c.volatile.sleep_turns = turns)
        }
        BattleCommand::SetConfusion { target, turns } => {
            let mut applied = false;
            with_active(target, session, |c| {
                if c.is_active() && !c.is_confused() {
                    c.volatile.confusion_turns = turns;
                    applied = true;
                }
            })?;
            if applied {
                bus.push(BattleEvent::ConfusionApplied { target: label });
            }
            Ok(())
        }
        BattleCommand::SetFlinch { target, flinched } => {
            with_active(target, session, |c| c.volatile.flinched = flinched)
        }
        BattleCommand::UseMove { target, move_slot } => {
            let mut spent = false;
            with_active(target, session, |c| {
                spent = c
                    .moves
                    .get_mut(move_slot)
                    .and_then(Option::as_mut)
                    .is_some_and(|slot| slot.use_move());
            })?;
            if spent {
                Ok(())
            } else {
                Err(BattleError::invariant(format!(
                    "move slot {} on {:?} side has no PP to spend",
                    move_slot, target
                )))
            }
        }
    }
}

fn target_of(command: &BattleCommand) -> Option<Side> {
    match command {
        BattleCommand::EmitEvent(_) => None,
        BattleCommand::DealDamage { target, .. }
        | BattleCommand::ChangeStatStage { target, .. }
        | BattleCommand::SetStatus { target, .. }
        | BattleCommand::ClearStatus { target }
        | BattleCommand::SetSleepTurns { target, .. }
        | BattleCommand::SetConfusion { target, .. }
        | BattleCommand::SetFlinch { target, .. }
        | BattleCommand::UseMove { target, .. } => Some(*target),
    }
}
