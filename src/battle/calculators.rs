use crate::battle::commands::BattleCommand;
use crate::battle::rng::TurnRng;
use crate::battle::state::{BattleEvent, Side};
use crate::battle::stats::{effective_attack, effective_defense, move_hits};
use crate::combatant::Combatant;
use crate::config::Mechanics;
use schema::{EffectTarget, Move, MoveCategory, MoveData, StageStat, StatusCondition};

/// Why a combatant did not get to use its move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prevention {
    Frozen,
    Asleep,
    Flinched,
    HurtItself,
    FullyParalyzed,
}

/// How a move attempt played out. Drives narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Prevented(Prevention),
    Missed,
    /// The defender's type is immune to the move.
    NoEffect,
    Hit,
    /// A status move went through and did something.
    Applied,
    /// A status move connected but nothing could change.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageChange {
    pub target: EffectTarget,
    pub stat: StageStat,
    pub delta: i8,
}

/// Everything one move attempt decided. Computed without touching either
/// combatant; turned into commands by [`resolution_commands`].
#[derive(Debug, Clone, PartialEq)]
pub struct MoveResolution {
    pub move_used: Move,
    pub outcome: MoveOutcome,
    pub thawed: bool,
    /// Sleep counter after this attempt, when the attacker was asleep.
    pub sleep_turns_left: Option<u8>,
    pub woke_up: bool,
    pub confused: bool,
    pub self_damage: u16,
    pub hit: bool,
    pub damage: u16,
    pub effectiveness: f32,
    pub stage_changes: Vec<StageChange>,
    pub status_inflicted: Option<StatusCondition>,
    pub sleep_turns: u8,
    pub confusion_turns: Option<u8>,
    pub flinched: bool,
}

impl MoveResolution {
    fn new(move_used: Move) -> Self {
        Self {
            move_used,
            outcome: MoveOutcome::Failed,
            thawed: false,
            sleep_turns_left: None,
            woke_up: false,
            confused: false,
            self_damage: 0,
            hit: false,
            damage: 0,
            effectiveness: 1.0,
            stage_changes: Vec::new(),
            status_inflicted: None,
            sleep_turns: 0,
            confusion_turns: None,
            flinched: false,
        }
    }

    /// Whether the move itself was executed (and so spends PP).
    pub fn move_executed(&self) -> bool {
        !matches!(self.outcome, MoveOutcome::Prevented(_))
    }
}

/// Core damage formula.
/// `((2L/5 + 2) * P * A / D) / 50 + 2`, then scaled by `modifier`.
/// A connecting hit always deals at least 1.
pub fn calculate_damage(level: u8, power: u8, attack: u16, defense: u16, modifier: f64) -> u16 {
    let level = level as u32;
    let base = ((2 * level / 5 + 2) * power as u32 * attack as u32 / defense.max(1) as u32) / 50 + 2;
    let modified = (base as f64 * modifier).floor();
    (modified as u16).max(1)
}

fn roll_variance(mechanics: &Mechanics, rng: &mut TurnRng) -> f64 {
    let percent = rng.in_range(mechanics.variance_min_percent.min(100)..=100, "damage variance");
    percent as f64 / 100.0
}

/// Confusion self-hit: a typeless physical strike with the attacker's own stats.
fn self_hit_damage(attacker: &Combatant, mechanics: &Mechanics, rng: &mut TurnRng) -> u16 {
    let attack = effective_attack(attacker, MoveCategory::Physical);
    let defense = effective_defense(attacker, MoveCategory::Physical);
    let variance = roll_variance(mechanics, rng);
    calculate_damage(
        attacker.level(),
        mechanics.confusion_self_hit_power,
        attack,
        defense,
        variance,
    )
}

/// Resolve one move attempt.
///
/// Random draws happen in a fixed order: thaw, confusion self-hit (and its
/// variance), full paralysis, accuracy, damage variance, then each secondary
/// effect. Guaranteed effects consume no roll.
pub fn resolve_move(
    attacker: &Combatant,
    move_data: &MoveData,
    defender: &Combatant,
    mechanics: &Mechanics,
    rng: &mut TurnRng,
) -> MoveResolution {
    let mut res = MoveResolution::new(move_data.move_);

    // Volatile pre-checks, in order.
    match attacker.status() {
        Some(StatusCondition::Frozen) => {
            res.thawed = rng.chance(mechanics.thaw_percent, "thaw");
            res.outcome = MoveOutcome::Prevented(Prevention::Frozen);
            return res;
        }
        Some(StatusCondition::Asleep) => {
            let left = attacker.volatile.sleep_turns.saturating_sub(1);
            res.sleep_turns_left = Some(left);
            if left > 0 {
                res.outcome = MoveOutcome::Prevented(Prevention::Asleep);
                return res;
            }
            res.woke_up = true;
        }
        _ => {}
    }

    if attacker.volatile.flinched {
        res.outcome = MoveOutcome::Prevented(Prevention::Flinched);
        return res;
    }

    if attacker.is_confused() {
        res.confused = true;
        if rng.chance(mechanics.confusion_self_hit_percent, "confusion self-hit") {
            res.self_damage = self_hit_damage(attacker, mechanics, rng);
            res.outcome = MoveOutcome::Prevented(Prevention::HurtItself);
            return res;
        }
    }

    if attacker.status() == Some(StatusCondition::Paralyzed)
        && rng.chance(mechanics.full_paralysis_percent, "full paralysis")
    {
        res.outcome = MoveOutcome::Prevented(Prevention::FullyParalyzed);
        return res;
    }

    if !move_hits(attacker, move_data, rng) {
        res.outcome = MoveOutcome::Missed;
        return res;
    }

    let effectiveness = move_data.move_type.effectiveness_against(&defender.species().types);
    res.effectiveness = effectiveness;

    let mut defender_faints = false;
    if move_data.is_damaging() {
        if effectiveness == 0.0 {
            res.outcome = MoveOutcome::NoEffect;
            return res;
        }
        let attack = effective_attack(attacker, move_data.category);
        let defense = effective_defense(defender, move_data.category);
        let stab = if attacker.species().types.contains(&move_data.move_type) {
            mechanics.stab_multiplier
        } else {
            1.0
        };
        let variance = roll_variance(mechanics, rng);
        res.damage = calculate_damage(
            attacker.level(),
            move_data.power.unwrap_or(0),
            attack,
            defense,
            stab * effectiveness as f64 * variance,
        );
        res.hit = true;
        res.outcome = MoveOutcome::Hit;
        defender_faints = res.damage >= defender.hp();
    } else {
        if move_data.status_effect.is_some() && effectiveness == 0.0 {
            res.outcome = MoveOutcome::NoEffect;
            return res;
        }
        res.hit = true;
    }

    // Secondary effects. Effects aimed at a defender that is about to faint are skipped.
    for effect in &move_data.stage_effects {
        if effect.target == EffectTarget::Target && defender_faints {
            continue;
        }
        if rng.chance(effect.chance, "stage effect") {
            res.stage_changes.push(StageChange {
                target: effect.target,
                stat: effect.stat,
                delta: effect.delta,
            });
        }
    }

    if let Some(effect) = &move_data.status_effect {
        let immune = effect
            .status
            .immune_types()
            .iter()
            .any(|t| defender.species().types.contains(t));
        let eligible = !defender_faints && defender.is_active() && defender.status().is_none() && !immune;
        if eligible && rng.chance(effect.chance, "status effect") {
            res.status_inflicted = Some(effect.status);
            if effect.status == StatusCondition::Asleep {
                res.sleep_turns = rng.in_range(mechanics.sleep_turns(), "sleep duration");
            }
        }
    }

    if move_data.confusion_chance > 0
        && !defender_faints
        && !defender.is_confused()
        && rng.chance(move_data.confusion_chance, "confusion")
    {
        res.confusion_turns = Some(rng.in_range(mechanics.confusion_turns(), "confusion duration"));
    }

    if move_data.flinch_chance > 0 && !defender_faints && rng.chance(move_data.flinch_chance, "flinch") {
        res.flinched = true;
    }

    if move_data.category == MoveCategory::Status {
        let changed = !res.stage_changes.is_empty()
            || res.status_inflicted.is_some()
            || res.confusion_turns.is_some();
        res.outcome = if changed {
            MoveOutcome::Applied
        } else {
            MoveOutcome::Failed
        };
    }

    res
}

/// Labels used when narrating a move.
#[derive(Debug, Clone)]
pub struct MoveContext<'a> {
    pub attacker_side: Side,
    pub attacker_name: &'a str,
    pub defender_name: &'a str,
    pub move_name: &'a str,
    /// Slot to charge PP against. `None` for moves that cost nothing.
    pub move_slot: Option<usize>,
}

/// Translate a resolution record into the commands that apply it.
pub fn resolution_commands(res: &MoveResolution, ctx: &MoveContext<'_>) -> Vec<BattleCommand> {
    let attacker = ctx.attacker_side;
    let defender = attacker.opponent();
    let attacker_name = ctx.attacker_name.to_string();
    let mut commands = Vec::new();

    if res.outcome == MoveOutcome::Prevented(Prevention::Frozen) {
        if res.thawed {
            commands.push(BattleCommand::ClearStatus { target: attacker });
            commands.push(BattleCommand::EmitEvent(BattleEvent::Thawed { name: attacker_name }));
        } else {
            commands.push(BattleCommand::EmitEvent(BattleEvent::FrozenSolid { name: attacker_name }));
        }
        return commands;
    }

    if let Some(left) = res.sleep_turns_left {
        commands.push(BattleCommand::SetSleepTurns {
            target: attacker,
            turns: left,
        });
        if res.woke_up {
            commands.push(BattleCommand::ClearStatus { target: attacker });
            commands.push(BattleCommand::EmitEvent(BattleEvent::WokeUp {
                name: attacker_name.clone(),
            }));
        } else {
            commands.push(BattleCommand::EmitEvent(BattleEvent::FastAsleep { name: attacker_name }));
            return commands;
        }
    }

    if res.outcome == MoveOutcome::Prevented(Prevention::Flinched) {
        commands.push(BattleCommand::SetFlinch {
            target: attacker,
            flinched: false,
        });
        commands.push(BattleCommand::EmitEvent(BattleEvent::Flinched { name: attacker_name }));
        return commands;
    }

    if res.confused {
        commands.push(BattleCommand::EmitEvent(BattleEvent::IsConfused {
            name: attacker_name.clone(),
        }));
    }

    match res.outcome {
        MoveOutcome::Prevented(Prevention::HurtItself) => {
            commands.push(BattleCommand::EmitEvent(BattleEvent::HurtItself {
                name: attacker_name,
            }));
            commands.push(BattleCommand::DealDamage {
                target: attacker,
                amount: res.self_damage,
            });
            return commands;
        }
        MoveOutcome::Prevented(_) => {
            commands.push(BattleCommand::EmitEvent(BattleEvent::FullyParalyzed {
                name: attacker_name,
            }));
            return commands;
        }
        _ => {}
    }

    if let Some(slot) = ctx.move_slot {
        commands.push(BattleCommand::UseMove {
            target: attacker,
            move_slot: slot,
        });
    }
    commands.push(BattleCommand::EmitEvent(BattleEvent::MoveUsed {
        side: attacker,
        name: attacker_name.clone(),
        move_name: ctx.move_name.to_string(),
    }));

    match res.outcome {
        MoveOutcome::Missed => {
            commands.push(BattleCommand::EmitEvent(BattleEvent::MoveMissed { name: attacker_name }));
            return commands;
        }
        MoveOutcome::NoEffect => {
            commands.push(BattleCommand::EmitEvent(BattleEvent::NoEffect {
                target: ctx.defender_name.to_string(),
            }));
            return commands;
        }
        MoveOutcome::Failed => {
            commands.push(BattleCommand::EmitEvent(BattleEvent::MoveFailed));
            return commands;
        }
        _ => {}
    }

    if res.hit && res.damage > 0 {
        commands.push(BattleCommand::DealDamage {
            target: defender,
            amount: res.damage,
        });
        commands.push(BattleCommand::EmitEvent(BattleEvent::TypeEffectiveness {
            multiplier: res.effectiveness,
        }));
    }

    for change in &res.stage_changes {
        let target = match change.target {
            EffectTarget::User => attacker,
            EffectTarget::Target => defender,
        };
        commands.push(BattleCommand::ChangeStatStage {
            target,
            stat: change.stat,
            delta: change.delta,
        });
    }

    if let Some(status) = res.status_inflicted {
        commands.push(BattleCommand::SetStatus {
            target: defender,
            status,
            sleep_turns: res.sleep_turns,
        });
    }

    if let Some(turns) = res.confusion_turns {
        commands.push(BattleCommand::SetConfusion {
            target: defender,
            turns,
        });
    }

    if res.flinched {
        commands.push(BattleCommand::SetFlinch {
            target: defender,
            flinched: true,
        });
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::tests::common::{move_data, TestCombatantBuilder};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use schema::Move;

    #[test]
    fn damage_formula_reference_scenario() {
        // Level 5, power 40, attack 25 vs defense 20, no STAB, neutral, max roll.
        assert_eq!(calculate_damage(5, 40, 25, 20, 1.0), 6);
    }

    #[test]
    fn damage_is_at_least_one() {
        assert_eq!(calculate_damage(1, 10, 5, 200, 0.25), 1);
    }

    #[test]
    fn stab_and_effectiveness_scale_damage() {
        // Charmander's Ember into Bulbasaur: STAB and super effective.
        let attacker = TestCombatantBuilder::new(4, 20).build();
        let defender = TestCombatantBuilder::new(1, 20).build();
        let mechanics = Mechanics::default();

        let mut rng = TurnRng::new_for_test(vec![1, 100, 100]);
        let res = resolve_move(&attacker, &move_data(Move::Ember), &defender, &mechanics, &mut rng);

        assert_eq!(res.outcome, MoveOutcome::Hit);
        assert_eq!(res.effectiveness, 2.0);
        let attack = effective_attack(&attacker, MoveCategory::Special);
        let defense = effective_defense(&defender, MoveCategory::Special);
        assert_eq!(res.damage, calculate_damage(20, 40, attack, defense, 1.5 * 2.0));
        assert_eq!(res.status_inflicted, None, "burn roll of 100 misses a 10% chance");
    }

    #[test]
    fn type_immunity_means_no_damage() {
        let attacker = TestCombatantBuilder::new(25, 10).build();
        let defender = TestCombatantBuilder::new(74, 10).build();
        let mut rng = TurnRng::new_for_test(vec![1]);
        let res = resolve_move(
            &attacker,
            &move_data(Move::ThunderShock),
            &defender,
            &Mechanics::default(),
            &mut rng,
        );
        assert_eq!(res.outcome, MoveOutcome::NoEffect);
        assert_eq!(res.damage, 0);
        assert!(!res.hit);
    }

    #[test]
    fn burn_on_a_poisoned_target_is_a_no_op() {
        let attacker = TestCombatantBuilder::new(4, 10).build();
        let defender = TestCombatantBuilder::new(19, 30)
            .with_status(StatusCondition::Poisoned)
            .build();
        // accuracy, variance. No roll is spent on the ineligible burn.
        let mut rng = TurnRng::new_for_test(vec![1, 50]);
        let res = resolve_move(&attacker, &move_data(Move::Ember), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(res.status_inflicted, None);
        assert!(res.hit);
    }

    #[test]
    fn status_move_on_statused_target_fails() {
        let attacker = TestCombatantBuilder::new(25, 10).build();
        let defender = TestCombatantBuilder::new(19, 10)
            .with_status(StatusCondition::Poisoned)
            .build();
        let mut rng = TurnRng::new_for_test(vec![1]);
        let res = resolve_move(
            &attacker,
            &move_data(Move::ThunderWave),
            &defender,
            &Mechanics::default(),
            &mut rng,
        );
        assert_eq!(res.outcome, MoveOutcome::Failed);
    }

    #[test]
    fn sleep_inflicts_a_rolled_duration() {
        let attacker = TestCombatantBuilder::new(39, 10).build();
        let defender = TestCombatantBuilder::new(19, 10).build();
        // accuracy 1 hits a 55% move, duration roll 100 gives the maximum.
        let mut rng = TurnRng::new_for_test(vec![1, 100]);
        let res = resolve_move(&attacker, &move_data(Move::Sing), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(res.outcome, MoveOutcome::Applied);
        assert_eq!(res.status_inflicted, Some(StatusCondition::Asleep));
        assert_eq!(res.sleep_turns, 7);
    }

    #[rstest]
    #[case::still_asleep(3, Some(2), false, MoveOutcome::Prevented(Prevention::Asleep))]
    #[case::wakes_this_turn(1, Some(0), true, MoveOutcome::Failed)]
    fn sleep_counts_down_on_each_attempt(
        #[case] turns: u8,
        #[case] left: Option<u8>,
        #[case] woke: bool,
        #[case] outcome: MoveOutcome,
    ) {
        let attacker = TestCombatantBuilder::new(19, 10)
            .with_status(StatusCondition::Asleep)
            .with_sleep_turns(turns)
            .build();
        let defender = TestCombatantBuilder::new(16, 10).build();
        // Splash never misses, so no roll is needed.
        let mut rng = TurnRng::new_for_test(vec![1]);
        let res = resolve_move(&attacker, &move_data(Move::Splash), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(res.sleep_turns_left, left);
        assert_eq!(res.woke_up, woke);
        assert_eq!(res.outcome, outcome);
    }

    #[test]
    fn frozen_attackers_never_move() {
        let attacker = TestCombatantBuilder::new(19, 10)
            .with_status(StatusCondition::Frozen)
            .build();
        let defender = TestCombatantBuilder::new(16, 10).build();
        let mut rng = TurnRng::new_for_test(vec![10]);
        let res = resolve_move(&attacker, &move_data(Move::Tackle), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(res.outcome, MoveOutcome::Prevented(Prevention::Frozen));
        assert!(res.thawed, "roll of 10 is within the 20% thaw chance");
        assert!(!res.move_executed());
    }

    #[test]
    fn confusion_can_redirect_the_attack() {
        let mut attacker = TestCombatantBuilder::new(19, 10).build();
        attacker.volatile.confusion_turns = 2;
        let defender = TestCombatantBuilder::new(16, 10).build();
        let mut rng = TurnRng::new_for_test(vec![10, 100]);
        let res = resolve_move(&attacker, &move_data(Move::Tackle), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(res.outcome, MoveOutcome::Prevented(Prevention::HurtItself));
        assert!(res.self_damage >= 1);
        assert_eq!(res.damage, 0);
    }

    #[test]
    fn flinch_prevents_and_is_reported() {
        let mut attacker = TestCombatantBuilder::new(19, 10).build();
        attacker.volatile.flinched = true;
        let defender = TestCombatantBuilder::new(16, 10).build();
        let mut rng = TurnRng::new_for_test(vec![]);
        let res = resolve_move(&attacker, &move_data(Move::Tackle), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(res.outcome, MoveOutcome::Prevented(Prevention::Flinched));

        let ctx = MoveContext {
            attacker_side: Side::Opponent,
            attacker_name: "Wild RATTATA",
            defender_name: "PIDGEY",
            move_name: "TACKLE",
            move_slot: Some(0),
        };
        let commands = resolution_commands(&res, &ctx);
        assert!(!commands.iter().any(|c| matches!(c, BattleCommand::UseMove { .. })));
    }

    #[test]
    fn stat_moves_record_requested_changes() {
        let attacker = TestCombatantBuilder::new(19, 10).build();
        let defender = TestCombatantBuilder::new(16, 10).build();
        let mut rng = TurnRng::new_for_test(vec![1]);
        let res = resolve_move(&attacker, &move_data(Move::TailWhip), &defender, &Mechanics::default(), &mut rng);
        assert_eq!(
            res.stage_changes,
            vec![StageChange {
                target: EffectTarget::Target,
                stat: StageStat::Defense,
                delta: -1,
            }]
        );
        assert_eq!(res.outcome, MoveOutcome::Applied);
    }
}
