use crate::battle::rng::TurnRng;
use crate::combatant::Combatant;
use schema::{MoveCategory, MoveData, StageStat, StatusCondition};

/// Calculate effective attack stat including stat stages and burn
pub fn effective_attack(combatant: &Combatant, category: MoveCategory) -> u16 {
    let (base_attack, stat) = match category {
        MoveCategory::Physical => (combatant.stats().attack, StageStat::Attack),
        MoveCategory::Special => (combatant.stats().sp_attack, StageStat::SpecialAttack),
        MoveCategory::Status => return 0,
    };

    let multiplied_attack = apply_stat_stage_multiplier(base_attack, combatant.stages.get(stat));

    // Burn halves physical attack
    if category == MoveCategory::Physical && combatant.status() == Some(StatusCondition::Burned) {
        return (multiplied_attack / 2).max(1);
    }

    multiplied_attack
}

/// Calculate effective defense stat including stat stages
pub fn effective_defense(combatant: &Combatant, category: MoveCategory) -> u16 {
    let (base_defense, stat) = match category {
        MoveCategory::Physical => (combatant.stats().defense, StageStat::Defense),
        MoveCategory::Special => (combatant.stats().sp_defense, StageStat::SpecialDefense),
        MoveCategory::Status => return 0,
    };

    apply_stat_stage_multiplier(base_defense, combatant.stages.get(stat)).max(1)
}

/// Calculate effective speed including stat stages and paralysis
pub fn effective_speed(combatant: &Combatant) -> u16 {
    let mut multiplied_speed =
        apply_stat_stage_multiplier(combatant.stats().speed, combatant.stages.get(StageStat::Speed));

    // Apply paralysis (quarter speed)
    if combatant.status() == Some(StatusCondition::Paralyzed) {
        multiplied_speed /= 4;
    }

    multiplied_speed
}

/// Roll whether a move connects. Evasion is modelled as a lowered accuracy
/// stage on the attacker, so only the attacker's counter matters.
pub fn move_hits(attacker: &Combatant, move_data: &MoveData, rng: &mut TurnRng) -> bool {
    // If move has no accuracy value, it never misses
    let Some(base_accuracy) = move_data.accuracy else {
        return true;
    };

    let stage_multiplier = apply_accuracy_stage_multiplier(attacker.stages.get(StageStat::Accuracy));

    let modified_accuracy = (base_accuracy as f64 * stage_multiplier).round() as u16;
    let clamped_accuracy = modified_accuracy.clamp(1, 100) as u8;

    let roll = rng.next_outcome("accuracy");
    roll <= clamped_accuracy
}

/// Accuracy stages use a gentler curve than regular stats.
/// Stages range from -6 to +6
pub(crate) fn apply_accuracy_stage_multiplier(stage: i8) -> f64 {
    match stage.clamp(-6, 6) {
        -6 => 3.0 / 9.0,
        -5 => 3.0 / 8.0,
        -4 => 3.0 / 7.0,
        -3 => 3.0 / 6.0,
        -2 => 3.0 / 5.0,
        -1 => 3.0 / 4.0,
        0 => 3.0 / 3.0,
        1 => 4.0 / 3.0,
        2 => 5.0 / 3.0,
        3 => 6.0 / 3.0,
        4 => 7.0 / 3.0,
        5 => 8.0 / 3.0,
        _ => 9.0 / 3.0,
    }
}

/// Stages range from -6 to +6
/// Negative stages: (2 / (2 + |stage|))
/// Positive stages: ((2 + stage) / 2)
pub(crate) fn apply_stat_stage_multiplier(base_stat: u16, stage: i8) -> u16 {
    let clamped_stage = stage.clamp(-6, 6);

    if clamped_stage == 0 {
        return base_stat;
    }

    let multiplier = if clamped_stage < 0 {
        2.0 / (2.0 + (-clamped_stage) as f64)
    } else {
        (2.0 + clamped_stage as f64) / 2.0
    };

    ((base_stat as f64) * multiplier).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::tests::common::{test_catalog, TestCombatantBuilder};
    use schema::Move;

    #[test]
    fn test_stat_stage_multipliers() {
        assert_eq!(apply_stat_stage_multiplier(100, 0), 100);
        assert_eq!(apply_stat_stage_multiplier(100, 1), 150);
        assert_eq!(apply_stat_stage_multiplier(100, 2), 200);
        assert_eq!(apply_stat_stage_multiplier(100, -1), 67);
        assert_eq!(apply_stat_stage_multiplier(100, -2), 50);
        assert_eq!(apply_stat_stage_multiplier(100, 6), 400);
        assert_eq!(apply_stat_stage_multiplier(100, -6), 25);
    }

    #[test]
    fn test_accuracy_stage_multipliers() {
        assert!((apply_accuracy_stage_multiplier(0) - 1.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(1) - 4.0 / 3.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(-1) - 3.0 / 4.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(6) - 3.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(-6) - 1.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_effective_speed_paralysis() {
        let healthy = TestCombatantBuilder::new(25, 50).build();
        let paralyzed = TestCombatantBuilder::new(25, 50)
            .with_status(StatusCondition::Paralyzed)
            .build();
        assert_eq!(effective_speed(&healthy), 95);
        assert_eq!(effective_speed(&paralyzed), 23);
    }

    #[test]
    fn burn_halves_physical_attack_only() {
        let burned = TestCombatantBuilder::new(4, 50)
            .with_status(StatusCondition::Burned)
            .build();
        assert_eq!(effective_attack(&burned, MoveCategory::Physical), burned.stats().attack / 2);
        assert_eq!(effective_attack(&burned, MoveCategory::Special), burned.stats().sp_attack);
    }

    #[test]
    fn lowered_accuracy_turns_a_hit_into_a_miss() {
        let catalog = test_catalog();
        let tackle = catalog.move_data(Move::Tackle).unwrap();
        let mut attacker = TestCombatantBuilder::new(19, 5).build();

        let mut rng = TurnRng::new_for_test(vec![80, 80]);
        assert!(move_hits(&attacker, tackle, &mut rng));
        attacker.adjust_stage(StageStat::Accuracy, -1);
        assert!(!move_hits(&attacker, tackle, &mut rng));
    }
}
