//! Action selection for the non-player side.

use crate::battle::calculators::calculate_damage;
use crate::battle::rng::TurnRng;
use crate::battle::stats::{effective_attack, effective_defense};
use crate::combatant::Combatant;
use crate::config::Mechanics;
use ordered_float::OrderedFloat;
use schema::{EffectTarget, MoveCategory};

/// What an automatically controlled combatant does this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveChoice {
    Slot(usize),
    /// Every slot is out of PP.
    Struggle,
}

/// A trait for any system that can decide on a move for the non-player side.
pub trait Behavior {
    fn decide_move(
        &self,
        attacker: &Combatant,
        defender: &Combatant,
        mechanics: &Mechanics,
        rng: &mut TurnRng,
    ) -> MoveChoice;
}

/// Wild combatants pick at random, weighted by remaining PP.
pub struct WildBehavior;

impl Behavior for WildBehavior {
    fn decide_move(
        &self,
        attacker: &Combatant,
        _defender: &Combatant,
        _mechanics: &Mechanics,
        rng: &mut TurnRng,
    ) -> MoveChoice {
        let weights: Vec<u32> = attacker
            .moves
            .iter()
            .map(|slot| slot.as_ref().map_or(0, |s| s.pp as u32))
            .collect();
        match rng.weighted_index(&weights, "wild move choice") {
            Some(index) => MoveChoice::Slot(index),
            None => MoveChoice::Struggle,
        }
    }
}

/// Scripted trainers pick the move with the highest expected damage.
pub struct ScoringBehavior;

impl ScoringBehavior {
    /// Expected damage of a move, or a small utility score for status moves
    /// that would still change something.
    fn score_move(
        &self,
        slot: usize,
        attacker: &Combatant,
        defender: &Combatant,
        mechanics: &Mechanics,
    ) -> f64 {
        let Some(move_slot) = attacker.moves[slot].as_ref() else {
            return f64::MIN;
        };
        let data = &move_slot.data;
        let effectiveness = data.move_type.effectiveness_against(&defender.species().types) as f64;

        if data.category == MoveCategory::Status {
            let mut utility = 0.0;
            if let Some(effect) = &data.status_effect {
                let immune = effect
                    .status
                    .immune_types()
                    .iter()
                    .any(|t| defender.species().types.contains(t));
                if defender.status().is_none() && !immune && effectiveness > 0.0 {
                    utility += 0.5 * effect.chance as f64 / 100.0;
                }
            }
            for effect in &data.stage_effects {
                let subject = match effect.target {
                    EffectTarget::User => attacker,
                    EffectTarget::Target => defender,
                };
                let stage = subject.stages.get(effect.stat);
                if (effect.delta > 0 && stage < 6) || (effect.delta < 0 && stage > -6) {
                    utility += 0.25;
                }
            }
            if data.confusion_chance > 0 && !defender.is_confused() {
                utility += 0.25;
            }
            return utility;
        }

        if effectiveness == 0.0 {
            return 0.0;
        }
        let stab = if attacker.species().types.contains(&data.move_type) {
            mechanics.stab_multiplier
        } else {
            1.0
        };
        let mean_variance = (mechanics.variance_min_percent.min(100) as f64 + 100.0) / 200.0;
        let damage = calculate_damage(
            attacker.level(),
            data.power.unwrap_or(0),
            effective_attack(attacker, data.category),
            effective_defense(defender, data.category),
            stab * effectiveness * mean_variance,
        );
        let accuracy = data.accuracy.map_or(1.0, |a| a as f64 / 100.0);
        damage as f64 * accuracy
    }
}

impl Behavior for ScoringBehavior {
    fn decide_move(
        &self,
        attacker: &Combatant,
        defender: &Combatant,
        mechanics: &Mechanics,
        _rng: &mut TurnRng,
    ) -> MoveChoice {
        attacker
            .moves
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|s| s.pp > 0))
            .map(|(i, _)| (i, self.score_move(i, attacker, defender, mechanics)))
            .max_by_key(|(_, score)| OrderedFloat(*score))
            .map_or(MoveChoice::Struggle, |(i, _)| MoveChoice::Slot(i))
    }
}
