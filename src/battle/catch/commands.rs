use crate::battle::catch::{capture_probability_for, roll_capture};
use crate::battle::rng::TurnRng;
use crate::battle::state::BattleEvent;
use crate::combatant::Combatant;
use crate::config::CaptureConfig;

/// What a capture attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResolution {
    pub probability: f64,
    pub success: bool,
    pub shakes: u8,
    pub events: Vec<BattleEvent>,
}

/// Resolve one throw at `target`. On success the caller detaches the target
/// and hands it to the capturing trainer.
pub fn resolve_capture(
    trainer_name: &str,
    target: &Combatant,
    target_label: &str,
    config: &CaptureConfig,
    rng: &mut TurnRng,
) -> CaptureResolution {
    let probability = capture_probability_for(target, config);
    let roll = roll_capture(probability, config.shake_checks, rng);

    let mut events = vec![BattleEvent::CaptureAttempted {
        trainer: trainer_name.to_string(),
        target: target_label.to_string(),
    }];
    if roll.success {
        events.push(BattleEvent::Captured {
            name: target.name().to_string(),
        });
    } else {
        events.push(BattleEvent::CaptureFailed {
            target: target_label.to_string(),
            shakes: roll.shakes,
            checks: config.shake_checks.max(1),
        });
    }

    tracing::debug!(
        target_name = target.name(),
        probability,
        success = roll.success,
        shakes = roll.shakes,
        "capture attempt"
    );

    CaptureResolution {
        probability,
        success: roll.success,
        shakes: roll.shakes,
        events,
    }
}
