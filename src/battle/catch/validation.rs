use crate::battle::opponent::Opponent;
use crate::errors::ValidationError;

/// Validate that the current opponent can be targeted by a capture attempt.
pub fn can_attempt_capture(opponent: &Opponent) -> Result<(), ValidationError> {
    if !opponent.is_capturable() {
        return Err(ValidationError::NotCapturable);
    }
    match opponent.active() {
        Some(target) if target.is_active() => Ok(()),
        Some(target) => Err(ValidationError::CombatantCannotBattle(target.name().to_string())),
        None => Err(ValidationError::NotCapturable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::tests::common::TestCombatantBuilder;

    #[test]
    fn only_wild_opponents_can_be_captured() {
        let wild = Opponent::wild(TestCombatantBuilder::new(16, 5).build());
        assert_eq!(can_attempt_capture(&wild), Ok(()));

        let trainer = Opponent::trainer("YOUNGSTER JOEY", vec![TestCombatantBuilder::new(19, 5).build()]);
        assert_eq!(can_attempt_capture(&trainer), Err(ValidationError::NotCapturable));
    }

    #[test]
    fn fainted_targets_cannot_be_captured() {
        let wild = Opponent::wild(TestCombatantBuilder::new(16, 5).with_hp(0).build());
        assert!(matches!(
            can_attempt_capture(&wild),
            Err(ValidationError::CombatantCannotBattle(_))
        ));
    }
}
