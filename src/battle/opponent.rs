use crate::combatant::Combatant;

/// The non-player side of a session.
#[derive(Debug, Clone)]
pub enum Opponent {
    Wild {
        combatant: Combatant,
    },
    Trainer {
        name: String,
        squad: Vec<Combatant>,
        active: usize,
    },
}

impl Opponent {
    pub fn wild(combatant: Combatant) -> Self {
        Opponent::Wild { combatant }
    }

    /// A scripted trainer leads with the first member able to battle.
    pub fn trainer(name: impl Into<String>, squad: Vec<Combatant>) -> Self {
        let active = squad.iter().position(Combatant::is_active).unwrap_or(0);
        Opponent::Trainer {
            name: name.into(),
            squad,
            active,
        }
    }

    pub fn active(&self) -> Option<&Combatant> {
        match self {
            Opponent::Wild { combatant } => Some(combatant),
            Opponent::Trainer { squad, active, .. } => squad.get(*active),
        }
    }

    pub fn active_mut(&mut self) -> Option<&mut Combatant> {
        match self {
            Opponent::Wild { combatant } => Some(combatant),
            Opponent::Trainer { squad, active, .. } => squad.get_mut(*active),
        }
    }

    /// Only wild combatants can be captured or run from.
    pub fn is_capturable(&self) -> bool {
        matches!(self, Opponent::Wild { .. })
    }

    pub fn trainer_name(&self) -> Option<&str> {
        match self {
            Opponent::Wild { .. } => None,
            Opponent::Trainer { name, .. } => Some(name),
        }
    }

    /// Narration label for the active combatant.
    pub fn label(&self) -> String {
        let name = self.active().map(Combatant::name).unwrap_or("???");
        match self {
            Opponent::Wild { .. } => format!("Wild {}", name),
            Opponent::Trainer { .. } => format!("Foe {}", name),
        }
    }

    /// Called after the active combatant fainted. Sends out the next member
    /// able to battle and returns its index, or `None` when the side is spent.
    pub fn on_faint(&mut self) -> Option<usize> {
        match self {
            Opponent::Wild { .. } => None,
            Opponent::Trainer { squad, active, .. } => {
                let next = squad.iter().position(Combatant::is_active)?;
                *active = next;
                Some(next)
            }
        }
    }

    /// Detach the wild combatant so it can be handed to its captor.
    pub fn into_captured(self) -> Option<Combatant> {
        match self {
            Opponent::Wild { combatant } => Some(combatant),
            Opponent::Trainer { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::tests::common::TestCombatantBuilder;

    #[test]
    fn trainers_send_out_their_next_member() {
        let mut foe = Opponent::trainer(
            "BUG CATCHER RICK",
            vec![
                TestCombatantBuilder::new(13, 6).build(),
                TestCombatantBuilder::new(10, 6).build(),
            ],
        );
        assert_eq!(foe.label(), "Foe WEEDLE");

        foe.active_mut().unwrap().apply_damage(999);
        assert_eq!(foe.on_faint(), Some(1));
        assert_eq!(foe.label(), "Foe CATERPIE");

        foe.active_mut().unwrap().apply_damage(999);
        assert_eq!(foe.on_faint(), None);
        assert!(foe.into_captured().is_none());
    }

    #[test]
    fn wild_opponents_are_capturable() {
        let wild = Opponent::wild(TestCombatantBuilder::new(16, 3).build());
        assert!(wild.is_capturable());
        assert_eq!(wild.trainer_name(), None);
        assert_eq!(wild.label(), "Wild PIDGEY");
        assert_eq!(wild.into_captured().map(|c| c.level()), Some(3));
    }
}
