use schema::{StageStat, StatusCondition};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Copy)]
pub enum SessionPhase {
    /// Created, no trainer bound yet.
    AwaitingOpponent,
    AwaitingActions,
    Resolving,
    Terminal(EndReason),
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Terminal(_))
    }
}

/// Why a session ended, always from the player's point of view.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Copy, Hash)]
pub enum EndReason {
    Win,
    Loss,
    Flee,
    Capture,
    MutualFaint,
}

/// Which side of the field a command or event concerns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Player,
    Opponent,
}

impl Side {
    pub fn to_index(self) -> usize {
        match self {
            Side::Player => 0,
            Side::Opponent => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Player => Side::Opponent,
            Side::Opponent => Side::Player,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BattleEvent {
    // Session flow
    WildAppeared {
        name: String,
        level: u8,
    },
    TrainerChallenge {
        trainer: String,
    },
    TrainerJoined {
        trainer: String,
    },
    TurnStarted {
        turn_number: u32,
    },
    SentOut {
        side: Side,
        trainer: String,
        name: String,
    },
    Withdrew {
        side: Side,
        trainer: String,
        name: String,
    },
    ReplacementNeeded {
        trainer: String,
    },
    Prompt {
        text: String,
    },
    BattleEnded {
        reason: EndReason,
    },

    // Pre-move checks
    FrozenSolid {
        name: String,
    },
    Thawed {
        name: String,
    },
    FastAsleep {
        name: String,
    },
    WokeUp {
        name: String,
    },
    Flinched {
        name: String,
    },
    IsConfused {
        name: String,
    },
    HurtItself {
        name: String,
    },
    FullyParalyzed {
        name: String,
    },

    // Moves
    MoveUsed {
        side: Side,
        name: String,
        move_name: String,
    },
    MoveMissed {
        name: String,
    },
    NoEffect {
        target: String,
    },
    MoveFailed,
    TypeEffectiveness {
        multiplier: f32,
    },
    DamageDealt {
        side: Side,
        target: String,
        damage: u16,
        remaining_hp: u16,
        max_hp: u16,
    },
    StatStageChanged {
        target: String,
        stat: StageStat,
        requested: i8,
        applied: i8,
    },
    StatusApplied {
        target: String,
        status: StatusCondition,
    },
    ConfusionApplied {
        target: String,
    },
    ConfusionEnded {
        target: String,
    },
    ResidualDamage {
        target: String,
        status: StatusCondition,
        damage: u16,
    },
    Fainted {
        side: Side,
        name: String,
    },

    // Capture and escape
    CaptureAttempted {
        trainer: String,
        target: String,
    },
    CaptureFailed {
        target: String,
        shakes: u8,
        checks: u8,
    },
    Captured {
        name: String,
    },
    Fled {
        trainer: String,
    },
}

impl BattleEvent {
    /// Formats the event into a human-readable line.
    /// Returns None for silent events that should not produce user-visible text.
    pub fn format(&self) -> Option<String> {
        match self {
            BattleEvent::WildAppeared { name, level } => {
                Some(format!("A wild {} (Lv. {}) appeared!", name, level))
            }
            BattleEvent::TrainerChallenge { trainer } => {
                Some(format!("{} wants to fight!", trainer))
            }
            BattleEvent::TrainerJoined { trainer } => Some(format!("{} stepped up!", trainer)),
            BattleEvent::TurnStarted { .. } => None,
            BattleEvent::SentOut { side, trainer, name } => match side {
                Side::Player => Some(format!("Go! {}!", name)),
                Side::Opponent => Some(format!("{} sent out {}!", trainer, name)),
            },
            BattleEvent::Withdrew { side, trainer, name } => match side {
                Side::Player => Some(format!("{}, come back!", name)),
                Side::Opponent => Some(format!("{} withdrew {}!", trainer, name)),
            },
            BattleEvent::ReplacementNeeded { trainer } => Some(format!(
                "{}, choose your next monster! Use switch <slot>.",
                trainer
            )),
            BattleEvent::Prompt { text } => Some(text.clone()),
            BattleEvent::BattleEnded { reason } => match reason {
                EndReason::Win => Some("You won the battle!".to_string()),
                EndReason::Loss => Some("You are out of usable monsters! You blacked out!".to_string()),
                EndReason::MutualFaint => Some("Both sides are out of monsters. It's a draw!".to_string()),
                EndReason::Flee | EndReason::Capture => None,
            },

            BattleEvent::FrozenSolid { name } => Some(format!("{} is frozen solid!", name)),
            BattleEvent::Thawed { name } => Some(format!("{} thawed out!", name)),
            BattleEvent::FastAsleep { name } => Some(format!("{} is fast asleep!", name)),
            BattleEvent::WokeUp { name } => Some(format!("{} woke up!", name)),
            BattleEvent::Flinched { name } => Some(format!("{} flinched!", name)),
            BattleEvent::IsConfused { name } => Some(format!("{} is confused!", name)),
            BattleEvent::HurtItself { .. } => Some("It hurt itself in its confusion!".to_string()),
            BattleEvent::FullyParalyzed { name } => Some(format!("{} is fully paralyzed!", name)),

            BattleEvent::MoveUsed { name, move_name, .. } => {
                Some(format!("{} used {}!", name, move_name))
            }
            BattleEvent::MoveMissed { name } => Some(format!("{}'s attack missed!", name)),
            BattleEvent::NoEffect { target } => Some(format!("It doesn't affect {}...", target)),
            BattleEvent::MoveFailed => Some("But it failed!".to_string()),
            BattleEvent::TypeEffectiveness { multiplier } => match *multiplier {
                m if m > 1.0 => Some("It's super effective!".to_string()),
                m if m < 1.0 && m > 0.0 => Some("It's not very effective...".to_string()),
                _ => None,
            },
            BattleEvent::DamageDealt {
                target,
                damage,
                remaining_hp,
                max_hp,
                ..
            } => Some(format!(
                "{} took {} damage! ({}/{} HP)",
                target, damage, remaining_hp, max_hp
            )),
            BattleEvent::StatStageChanged {
                target,
                stat,
                requested,
                applied,
            } => Some(Self::format_stage_change(target, *stat, *requested, *applied)),
            BattleEvent::StatusApplied { target, status } => Some(format!(
                "{} {}",
                target,
                Self::format_status_applied(*status)
            )),
            BattleEvent::ConfusionApplied { target } => Some(format!("{} became confused!", target)),
            BattleEvent::ConfusionEnded { target } => {
                Some(format!("{} snapped out of its confusion!", target))
            }
            BattleEvent::ResidualDamage { target, status, damage } => {
                let source = match status {
                    StatusCondition::Burned => "its burn",
                    _ => "poison",
                };
                Some(format!("{} is hurt by {}! ({} damage)", target, source, damage))
            }
            BattleEvent::Fainted { name, .. } => Some(format!("{} fainted!", name)),

            BattleEvent::CaptureAttempted { trainer, target } => {
                Some(format!("{} threw a ball at {}!", trainer, target))
            }
            BattleEvent::CaptureFailed { shakes, checks, .. } => {
                Some(Self::format_escape(*shakes, *checks))
            }
            BattleEvent::Captured { name } => Some(format!("Gotcha! {} was caught!", name)),
            BattleEvent::Fled { .. } => Some("Got away safely!".to_string()),
        }
    }

    /// Events that open a new narration chunk. Everything else is appended
    /// to the chunk in progress.
    pub fn starts_chunk(&self) -> bool {
        matches!(
            self,
            BattleEvent::WildAppeared { .. }
                | BattleEvent::TrainerChallenge { .. }
                | BattleEvent::SentOut { .. }
                | BattleEvent::Withdrew { .. }
                | BattleEvent::ReplacementNeeded { .. }
                | BattleEvent::Prompt { .. }
                | BattleEvent::BattleEnded { .. }
                | BattleEvent::FrozenSolid { .. }
                | BattleEvent::Thawed { .. }
                | BattleEvent::FastAsleep { .. }
                | BattleEvent::WokeUp { .. }
                | BattleEvent::Flinched { .. }
                | BattleEvent::IsConfused { .. }
                | BattleEvent::FullyParalyzed { .. }
                | BattleEvent::MoveUsed { .. }
                | BattleEvent::ResidualDamage { .. }
                | BattleEvent::ConfusionEnded { .. }
                | BattleEvent::Fainted { .. }
                | BattleEvent::CaptureAttempted { .. }
                | BattleEvent::Fled { .. }
        )
    }

    fn format_stage_change(target: &str, stat: StageStat, requested: i8, applied: i8) -> String {
        match applied {
            0 if requested > 0 => format!("{}'s {} won't go any higher!", target, stat),
            0 => format!("{}'s {} won't go any lower!", target, stat),
            d if d >= 2 => format!("{}'s {} rose sharply!", target, stat),
            1 => format!("{}'s {} rose!", target, stat),
            -1 => format!("{}'s {} fell!", target, stat),
            _ => format!("{}'s {} harshly fell!", target, stat),
        }
    }

    fn format_status_applied(status: StatusCondition) -> &'static str {
        match status {
            StatusCondition::Asleep => "fell asleep!",
            StatusCondition::Poisoned => "was poisoned!",
            StatusCondition::Paralyzed => "is paralyzed! It may be unable to move!",
            StatusCondition::Burned => "was burned!",
            StatusCondition::Frozen => "was frozen solid!",
        }
    }

    /// The escape bar fills one segment per passed check.
    fn format_escape(shakes: u8, checks: u8) -> String {
        let message = match shakes {
            0 => "Oh no! It broke free!",
            1 => "Aww! It appeared to be caught!",
            2 => "Aargh! Almost had it!",
            _ => "Shoot! It was so close too!",
        };
        let filled = shakes.min(checks) as usize;
        format!(
            "[{}{}] {}",
            "#".repeat(filled),
            "-".repeat(checks as usize - filled),
            message
        )
    }
}

/// Ordered log of everything a resolution step did.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    events: Vec<BattleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: BattleEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[BattleEvent] {
        &self.events
    }

    pub fn extend(&mut self, other: EventBus) {
        self.events.extend(other.events);
    }

    /// Return true if the event bus contains no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Return the number of events in the bus.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Render the events into narration chunks, one per beat of the battle.
    pub fn narrate(&self) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for event in &self.events {
            let Some(line) = event.format() else {
                continue;
            };
            if event.starts_chunk() && !current.is_empty() {
                chunks.push(current.join("\n"));
                current.clear();
            }
            current.push(line);
        }
        if !current.is_empty() {
            chunks.push(current.join("\n"));
        }
        chunks
    }
}

impl std::fmt::Display for EventBus {
    /// Format the EventBus for printing. Shows debug format of all events.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for event in &self.events {
            writeln!(f, "  {:?}", event)?;
        }
        Ok(())
    }
}
