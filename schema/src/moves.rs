use crate::MonsterType;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, EnumString, IntoStaticStr};

/// Every move the catalog can describe. The variant name doubles as the
/// persisted identifier in roster records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Move {
    Tackle,
    Scratch,
    Pound,
    QuickAttack,
    Headbutt,
    Bite,
    BodySlam,
    Growl,
    TailWhip,
    Leer,
    SandAttack,
    DoubleTeam,
    Harden,
    Withdraw,
    DefenseCurl,
    SwordsDance,
    Agility,
    Splash,
    Ember,
    Flamethrower,
    WaterGun,
    Bubble,
    VineWhip,
    RazorLeaf,
    ThunderShock,
    Thunderbolt,
    ThunderWave,
    PoisonPowder,
    StunSpore,
    SleepPowder,
    PoisonSting,
    Gust,
    WingAttack,
    Peck,
    Supersonic,
    ConfuseRay,
    Lick,
    Confusion,
    Psybeam,
    Hypnosis,
    Sing,
    LeechLife,
    StringShot,
    RockThrow,
    MudSlap,
    IceBeam,
    PowderSnow,
    Struggle,
}

impl Move {
    pub fn identifier(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveCategory {
    Physical,
    Special,
    Status,
}

/// Stats that carry a battle stage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum StageStat {
    Attack,
    Defense,
    SpecialAttack,
    SpecialDefense,
    Speed,
    Accuracy,
}

impl StageStat {
    pub fn index(self) -> usize {
        match self {
            StageStat::Attack => 0,
            StageStat::Defense => 1,
            StageStat::SpecialAttack => 2,
            StageStat::SpecialDefense => 3,
            StageStat::Speed => 4,
            StageStat::Accuracy => 5,
        }
    }
}

impl fmt::Display for StageStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageStat::Attack => "ATTACK",
            StageStat::Defense => "DEFENSE",
            StageStat::SpecialAttack => "SPECIAL ATTACK",
            StageStat::SpecialDefense => "SPECIAL DEFENSE",
            StageStat::Speed => "SPEED",
            StageStat::Accuracy => "ACCURACY",
        };
        write!(f, "{}", name)
    }
}

/// Major, persistent status. At most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCondition {
    Asleep,
    Poisoned,
    Paralyzed,
    Burned,
    Frozen,
}

impl StatusCondition {
    /// Compact code used by the roster record format. Zero means no status.
    pub fn code(self) -> u8 {
        match self {
            StatusCondition::Asleep => 1,
            StatusCondition::Poisoned => 2,
            StatusCondition::Paralyzed => 3,
            StatusCondition::Burned => 4,
            StatusCondition::Frozen => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Option<StatusCondition>> {
        match code {
            0 => Some(None),
            1 => Some(Some(StatusCondition::Asleep)),
            2 => Some(Some(StatusCondition::Poisoned)),
            3 => Some(Some(StatusCondition::Paralyzed)),
            4 => Some(Some(StatusCondition::Burned)),
            5 => Some(Some(StatusCondition::Frozen)),
            _ => None,
        }
    }

    /// Types that can never receive this status.
    pub fn immune_types(self) -> &'static [MonsterType] {
        match self {
            StatusCondition::Poisoned => &[MonsterType::Poison],
            StatusCondition::Burned => &[MonsterType::Fire],
            StatusCondition::Frozen => &[MonsterType::Ice],
            StatusCondition::Paralyzed => &[MonsterType::Electric],
            StatusCondition::Asleep => &[],
        }
    }
}

impl fmt::Display for StatusCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abbreviation = match self {
            StatusCondition::Asleep => "SLP",
            StatusCondition::Poisoned => "PSN",
            StatusCondition::Paralyzed => "PAR",
            StatusCondition::Burned => "BRN",
            StatusCondition::Frozen => "FRZ",
        };
        write!(f, "{}", abbreviation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectTarget {
    User,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEffect {
    pub target: EffectTarget,
    pub stat: StageStat,
    pub delta: i8,
    /// Percent chance, 100 means guaranteed.
    pub chance: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub status: StatusCondition,
    pub chance: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    #[serde(rename = "move")]
    pub move_: Move,
    pub name: String,
    pub move_type: MonsterType,
    pub category: MoveCategory,
    pub power: Option<u8>,
    /// `None` never misses.
    pub accuracy: Option<u8>,
    pub max_pp: u8,
    #[serde(default)]
    pub stage_effects: Vec<StageEffect>,
    #[serde(default)]
    pub status_effect: Option<StatusEffect>,
    #[serde(default)]
    pub flinch_chance: u8,
    #[serde(default)]
    pub confusion_chance: u8,
}

impl MoveData {
    pub fn is_damaging(&self) -> bool {
        self.category != MoveCategory::Status && self.power.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn identifiers_parse_case_insensitively() {
        assert_eq!(Move::from_str("thundershock").unwrap(), Move::ThunderShock);
        assert_eq!(Move::ThunderShock.identifier(), "ThunderShock");
        assert!(Move::from_str("Hyper Beam").is_err());
    }

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(StatusCondition::from_code(0), Some(None));
        assert_eq!(StatusCondition::from_code(4), Some(Some(StatusCondition::Burned)));
        assert_eq!(StatusCondition::from_code(9), None);
        assert_eq!(StatusCondition::Frozen.code(), 5);
    }
}
