use crate::battle::rng::TurnRng;
use crate::catalog::Catalog;
use crate::errors::RecordError;
use schema::{BaseStats, Move, MoveData, SpeciesData, SpeciesId, StageStat, StatusCondition};
use std::str::FromStr;
use std::sync::Arc;

pub const MAX_STAGE: i8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct MoveSlot {
    pub data: Arc<MoveData>,
    pub pp: u8,
}

impl MoveSlot {
    /// Create a new move slot with full PP
    pub fn new(data: Arc<MoveData>) -> Self {
        let pp = data.max_pp;
        MoveSlot { data, pp }
    }

    pub fn max_pp(&self) -> u8 {
        self.data.max_pp
    }

    /// Spend one PP. Returns false if none was left.
    pub fn use_move(&mut self) -> bool {
        if self.pp > 0 {
            self.pp -= 1;
            true
        } else {
            false
        }
    }

    pub fn restore(&mut self) {
        self.pp = self.max_pp();
    }
}

/// Stats derived from species and level. Never mutated during battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatStats {
    pub max_hp: u16,
    pub attack: u16,
    pub defense: u16,
    pub sp_attack: u16,
    pub sp_defense: u16,
    pub speed: u16,
}

impl CombatStats {
    pub fn calculate(base: &BaseStats, level: u8) -> Self {
        let level = level as u16;
        let hp = (2 * base.hp as u16 * level) / 100 + level + 10;
        let other = |b: u8| (2 * b as u16 * level) / 100 + 5;
        CombatStats {
            max_hp: hp,
            attack: other(base.attack),
            defense: other(base.defense),
            sp_attack: other(base.sp_attack),
            sp_defense: other(base.sp_defense),
            speed: other(base.speed),
        }
    }

    /// The raw value backing a stage-able stat. Accuracy has no raw value.
    pub fn get(&self, stat: StageStat) -> Option<u16> {
        match stat {
            StageStat::Attack => Some(self.attack),
            StageStat::Defense => Some(self.defense),
            StageStat::SpecialAttack => Some(self.sp_attack),
            StageStat::SpecialDefense => Some(self.sp_defense),
            StageStat::Speed => Some(self.speed),
            StageStat::Accuracy => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatStages([i8; 6]);

impl StatStages {
    pub fn get(&self, stat: StageStat) -> i8 {
        self.0[stat.index()]
    }

    /// Clamp-adjust one counter and return the delta actually applied.
    pub fn adjust(&mut self, stat: StageStat, delta: i8) -> i8 {
        let current = self.0[stat.index()];
        let next = (current as i16 + delta as i16).clamp(-(MAX_STAGE as i16), MAX_STAGE as i16) as i8;
        self.0[stat.index()] = next;
        next - current
    }

    pub fn reset(&mut self) {
        self.0 = [0; 6];
    }

    pub fn is_neutral(&self) -> bool {
        self.0.iter().all(|&s| s == 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolatileState {
    pub flinched: bool,
    pub confusion_turns: u8,
    /// Turns left before an asleep combatant wakes. Persists with the status.
    pub sleep_turns: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    species: Arc<SpeciesData>,
    nickname: Option<String>,
    level: u8,
    hp: u16,
    stats: CombatStats,
    pub moves: [Option<MoveSlot>; 4],
    pub stages: StatStages,
    status: Option<StatusCondition>,
    pub volatile: VolatileState,
}

impl Combatant {
    /// A fresh combatant at full health. Extra moves beyond four are dropped.
    pub fn new(species: Arc<SpeciesData>, level: u8, moves: Vec<Arc<MoveData>>) -> Self {
        let level = level.clamp(1, 100);
        let stats = CombatStats::calculate(&species.base_stats, level);
        let mut move_array = [const { None }; 4];
        for (i, data) in moves.into_iter().take(4).enumerate() {
            move_array[i] = Some(MoveSlot::new(data));
        }
        Combatant {
            species,
            nickname: None,
            level,
            hp: stats.max_hp,
            stats,
            moves: move_array,
            stages: StatStages::default(),
            status: None,
            volatile: VolatileState::default(),
        }
    }

    pub fn species(&self) -> &SpeciesData {
        &self.species
    }

    pub fn species_id(&self) -> SpeciesId {
        self.species.id
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn hp(&self) -> u16 {
        self.hp
    }

    pub fn max_hp(&self) -> u16 {
        self.stats.max_hp
    }

    pub fn stats(&self) -> &CombatStats {
        &self.stats
    }

    pub fn status(&self) -> Option<StatusCondition> {
        self.status
    }

    pub fn name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.species.name)
    }

    /// Record-safe nickname: separators are replaced and blank names clear it.
    pub fn set_nickname(&mut self, nickname: &str) {
        let cleaned: String = nickname
            .chars()
            .map(|c| if matches!(c, ',' | ':' | '\n' | '\r') { ' ' } else { c })
            .collect();
        let cleaned = cleaned.trim();
        self.nickname = (!cleaned.is_empty()).then(|| cleaned.to_string());
    }

    pub fn is_active(&self) -> bool {
        self.hp > 0
    }

    pub fn set_hp(&mut self, hp: u16) {
        self.hp = hp.min(self.stats.max_hp);
    }

    /// Returns true only when this damage took the combatant from active to fainted.
    pub fn apply_damage(&mut self, amount: u16) -> bool {
        let was_active = self.is_active();
        self.hp = self.hp.saturating_sub(amount);
        was_active && self.hp == 0
    }

    pub fn adjust_stage(&mut self, stat: StageStat, delta: i8) -> i8 {
        self.stages.adjust(stat, delta)
    }

    /// Majors are exclusive and fainted combatants take no new status.
    /// Returns whether the status was applied.
    pub fn set_status(&mut self, condition: StatusCondition) -> bool {
        if !self.is_active() || self.status.is_some() {
            return false;
        }
        self.status = Some(condition);
        true
    }

    pub fn clear_status(&mut self) {
        self.status = None;
        self.volatile.sleep_turns = 0;
    }

    pub fn is_confused(&self) -> bool {
        self.volatile.confusion_turns > 0
    }

    /// Resets stages and volatile flags. Sleep carried out of battle gets a
    /// fresh duration.
    pub fn end_of_battle_reset(&mut self, rng: &mut TurnRng, sleep_turns: std::ops::RangeInclusive<u8>) {
        self.stages.reset();
        self.volatile.flinched = false;
        self.volatile.confusion_turns = 0;
        if self.status == Some(StatusCondition::Asleep) {
            self.volatile.sleep_turns = rng.in_range(sleep_turns, "sleep duration after battle");
        } else {
            self.volatile.sleep_turns = 0;
        }
    }

    /// Clears stages and confusion when the combatant leaves the field.
    pub fn withdraw(&mut self) {
        self.stages.reset();
        self.volatile.flinched = false;
        self.volatile.confusion_turns = 0;
    }

    /// Full HP, PP and no status.
    pub fn restore(&mut self) {
        self.hp = self.stats.max_hp;
        self.clear_status();
        for slot in self.moves.iter_mut().flatten() {
            slot.restore();
        }
    }

    /// One-line roster entry:
    /// `species,nickname,level,hp,status,sleep_turns,Move:pp,...`
    pub fn to_record_line(&self) -> String {
        let mut fields = vec![
            self.species.id.0.to_string(),
            self.nickname.clone().unwrap_or_default(),
            self.level.to_string(),
            self.hp.to_string(),
            self.status.map_or(0, StatusCondition::code).to_string(),
            self.volatile.sleep_turns.to_string(),
        ];
        for slot in self.moves.iter().flatten() {
            fields.push(format!("{}:{}", slot.data.move_.identifier(), slot.pp));
        }
        fields.join(",")
    }

    pub fn from_record_line(line: &str, line_no: usize, catalog: &Catalog) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 6 {
            return Err(RecordError::malformed(line_no, "expected at least 6 fields"));
        }
        let number = |i: usize, what: &str| -> Result<u16, RecordError> {
            fields[i]
                .trim()
                .parse::<u16>()
                .map_err(|_| RecordError::malformed(line_no, format!("bad {}", what)))
        };

        let id = number(0, "species id")?;
        let species = catalog
            .species(SpeciesId(id))
            .cloned()
            .ok_or(RecordError::UnknownSpecies { line: line_no, id })?;
        let level = u8::try_from(number(2, "level")?)
            .map_err(|_| RecordError::malformed(line_no, "level out of range"))?;
        let hp = number(3, "hp")?;
        let status_code = u8::try_from(number(4, "status")?)
            .map_err(|_| RecordError::malformed(line_no, "status out of range"))?;
        let status = StatusCondition::from_code(status_code)
            .ok_or_else(|| RecordError::malformed(line_no, format!("unknown status code {}", status_code)))?;
        let sleep_turns = u8::try_from(number(5, "sleep turns")?)
            .map_err(|_| RecordError::malformed(line_no, "sleep turns out of range"))?;

        let mut moves = Vec::new();
        let mut pps = Vec::new();
        for entry in fields.iter().skip(6).filter(|f| !f.is_empty()) {
            let (name, pp) = entry
                .split_once(':')
                .ok_or_else(|| RecordError::malformed(line_no, format!("bad move entry {}", entry)))?;
            let move_ = Move::from_str(name).map_err(|_| RecordError::UnknownMove {
                line: line_no,
                name: name.to_string(),
            })?;
            let data = catalog.move_data(move_).cloned().ok_or(RecordError::UnknownMove {
                line: line_no,
                name: name.to_string(),
            })?;
            let pp: u8 = pp
                .parse()
                .map_err(|_| RecordError::malformed(line_no, format!("bad pp for {}", name)))?;
            moves.push(data);
            pps.push(pp);
        }
        if moves.len() > 4 {
            return Err(RecordError::malformed(line_no, "more than four moves"));
        }

        let mut combatant = Combatant::new(species, level, moves);
        if combatant.level != level {
            return Err(RecordError::malformed(line_no, "level out of range"));
        }
        for (slot, pp) in combatant.moves.iter_mut().flatten().zip(pps) {
            slot.pp = pp.min(slot.max_pp());
        }
        combatant.set_nickname(fields[1]);
        combatant.set_hp(hp);
        combatant.status = status;
        combatant.volatile.sleep_turns = sleep_turns;
        Ok(combatant)
    }
}
