//! A trainer's roster: the six-slot squad, overflow storage and the dex
//! counters, plus the line-oriented record it is persisted as.

use crate::catalog::Catalog;
use crate::combatant::Combatant;
use crate::errors::{BattleResult, RecordError, StateConflict, ValidationError};
use crate::ids::TrainerId;
use schema::{SpeciesData, SpeciesId};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const SQUAD_SIZE: usize = 6;

pub type Squad = [Option<Combatant>; SQUAD_SIZE];

pub const DEX_UNSEEN: u8 = 0;
pub const DEX_SEEN: u8 = 1;
pub const DEX_OWNED: u8 = 2;

/// Entries shown by one dex listing.
pub const DEX_LISTING_LIMIT: usize = 20;

/// Where a newly acquired combatant ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Squad(usize),
    Storage(usize),
}

#[derive(Debug, Clone)]
pub struct Trainer {
    id: TrainerId,
    name: String,
    squad: Squad,
    storage: Vec<Combatant>,
    dex: Vec<u8>,
    started: bool,
    in_battle: bool,
    page: usize,
    /// Storage indices awaiting a release confirmation, highest first.
    pending_release: Option<Vec<usize>>,
    reset_requested: bool,
}

impl Trainer {
    /// A trainer who has not picked a starter. The starters count as seen.
    pub fn new(id: TrainerId, name: impl Into<String>, catalog: &Catalog) -> Self {
        let mut trainer = Trainer {
            id,
            name: name.into(),
            squad: Default::default(),
            storage: Vec::new(),
            dex: vec![DEX_UNSEEN; catalog.dex_size()],
            started: false,
            in_battle: false,
            page: 0,
            pending_release: None,
            reset_requested: false,
        };
        for &starter in catalog.starters() {
            trainer.mark_seen(starter);
        }
        trainer
    }

    pub fn id(&self) -> TrainerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn in_battle(&self) -> bool {
        self.in_battle
    }

    pub fn squad(&self) -> &Squad {
        &self.squad
    }

    pub fn storage(&self) -> &[Combatant] {
        &self.storage
    }

    pub fn dex(&self) -> &[u8] {
        &self.dex
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn squad_len(&self) -> usize {
        self.squad.iter().flatten().count()
    }

    /// First squad slot holding a combatant able to battle.
    pub fn first_eligible(&self) -> Option<usize> {
        self.squad
            .iter()
            .position(|slot| slot.as_ref().is_some_and(Combatant::is_active))
    }

    /// Raise an unseen species to seen. Never downgrades.
    pub fn mark_seen(&mut self, species: SpeciesId) {
        if let Some(entry) = self.dex.get_mut(species.0 as usize) {
            *entry = (*entry).max(DEX_SEEN);
        }
    }

    pub fn mark_owned(&mut self, species: SpeciesId) {
        if let Some(entry) = self.dex.get_mut(species.0 as usize) {
            *entry = DEX_OWNED;
        }
    }

    /// Hand the squad over to a battle session.
    pub fn enter_battle(&mut self) -> Squad {
        self.in_battle = true;
        self.pending_release = None;
        self.reset_requested = false;
        std::mem::take(&mut self.squad)
    }

    /// Take the squad back from a finished session.
    pub fn leave_battle(&mut self, squad: Squad) {
        self.squad = squad;
        self.in_battle = false;
    }

    /// Release the battle lock without returning a squad. Used when a
    /// session is torn down before the trainer joined.
    pub fn clear_battle_flag(&mut self) {
        self.in_battle = false;
    }

    fn ensure_idle(&self) -> BattleResult<()> {
        if !self.started {
            return Err(ValidationError::NotStarted.into());
        }
        if self.in_battle {
            return Err(StateConflict::BattleInProgress.into());
        }
        Ok(())
    }

    /// Pick one of the catalog's starters by name.
    pub fn pick_starter(&mut self, name: &str, catalog: &Catalog) -> BattleResult<&Combatant> {
        if self.started {
            return Err(ValidationError::AlreadyStarted.into());
        }
        let species = catalog
            .species_by_name(name)
            .ok_or_else(|| ValidationError::UnknownSpecies(name.to_string()))?;
        if !catalog.starters().contains(&species.id) {
            return Err(ValidationError::NotAStarter(species.name.clone()).into());
        }
        let starter = catalog.create_combatant(species.id, catalog.starter_level())?;
        self.mark_owned(starter.species_id());
        self.started = true;
        tracing::info!(trainer = %self.id, starter = starter.name(), "starter picked");
        Ok(&*self.squad[0].insert(starter))
    }

    pub fn swap(&mut self, a: usize, b: usize) -> BattleResult<()> {
        self.ensure_idle()?;
        for index in [a, b] {
            if self.squad.get(index).and_then(Option::as_ref).is_none() {
                return Err(ValidationError::InvalidSquadIndex(index).into());
            }
        }
        self.squad.swap(a, b);
        self.pending_release = None;
        Ok(())
    }

    /// Move a squad member into storage. The remaining squad closes the gap.
    pub fn deposit(&mut self, index: usize) -> BattleResult<&Combatant> {
        self.ensure_idle()?;
        if self.squad.get(index).and_then(Option::as_ref).is_none() {
            return Err(ValidationError::InvalidSquadIndex(index).into());
        }
        if self.squad_len() <= 1 {
            return Err(ValidationError::LastCombatant.into());
        }
        let Some(combatant) = self.squad[index].take() else {
            return Err(ValidationError::InvalidSquadIndex(index).into());
        };
        self.compact_squad();
        self.pending_release = None;
        self.storage.push(combatant);
        Ok(&self.storage[self.storage.len() - 1])
    }

    /// Move a stored combatant into the first free squad slot.
    pub fn withdraw(&mut self, index: usize) -> BattleResult<&Combatant> {
        self.ensure_idle()?;
        if index >= self.storage.len() {
            return Err(ValidationError::InvalidStorageIndex(index).into());
        }
        let slot = self
            .squad
            .iter()
            .position(Option::is_none)
            .ok_or(ValidationError::SquadFull)?;
        let combatant = self.storage.remove(index);
        self.pending_release = None;
        Ok(&*self.squad[slot].insert(combatant))
    }

    /// First step of a release: validate the storage indices and remember
    /// them. Returns the names that would be released.
    pub fn preview_release(&mut self, indices: &[usize]) -> BattleResult<Vec<String>> {
        self.ensure_idle()?;
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        if let Some(&bad) = unique.iter().find(|&&i| i >= self.storage.len()) {
            return Err(ValidationError::InvalidStorageIndex(bad).into());
        }
        let names = unique.iter().map(|&i| self.storage[i].name().to_string()).collect();
        self.pending_release = Some(unique.into_iter().rev().collect());
        Ok(names)
    }

    /// Second step of a release. Returns how many combatants were released.
    pub fn confirm_release(&mut self) -> BattleResult<usize> {
        self.ensure_idle()?;
        let indices = self
            .pending_release
            .take()
            .ok_or(ValidationError::NothingToConfirm)?;
        for &index in &indices {
            self.storage.remove(index);
        }
        self.page = 0;
        Ok(indices.len())
    }

    pub fn set_page(&mut self, page: usize, per_page: usize) -> BattleResult<()> {
        self.ensure_idle()?;
        if page >= page_count(self.storage.len(), per_page) {
            return Err(ValidationError::InvalidPage(page).into());
        }
        self.page = page;
        Ok(())
    }

    /// Full HP, PP and no status for every squad member.
    pub fn heal_all(&mut self) -> BattleResult<()> {
        self.ensure_idle()?;
        for combatant in self.squad.iter_mut().flatten() {
            combatant.restore();
            combatant.withdraw();
        }
        Ok(())
    }

    /// Place a captured combatant: the squad if there is room, storage otherwise.
    pub fn add_captured(&mut self, combatant: Combatant) -> Placement {
        self.mark_owned(combatant.species_id());
        match self.squad.iter().position(Option::is_none) {
            Some(slot) => {
                self.squad[slot] = Some(combatant);
                Placement::Squad(slot)
            }
            None => {
                self.storage.push(combatant);
                Placement::Storage(self.storage.len() - 1)
            }
        }
    }

    /// First step of a reset. Nothing is forgotten until [`Self::confirm_reset`].
    pub fn request_reset(&mut self) -> BattleResult<()> {
        self.ensure_idle()?;
        self.reset_requested = true;
        Ok(())
    }

    pub fn cancel_reset(&mut self) -> BattleResult<()> {
        if !std::mem::take(&mut self.reset_requested) {
            return Err(ValidationError::NothingToConfirm.into());
        }
        Ok(())
    }

    /// Forget everything: squad, storage, dex and the started flag.
    pub fn confirm_reset(&mut self, catalog: &Catalog) -> BattleResult<()> {
        self.ensure_idle()?;
        if !self.reset_requested {
            return Err(ValidationError::NothingToConfirm.into());
        }
        *self = Trainer::new(self.id, std::mem::take(&mut self.name), catalog);
        Ok(())
    }

    fn compact_squad(&mut self) {
        let members: Vec<Combatant> = self.squad.iter_mut().filter_map(Option::take).collect();
        for (slot, combatant) in self.squad.iter_mut().zip(members) {
            *slot = Some(combatant);
        }
    }

    pub fn render_squad(&self) -> String {
        let mut lines = vec![format!("{}'s squad:", self.name)];
        lines.extend(
            self.squad
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.as_ref().map(|c| entry_line(i, c))),
        );
        lines.join("\n")
    }

    /// The current storage page with a "PAGE x of y" footer.
    pub fn render_storage(&self, per_page: usize) -> String {
        if self.storage.is_empty() {
            return "Your storage is empty.".to_string();
        }
        let per_page = per_page.max(1);
        let page = self.page.min(page_count(self.storage.len(), per_page) - 1);
        let mut lines = vec!["Storage:".to_string()];
        lines.extend(
            self.storage
                .iter()
                .enumerate()
                .skip(page * per_page)
                .take(per_page)
                .map(|(i, c)| entry_line(i, c)),
        );
        lines.push(format!(
            "PAGE {} of {}",
            page + 1,
            page_count(self.storage.len(), per_page)
        ));
        lines.join("\n")
    }

    /// Catalog species from #001 through the highest species seen so far.
    fn dex_range<'a>(&self, catalog: &'a Catalog) -> impl Iterator<Item = &'a Arc<SpeciesData>> {
        let last = self.dex.iter().rposition(|&c| c != DEX_UNSEEN).unwrap_or(0);
        (1..=last).filter_map(move |id| catalog.species(SpeciesId(id as u16)))
    }

    /// The first [`DEX_LISTING_LIMIT`] dex lines.
    pub fn dex_lines(&self, catalog: &Catalog) -> Vec<String> {
        self.dex_range(catalog)
            .take(DEX_LISTING_LIMIT)
            .map(|species| {
                let mark = match self.dex.get(species.id.0 as usize).copied() {
                    Some(DEX_OWNED) => "owned",
                    Some(DEX_SEEN) => "seen",
                    _ => return format!("{} ----------", species.id),
                };
                format!("{} {} ({})", species.id, species.name, mark)
            })
            .collect()
    }

    pub fn render_dex(&self, catalog: &Catalog) -> String {
        let lines = self.dex_lines(catalog);
        if lines.is_empty() {
            return "You haven't discovered any monsters yet.".to_string();
        }
        let seen = self.dex.iter().filter(|&&c| c >= DEX_SEEN).count();
        let owned = self.dex.iter().filter(|&&c| c == DEX_OWNED).count();
        let mut out = vec![format!("{}'s dex: {} seen, {} owned", self.name, seen, owned)];
        let truncated = self.dex_range(catalog).count() > lines.len();
        out.extend(lines);
        if truncated {
            out.push("Use dex <number> or dex <name> for a single entry.".to_string());
        }
        out.join("\n")
    }

    /// One species as this trainer knows it. Undiscovered species stay hidden.
    pub fn dex_entry(&self, species: &SpeciesData) -> String {
        let mark = self.dex.get(species.id.0 as usize).copied().unwrap_or(DEX_UNSEEN);
        if mark == DEX_UNSEEN {
            return format!("{} ----------\nNot discovered yet.", species.id);
        }
        let types: Vec<String> = species.types.iter().map(|t| t.to_string().to_uppercase()).collect();
        let base = &species.base_stats;
        let mut lines = vec![
            format!(
                "{} {} ({})",
                species.id,
                species.name,
                if mark == DEX_OWNED { "owned" } else { "seen" }
            ),
            format!("Type: {}", types.join("/")),
        ];
        if !species.description.is_empty() {
            lines.push(species.description.clone());
        }
        lines.push(format!(
            "Base: HP {} ATK {} DEF {} SPA {} SPD {} SPE {}",
            base.hp, base.attack, base.defense, base.sp_attack, base.sp_defense, base.speed
        ));
        lines.push(format!("Catch rate: {}", species.catch_rate));
        lines.join("\n")
    }

    /// Detailed view of one squad member.
    pub fn render_stats(&self, index: usize) -> BattleResult<String> {
        let combatant = self
            .squad
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(ValidationError::InvalidSquadIndex(index))?;
        let species = combatant.species();
        let stats = combatant.stats();
        let types: Vec<String> = species.types.iter().map(|t| t.to_string().to_uppercase()).collect();
        let status = match combatant.status() {
            _ if !combatant.is_active() => "FNT".to_string(),
            Some(status) => status.to_string(),
            None => "OK".to_string(),
        };
        let mut lines = vec![
            format!(
                "{}. {} Lv.{} ({} {})",
                index + 1,
                combatant.name(),
                combatant.level(),
                species.id,
                species.name
            ),
            format!("Type: {}", types.join("/")),
            format!("HP {}/{} Status: {}", combatant.hp(), combatant.max_hp(), status),
            format!(
                "ATK {} DEF {} SPA {} SPD {} SPE {}",
                stats.attack, stats.defense, stats.sp_attack, stats.sp_defense, stats.speed
            ),
            "Moves:".to_string(),
        ];
        lines.extend(combatant.moves.iter().flatten().map(|slot| {
            format!(
                "- {} {} {}/{}",
                slot.data.name,
                slot.data.move_type.to_string().to_uppercase(),
                slot.pp,
                slot.max_pp()
            )
        }));
        Ok(lines.join("\n"))
    }

    /// The persisted record: `squad`, `storage` and `dex` sections.
    pub fn to_record(&self) -> String {
        let mut lines = vec!["squad".to_string()];
        lines.extend(self.squad.iter().flatten().map(Combatant::to_record_line));
        lines.push("storage".to_string());
        lines.extend(self.storage.iter().map(Combatant::to_record_line));
        lines.push("dex".to_string());
        lines.push(
            self.dex
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(","),
        );
        let mut record = lines.join("\n");
        record.push('\n');
        record
    }

    /// Rebuild a trainer from its record. Everything in the squad or storage
    /// is marked owned in the dex.
    pub fn from_record(
        id: TrainerId,
        name: impl Into<String>,
        text: &str,
        catalog: &Catalog,
    ) -> Result<Self, RecordError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Section {
            None,
            Squad,
            Storage,
            Dex,
        }

        let mut trainer = Trainer::new(id, name, catalog);
        let mut section = Section::None;
        let mut seen_sections = [false; 3];
        let mut squad_len = 0;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim_end();
            match line {
                "squad" => {
                    section = Section::Squad;
                    seen_sections[0] = true;
                    continue;
                }
                "storage" => {
                    section = Section::Storage;
                    seen_sections[1] = true;
                    continue;
                }
                "dex" => {
                    section = Section::Dex;
                    seen_sections[2] = true;
                    continue;
                }
                "" => continue,
                _ => {}
            }
            match section {
                Section::None => return Err(RecordError::malformed(line_no, "data before the first section")),
                Section::Squad => {
                    if squad_len >= SQUAD_SIZE {
                        return Err(RecordError::malformed(line_no, "more than six squad members"));
                    }
                    trainer.squad[squad_len] = Some(Combatant::from_record_line(line, line_no, catalog)?);
                    squad_len += 1;
                }
                Section::Storage => {
                    trainer
                        .storage
                        .push(Combatant::from_record_line(line, line_no, catalog)?);
                }
                Section::Dex => {
                    for (slot, value) in line.split(',').filter(|v| !v.trim().is_empty()).enumerate() {
                        let value: u8 = value
                            .trim()
                            .parse()
                            .map_err(|_| RecordError::malformed(line_no, format!("bad dex value {}", value)))?;
                        if let Some(entry) = trainer.dex.get_mut(slot) {
                            *entry = value.min(DEX_OWNED);
                        }
                    }
                }
            }
        }

        for (present, name) in seen_sections.iter().zip(["squad", "storage", "dex"]) {
            if !present {
                return Err(RecordError::MissingSection(name));
            }
        }

        let owned: Vec<SpeciesId> = trainer
            .squad
            .iter()
            .flatten()
            .chain(trainer.storage.iter())
            .map(Combatant::species_id)
            .collect();
        for species in owned {
            trainer.mark_owned(species);
        }
        trainer.started = squad_len > 0 || !trainer.storage.is_empty();
        Ok(trainer)
    }
}

pub fn page_count(entries: usize, per_page: usize) -> usize {
    entries.div_ceil(per_page.max(1)).max(1)
}

fn entry_line(index: usize, combatant: &Combatant) -> String {
    let condition = if !combatant.is_active() {
        " FNT".to_string()
    } else {
        combatant.status().map(|s| format!(" {}", s)).unwrap_or_default()
    };
    format!(
        "{}. {} Lv.{} HP {}/{}{}",
        index + 1,
        combatant.name(),
        combatant.level(),
        combatant.hp(),
        combatant.max_hp(),
        condition
    )
}
