//! The engine context handed to a transport.
//!
//! One [`BattleService`] owns the reference catalog, the trainer registry,
//! the shared random source and a lock per channel. Work on one channel is
//! serialized by that channel's lock; channels never wait on each other.
//! Lock order is always channel, then trainers, then the random source.

use crate::battle::opponent::Opponent;
use crate::battle::rng::TurnRng;
use crate::battle::session::{BattleSession, PlayerAction};
use crate::battle::state::EndReason;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::errors::{BattleError, BattleResult, StateConflict, StoreError, ValidationError};
use crate::ids::{ChannelId, TrainerId};
use crate::persistence::{PersistenceHandle, PersistenceWorker, RosterStore};
use crate::roster::{Placement, Trainer};
use crate::sequencer::{AdvanceSubscription, Chunk, MessageSequencer, NarrationSink};
use crate::world::{self, paginate, MAX_CHUNK_LINES};
use schema::{LocationId, SpeciesId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications for the transport and anything else listening.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        channel: ChannelId,
        opponent: String,
    },
    Joined {
        channel: ChannelId,
        trainer: TrainerId,
    },
    TurnResolved {
        channel: ChannelId,
        turn: u32,
    },
    Ended {
        channel: ChannelId,
        reason: EndReason,
        trainer: Option<TrainerId>,
    },
    /// The session hit an internal error and was torn down.
    Aborted {
        channel: ChannelId,
        detail: String,
    },
}

struct ChannelState {
    location: LocationId,
    session: Option<BattleSession>,
    sequencer: MessageSequencer,
}

impl ChannelState {
    fn new(location: LocationId) -> Self {
        Self {
            location,
            session: None,
            sequencer: MessageSequencer::new(),
        }
    }

    /// Queue narration. When nothing was waiting, the first chunk goes out at once.
    fn publish(&mut self, chunks: Vec<String>) -> Option<Chunk> {
        let idle = !self.sequencer.has_pending();
        self.sequencer.enqueue(chunks);
        if idle {
            self.sequencer.advance()
        } else {
            None
        }
    }

    fn publish_text(&mut self, text: &str) -> Option<Chunk> {
        self.publish(paginate(text, MAX_CHUNK_LINES))
    }

    fn ensure_no_session(&self) -> Result<(), StateConflict> {
        match self.session {
            Some(_) => Err(StateConflict::SessionExists),
            None => Ok(()),
        }
    }
}

/// Every operation returns the chunk it delivered right away, if any. Further
/// chunks wait in the channel's sequencer for [`BattleService::advance`].
pub struct BattleService {
    catalog: Arc<Catalog>,
    config: EngineConfig,
    channels: Mutex<HashMap<ChannelId, Arc<AsyncMutex<ChannelState>>>>,
    trainers: Mutex<HashMap<TrainerId, Trainer>>,
    store: Arc<dyn RosterStore>,
    persistence: PersistenceHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
    rng: Mutex<TurnRng>,
    events: broadcast::Sender<SessionEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn default_name(id: TrainerId) -> String {
    format!("TRAINER{}", id)
}

impl BattleService {
    /// Must be called inside a tokio runtime: the persistence worker is
    /// spawned here.
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig, store: Arc<dyn RosterStore>) -> Self {
        let rng = match config.seed {
            Some(seed) => TurnRng::from_seed(seed),
            None => TurnRng::new_random(),
        };
        let (persistence, worker) = PersistenceWorker::spawn(Arc::clone(&store));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(seeded = config.seed.is_some(), "battle service ready");
        Self {
            catalog,
            config,
            channels: Mutex::new(HashMap::new()),
            trainers: Mutex::new(HashMap::new()),
            store,
            persistence,
            worker: Mutex::new(Some(worker)),
            rng: Mutex::new(rng),
            events,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    fn channel_state(&self, channel: ChannelId) -> Arc<AsyncMutex<ChannelState>> {
        let start = self.catalog.start_location();
        Arc::clone(
            lock(&self.channels)
                .entry(channel)
                .or_insert_with(|| Arc::new(AsyncMutex::new(ChannelState::new(start)))),
        )
    }

    fn location_name(&self, id: LocationId) -> String {
        self.catalog
            .location(id)
            .map_or_else(|| id.to_string(), |l| l.name.clone())
    }

    /// Put a trainer in the registry on first use: their saved roster, or a
    /// fresh trainer when there is none. The store is read on the blocking
    /// pool with no lock held.
    async fn load_trainer(&self, id: TrainerId, name: impl Into<String>) -> BattleResult<()> {
        if lock(&self.trainers).contains_key(&id) {
            return Ok(());
        }
        let store = Arc::clone(&self.store);
        let record = tokio::task::spawn_blocking(move || store.load(id))
            .await
            .map_err(StoreError::from)??;
        let name = name.into();
        let trainer = match record {
            Some(text) => {
                let trainer = Trainer::from_record(id, name, &text, &self.catalog).map_err(StoreError::from)?;
                debug!(trainer = %id, "roster loaded");
                trainer
            }
            None => Trainer::new(id, name, &self.catalog),
        };
        // A concurrent first use may have won the race; keep its copy.
        lock(&self.trainers).entry(id).or_insert(trainer);
        Ok(())
    }

    /// Run `op` on a trainer already in the registry.
    fn with_trainer<R>(
        &self,
        id: TrainerId,
        op: impl FnOnce(&mut Trainer) -> BattleResult<R>,
    ) -> BattleResult<R> {
        match lock(&self.trainers).get_mut(&id) {
            Some(trainer) => op(trainer),
            None => Err(BattleError::invariant(format!("trainer {} is not loaded", id))),
        }
    }

    /// Give a trainer a display name. Loads their saved roster if they are new
    /// to this process; a trainer already loaded keeps their name.
    pub async fn register_trainer(&self, id: TrainerId, name: &str) -> BattleResult<()> {
        self.load_trainer(id, name).await
    }

    /// A copy of the trainer's current record.
    pub async fn trainer(&self, id: TrainerId) -> BattleResult<Trainer> {
        self.load_trainer(id, default_name(id)).await?;
        self.with_trainer(id, |t| Ok(t.clone()))
    }

    // Encounters

    /// Roll a wild combatant from the channel's location.
    pub async fn start_wild_encounter(&self, channel: ChannelId) -> BattleResult<Option<Chunk>> {
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        state.ensure_no_session()?;
        let wild = {
            let mut rng = lock(&self.rng);
            self.catalog.spawn(state.location, &mut rng)?
        };
        let Some(wild) = wild else {
            return Err(ValidationError::NoWildSpawns(self.location_name(state.location)).into());
        };
        self.open_session(&mut state, channel, Opponent::wild(wild))
    }

    /// Bring out a scripted trainer.
    pub async fn start_trainer_challenge(&self, channel: ChannelId) -> BattleResult<Option<Chunk>> {
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        state.ensure_no_session()?;
        let drawn = {
            let mut rng = lock(&self.rng);
            self.catalog.challenge(&mut rng)?
        };
        let (name, squad) = drawn.ok_or(ValidationError::NoChallengers)?;
        self.open_session(&mut state, channel, Opponent::trainer(name, squad))
    }

    fn open_session(
        &self,
        state: &mut ChannelState,
        channel: ChannelId,
        opponent: Opponent,
    ) -> BattleResult<Option<Chunk>> {
        let label = opponent.label();
        let (session, bus) = BattleSession::new(channel, opponent, &self.catalog, &self.config)?;
        state.session = Some(session);
        self.emit(SessionEvent::Started {
            channel,
            opponent: label,
        });
        Ok(state.publish(bus.narrate()))
    }

    // Battle

    pub async fn join(
        &self,
        channel: ChannelId,
        trainer: TrainerId,
        choice: Option<usize>,
    ) -> BattleResult<Option<Chunk>> {
        self.load_trainer(trainer, default_name(trainer)).await?;
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        let session = state.session.as_mut().ok_or(ValidationError::NoSession)?;
        let bus = self
            .with_trainer(trainer, |t| session.join(t, choice))
            .inspect_err(|err| debug!(%channel, %trainer, %err, "join rejected"))?;
        self.emit(SessionEvent::Joined { channel, trainer });
        Ok(state.publish(bus.narrate()))
    }

    pub async fn submit_action(
        &self,
        channel: ChannelId,
        trainer: TrainerId,
        action: PlayerAction,
    ) -> BattleResult<Option<Chunk>> {
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        let session = state.session.as_mut().ok_or(ValidationError::NoSession)?;
        let result = {
            let mut rng = lock(&self.rng);
            session.submit_action(trainer, action, &mut rng)
        };
        let (terminal, turn) = (session.is_terminal(), session.turn_number());

        match result {
            Ok(bus) => {
                let mut chunks = bus.narrate();
                if terminal {
                    chunks.extend(self.close_session(&mut state, channel));
                } else {
                    self.emit(SessionEvent::TurnResolved { channel, turn });
                }
                Ok(state.publish(chunks))
            }
            Err(BattleError::Invariant(detail)) => Err(self.abort_session(&mut state, channel, detail)),
            Err(err) => {
                debug!(%channel, %trainer, %err, "action rejected");
                Err(err)
            }
        }
    }

    /// Settle a finished session: the squad goes home, a capture joins the
    /// roster and the result is saved. Returns extra narration.
    fn close_session(&self, state: &mut ChannelState, channel: ChannelId) -> Vec<String> {
        let Some(session) = state.session.take() else {
            return Vec::new();
        };
        let settlement = {
            let mut rng = lock(&self.rng);
            session.settle(&mut rng)
        };
        let mut lines = Vec::new();

        if let Some(id) = settlement.trainer {
            let returned = self.with_trainer(id, |trainer| {
                match settlement.squad {
                    Some(squad) => trainer.leave_battle(squad),
                    None => trainer.clear_battle_flag(),
                }
                for &species in &settlement.seen {
                    trainer.mark_seen(species);
                }
                if let Some(captured) = settlement.captured {
                    let name = captured.name().to_string();
                    lines.push(match trainer.add_captured(captured) {
                        Placement::Squad(_) => format!("{} joined {}'s squad.", name, trainer.name()),
                        Placement::Storage(_) => format!("The squad is full. {} was sent to storage.", name),
                    });
                }
                self.persistence.save(id, trainer.to_record());
                Ok(())
            });
            if let Err(err) = returned {
                error!(%channel, trainer = %id, %err, "failed to return the squad");
            }
        }

        if let Some(reason) = settlement.reason {
            self.emit(SessionEvent::Ended {
                channel,
                reason,
                trainer: settlement.trainer,
            });
        }
        lines
    }

    /// Tear down a session that reached an impossible state. Other channels
    /// are untouched.
    fn abort_session(&self, state: &mut ChannelState, channel: ChannelId, detail: String) -> BattleError {
        error!(%channel, %detail, "invariant violated; tearing the session down");
        self.close_session(state, channel);
        state.sequencer.clear();
        self.emit(SessionEvent::Aborted {
            channel,
            detail: detail.clone(),
        });
        BattleError::Invariant(detail)
    }

    // Narration

    pub async fn advance(&self, channel: ChannelId) -> Option<Chunk> {
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        state.sequencer.advance()
    }

    pub async fn active_delivery(&self, channel: ChannelId) -> Option<Chunk> {
        let state = self.channel_state(channel);
        let state = state.lock().await;
        state.sequencer.peek_active_delivery().cloned()
    }

    /// Route advance signals for `channel` to `sink` until the subscription
    /// is cancelled or dropped.
    pub fn subscribe_advance<S: NarrationSink>(self: &Arc<Self>, channel: ChannelId, sink: S) -> AdvanceSubscription {
        let service = Arc::clone(self);
        AdvanceSubscription::spawn(
            channel,
            move || {
                let service = Arc::clone(&service);
                async move { service.advance(channel).await }
            },
            sink,
        )
    }

    // World

    pub async fn look(&self, channel: ChannelId) -> BattleResult<Option<Chunk>> {
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        let text = world::describe_location(&self.catalog, state.location)?;
        Ok(state.publish_text(&text))
    }

    /// Move the channel to one of its location's neighbours.
    pub async fn travel(&self, channel: ChannelId, index: usize) -> BattleResult<Option<Chunk>> {
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        if state.session.is_some() {
            return Err(StateConflict::BattleInProgress.into());
        }
        let to = world::destination(&self.catalog, state.location, index)?;
        info!(%channel, from = %state.location, %to, "travelled");
        state.location = to;
        let text = world::describe_location(&self.catalog, to)?;
        Ok(state.publish_text(&text))
    }

    // Roster

    async fn roster_op<F>(
        &self,
        channel: ChannelId,
        trainer: TrainerId,
        needs_center: bool,
        op: F,
    ) -> BattleResult<Option<Chunk>>
    where
        F: FnOnce(&mut Trainer) -> BattleResult<String> + Send,
    {
        self.load_trainer(trainer, default_name(trainer)).await?;
        let state = self.channel_state(channel);
        let mut state = state.lock().await;
        if needs_center && !world::has_center(&self.catalog, state.location) {
            return Err(ValidationError::NoHealingCenter.into());
        }
        let text = self
            .with_trainer(trainer, op)
            .inspect_err(|err| debug!(%channel, %trainer, %err, "roster request rejected"))?;
        Ok(state.publish_text(&text))
    }

    pub async fn pick_starter(&self, channel: ChannelId, trainer: TrainerId, species: &str) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| {
            let starter = t.pick_starter(species, &self.catalog)?.name().to_string();
            self.persistence.save(t.id(), t.to_record());
            Ok(format!("{} received {}! Take good care of it.", t.name(), starter))
        })
        .await
    }

    pub async fn show_squad(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| Ok(t.render_squad())).await
    }

    pub async fn show_storage(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        let per_page = self.config.entries_per_page;
        self.roster_op(channel, trainer, true, |t| Ok(t.render_storage(per_page)))
            .await
    }

    pub async fn show_dex(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| Ok(t.render_dex(&self.catalog)))
            .await
    }

    /// One dex entry, looked up by national number or by name.
    pub async fn dex_entry(&self, channel: ChannelId, trainer: TrainerId, query: &str) -> BattleResult<Option<Chunk>> {
        let query = query.trim();
        let species = query
            .parse::<u16>()
            .ok()
            .and_then(|n| self.catalog.species(SpeciesId(n)))
            .or_else(|| self.catalog.species_by_name(query))
            .cloned()
            .ok_or_else(|| ValidationError::UnknownSpecies(query.to_string()))?;
        self.roster_op(channel, trainer, false, move |t| Ok(t.dex_entry(&species)))
            .await
    }

    pub async fn show_stats(&self, channel: ChannelId, trainer: TrainerId, index: usize) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| t.render_stats(index)).await
    }

    pub async fn swap(&self, channel: ChannelId, trainer: TrainerId, a: usize, b: usize) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| {
            t.swap(a, b)?;
            Ok(t.render_squad())
        })
        .await
    }

    pub async fn deposit(&self, channel: ChannelId, trainer: TrainerId, index: usize) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, true, |t| {
            let name = t.deposit(index)?.name().to_string();
            Ok(format!("{} was moved to storage.", name))
        })
        .await
    }

    pub async fn withdraw(&self, channel: ChannelId, trainer: TrainerId, index: usize) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, true, |t| {
            let name = t.withdraw(index)?.name().to_string();
            Ok(format!("{} rejoined the squad.", name))
        })
        .await
    }

    /// First half of a release. Nothing is removed until [`Self::confirm_release`].
    pub async fn preview_release(
        &self,
        channel: ChannelId,
        trainer: TrainerId,
        indices: &[usize],
    ) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, true, |t| {
            let names = t.preview_release(indices)?;
            Ok(format!("Release {}? Confirm to say goodbye.", names.join(", ")))
        })
        .await
    }

    pub async fn confirm_release(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, true, |t| {
            let released = t.confirm_release()?;
            Ok(match released {
                1 => "Released 1 monster. Bye-bye!".to_string(),
                n => format!("Released {} monsters. Bye-bye!", n),
            })
        })
        .await
    }

    pub async fn set_page(&self, channel: ChannelId, trainer: TrainerId, page: usize) -> BattleResult<Option<Chunk>> {
        let per_page = self.config.entries_per_page;
        self.roster_op(channel, trainer, true, |t| {
            t.set_page(page, per_page)?;
            Ok(t.render_storage(per_page))
        })
        .await
    }

    pub async fn heal(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, true, |t| {
            t.heal_all()?;
            Ok("Your squad is fully healed!".to_string())
        })
        .await
    }

    pub async fn save(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| {
            // The squad lives in the session during a battle.
            if t.in_battle() {
                return Err(StateConflict::BattleInProgress.into());
            }
            self.persistence.save(t.id(), t.to_record());
            Ok(format!("{}'s progress was saved.", t.name()))
        })
        .await
    }

    /// First half of a reset. Nothing is forgotten until [`Self::confirm_reset`].
    pub async fn reset(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| {
            t.request_reset()?;
            Ok("This deletes every monster and all progress. Confirm the reset or cancel it.".to_string())
        })
        .await
    }

    /// Wipe the roster and delete the saved record.
    pub async fn confirm_reset(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| {
            t.confirm_reset(&self.catalog)?;
            self.persistence.delete(t.id());
            info!(trainer = %t.id(), "roster reset");
            Ok(format!("{} starts over. Pick a starter!", t.name()))
        })
        .await
    }

    pub async fn cancel_reset(&self, channel: ChannelId, trainer: TrainerId) -> BattleResult<Option<Chunk>> {
        self.roster_op(channel, trainer, false, |t| {
            t.cancel_reset()?;
            Ok("Reset cancelled. Your data is safe.".to_string())
        })
        .await
    }

    /// Wait until every queued roster write has reached the store.
    pub async fn flush(&self) {
        self.persistence.flush().await;
    }

    /// Flush pending writes and stop the persistence worker.
    pub async fn shutdown(&self) {
        self.persistence.flush().await;
        self.persistence.shutdown();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                error!(%err, "persistence worker ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::state::{SessionPhase, Side};
    use crate::battle::tests::common::test_catalog;
    use crate::combatant::MoveSlot;
    use crate::persistence::{MemoryRosterStore, StoreResult};
    use pretty_assertions::assert_eq;
    use schema::Move;
    use std::time::Duration;

    const CHANNEL: ChannelId = ChannelId(1);
    const ASH: TrainerId = TrainerId(5);

    fn service_with(store: Arc<MemoryRosterStore>) -> BattleService {
        let config = EngineConfig {
            seed: Some(7),
            ..EngineConfig::default()
        };
        BattleService::new(test_catalog(), config, store)
    }

    fn service() -> BattleService {
        service_with(Arc::new(MemoryRosterStore::new()))
    }

    fn text(chunk: Option<Chunk>) -> String {
        chunk.map(|c| c.text).unwrap_or_default()
    }

    async fn ready_trainer(service: &BattleService) {
        service.pick_starter(CHANNEL, ASH, "charmander").await.unwrap();
        service.travel(CHANNEL, 0).await.unwrap();
        service.start_wild_encounter(CHANNEL).await.unwrap();
        service.join(CHANNEL, ASH, None).await.unwrap();
    }

    #[tokio::test]
    async fn encounters_need_spawns_and_are_exclusive() {
        let service = service();

        let err = service.start_wild_encounter(CHANNEL).await.unwrap_err();
        assert!(matches!(err, BattleError::Validation(ValidationError::NoWildSpawns(_))));

        let arrival = text(service.travel(CHANNEL, 0).await.unwrap());
        assert!(arrival.starts_with("== ROUTE 1 =="));

        let opening = text(service.start_wild_encounter(CHANNEL).await.unwrap());
        assert!(opening.starts_with("A wild "));

        for err in [
            service.start_wild_encounter(CHANNEL).await.unwrap_err(),
            service.start_trainer_challenge(CHANNEL).await.unwrap_err(),
        ] {
            assert!(matches!(err, BattleError::StateConflict(StateConflict::SessionExists)));
        }
        let err = service.travel(CHANNEL, 0).await.unwrap_err();
        assert!(matches!(err, BattleError::StateConflict(StateConflict::BattleInProgress)));

        // Another channel is unaffected.
        assert!(service.start_trainer_challenge(ChannelId(2)).await.is_ok());
    }

    #[tokio::test]
    async fn narration_waits_for_advance() {
        let service = service();
        service.travel(CHANNEL, 0).await.unwrap();

        let opening = service.start_wild_encounter(CHANNEL).await.unwrap().unwrap();
        assert_eq!(service.active_delivery(CHANNEL).await, Some(opening));

        let prompt = service.advance(CHANNEL).await.unwrap();
        assert_eq!(prompt.text, "Use join to step in!");
        assert_eq!(service.advance(CHANNEL).await, None);
        assert_eq!(service.active_delivery(CHANNEL).await, Some(prompt));
    }

    #[tokio::test]
    async fn running_returns_the_squad_and_saves() {
        let store = Arc::new(MemoryRosterStore::new());
        let service = service_with(Arc::clone(&store));
        let mut events = service.subscribe_events();

        service.travel(CHANNEL, 0).await.unwrap();
        service.start_wild_encounter(CHANNEL).await.unwrap();
        let err = service.join(CHANNEL, ASH, None).await.unwrap_err();
        assert!(matches!(err, BattleError::Validation(ValidationError::NotStarted)));

        service.pick_starter(CHANNEL, ASH, "charmander").await.unwrap();
        service.join(CHANNEL, ASH, None).await.unwrap();
        assert!(service.trainer(ASH).await.unwrap().in_battle());

        service.submit_action(CHANNEL, ASH, PlayerAction::Run).await.unwrap();

        let trainer = service.trainer(ASH).await.unwrap();
        assert!(!trainer.in_battle());
        assert_eq!(trainer.squad_len(), 1);
        service.flush().await;
        assert_eq!(store.load(ASH).unwrap(), Some(trainer.to_record()));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], SessionEvent::Started { .. }));
        assert!(seen.contains(&SessionEvent::Joined {
            channel: CHANNEL,
            trainer: ASH,
        }));
        assert_eq!(
            seen.last(),
            Some(&SessionEvent::Ended {
                channel: CHANNEL,
                reason: EndReason::Flee,
                trainer: Some(ASH),
            })
        );

        // The channel is free again.
        assert!(service.start_wild_encounter(CHANNEL).await.is_ok());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn invariant_violation_tears_the_session_down() {
        let service = service();
        let mut events = service.subscribe_events();
        ready_trainer(&service).await;

        {
            let state = service.channel_state(CHANNEL);
            let mut state = state.lock().await;
            if let Some(session) = state.session.as_mut() {
                session.phase = SessionPhase::Resolving;
            }
        }

        let err = service
            .submit_action(CHANNEL, ASH, PlayerAction::Fight { move_index: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, BattleError::Invariant(_)));

        let trainer = service.trainer(ASH).await.unwrap();
        assert!(!trainer.in_battle());
        assert_eq!(trainer.squad_len(), 1);
        let mut aborted = false;
        while let Ok(event) = events.try_recv() {
            aborted |= matches!(event, SessionEvent::Aborted { channel: CHANNEL, .. });
        }
        assert!(aborted);
        assert!(service.start_wild_encounter(CHANNEL).await.is_ok());
    }

    #[tokio::test]
    async fn center_services_need_a_center() {
        let service = service();
        service.pick_starter(CHANNEL, ASH, "squirtle").await.unwrap();

        let healed = text(service.heal(CHANNEL, ASH).await.unwrap());
        assert_eq!(healed, "Your squad is fully healed!");

        service.travel(CHANNEL, 0).await.unwrap();
        for err in [
            service.heal(CHANNEL, ASH).await.unwrap_err(),
            service.deposit(CHANNEL, ASH, 0).await.unwrap_err(),
            service.show_storage(CHANNEL, ASH).await.unwrap_err(),
        ] {
            assert!(matches!(err, BattleError::Validation(ValidationError::NoHealingCenter)));
        }
        assert!(service.show_squad(CHANNEL, ASH).await.is_ok());
    }

    #[tokio::test]
    async fn roster_is_locked_during_battle() {
        let service = service();
        ready_trainer(&service).await;

        for err in [
            service.save(CHANNEL, ASH).await.unwrap_err(),
            service.swap(CHANNEL, ASH, 0, 0).await.unwrap_err(),
            service.reset(CHANNEL, ASH).await.unwrap_err(),
        ] {
            assert!(matches!(err, BattleError::StateConflict(StateConflict::BattleInProgress)));
        }
    }

    #[tokio::test]
    async fn saved_rosters_are_loaded_on_first_use() {
        let store = Arc::new(MemoryRosterStore::new());
        {
            let service = service_with(Arc::clone(&store));
            service.pick_starter(CHANNEL, ASH, "bulbasaur").await.unwrap();
            service.shutdown().await;
        }

        let service = service_with(Arc::clone(&store));
        service.register_trainer(ASH, "ASH").await.unwrap();
        let trainer = service.trainer(ASH).await.unwrap();
        assert!(trainer.is_started());
        assert_eq!(trainer.name(), "ASH");
        assert_eq!(trainer.squad()[0].as_ref().map(|c| c.name()), Some("BULBASAUR"));

        let err = service.pick_starter(CHANNEL, ASH, "pikachu").await.unwrap_err();
        assert!(matches!(err, BattleError::Validation(ValidationError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn reset_waits_for_confirmation_and_deletes_the_record() {
        let store = Arc::new(MemoryRosterStore::new());
        let service = service_with(Arc::clone(&store));
        service.pick_starter(CHANNEL, ASH, "bulbasaur").await.unwrap();
        service.flush().await;
        assert!(store.load(ASH).unwrap().is_some());

        let err = service.confirm_reset(CHANNEL, ASH).await.unwrap_err();
        assert!(matches!(err, BattleError::Validation(ValidationError::NothingToConfirm)));
        service.reset(CHANNEL, ASH).await.unwrap();
        assert!(service.trainer(ASH).await.unwrap().is_started());

        service.confirm_reset(CHANNEL, ASH).await.unwrap();
        service.flush().await;
        assert_eq!(store.load(ASH).unwrap(), None);
        assert!(!service.trainer(ASH).await.unwrap().is_started());
    }

    #[tokio::test]
    async fn dex_entries_and_stats_on_request() {
        let service = service();
        service.pick_starter(CHANNEL, ASH, "squirtle").await.unwrap();

        for query in ["7", "Squirtle"] {
            let entry = text(service.dex_entry(CHANNEL, ASH, query).await.unwrap());
            assert!(entry.starts_with("#007 SQUIRTLE (owned)"), "{}", entry);
        }
        let err = service.dex_entry(CHANNEL, ASH, "missingno").await.unwrap_err();
        assert!(matches!(
            err,
            BattleError::Validation(ValidationError::UnknownSpecies(ref q)) if q == "missingno"
        ));

        let stats = text(service.show_stats(CHANNEL, ASH, 0).await.unwrap());
        assert!(stats.starts_with("1. SQUIRTLE Lv.5"));
        let err = service.show_stats(CHANNEL, ASH, 3).await.unwrap_err();
        assert!(matches!(err, BattleError::Validation(ValidationError::InvalidSquadIndex(3))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_actions_resolve_one_turn_each() {
        let service = Arc::new(service());
        let mut events = service.subscribe_events();
        ready_trainer(&service).await;
        {
            let splash = Arc::clone(service.catalog().move_data(Move::Splash).unwrap());
            let state = service.channel_state(CHANNEL);
            let mut state = state.lock().await;
            let wild = state
                .session
                .as_mut()
                .and_then(|s| s.active_mut(Side::Opponent))
                .unwrap();
            wild.moves = [Some(MoveSlot::new(splash)), None, None, None];
        }

        let growl = |service: &Arc<BattleService>| {
            let service = Arc::clone(service);
            tokio::spawn(async move {
                service
                    .submit_action(CHANNEL, ASH, PlayerAction::Fight { move_index: 1 })
                    .await
            })
        };
        let (first, second) = tokio::join!(growl(&service), growl(&service));
        assert!(first.unwrap().is_ok());
        assert!(second.unwrap().is_ok());

        {
            let state = service.channel_state(CHANNEL);
            let state = state.lock().await;
            let session = state.session.as_ref().unwrap();
            assert_eq!(session.turn_number(), 3);
            let slot = session
                .active(Side::Player)
                .and_then(|c| c.moves[1].as_ref())
                .unwrap();
            assert_eq!(slot.pp, slot.max_pp() - 2);
        }

        let mut turns = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::TurnResolved { turn, .. } = event {
                turns.push(turn);
            }
        }
        turns.sort();
        assert_eq!(turns, vec![2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_trainer_joins_only_one_battle_at_a_time() {
        let service = Arc::new(service());
        let other = ChannelId(2);
        service.pick_starter(CHANNEL, ASH, "charmander").await.unwrap();
        for channel in [CHANNEL, other] {
            service.travel(channel, 0).await.unwrap();
            service.start_wild_encounter(channel).await.unwrap();
        }

        let join = |channel: ChannelId| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.join(channel, ASH, None).await })
        };
        let (here, there) = tokio::join!(join(CHANNEL), join(other));
        let results = [here.unwrap(), there.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(BattleError::StateConflict(StateConflict::TrainerInBattle)))));
        assert!(service.trainer(ASH).await.unwrap().in_battle());
    }

    /// Holds one trainer's load until the test lets it through.
    struct GatedStore {
        inner: MemoryRosterStore,
        gated: TrainerId,
        entered: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl RosterStore for GatedStore {
        fn save(&self, trainer: TrainerId, record: &str) -> StoreResult<()> {
            self.inner.save(trainer, record)
        }

        fn load(&self, trainer: TrainerId) -> StoreResult<Option<String>> {
            if trainer == self.gated {
                if let Some(entered) = lock(&self.entered).take() {
                    let _ = entered.send(());
                }
                let _ = lock(&self.release).recv();
            }
            self.inner.load(trainer)
        }

        fn delete(&self, trainer: TrainerId) -> StoreResult<()> {
            self.inner.delete(trainer)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_slow_roster_load_does_not_stall_other_trainers() {
        let slowpoke = TrainerId(9);
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryRosterStore::new(),
            gated: slowpoke,
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let config = EngineConfig {
            seed: Some(7),
            ..EngineConfig::default()
        };
        let service = Arc::new(BattleService::new(test_catalog(), config, store));
        service.pick_starter(CHANNEL, ASH, "pikachu").await.unwrap();

        let slow = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.show_squad(ChannelId(2), slowpoke).await }
        });
        entered_rx.await.unwrap();

        let squad = tokio::time::timeout(Duration::from_secs(5), service.show_squad(CHANNEL, ASH))
            .await
            .expect("roster access waited on another trainer's load")
            .unwrap();
        assert!(text(squad).contains("PIKACHU"));
        assert!(!slow.is_finished());

        release_tx.send(()).unwrap();
        let fresh = slow.await.unwrap().unwrap();
        assert_eq!(text(fresh), "TRAINER9's squad:");
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<String>>>);

    impl NarrationSink for Collect {
        fn deliver(&self, _channel: ChannelId, chunk: &Chunk) {
            lock(&self.0).push(chunk.text.clone());
        }
    }

    #[tokio::test]
    async fn advance_subscription_releases_queued_chunks() {
        let service = Arc::new(service());
        service.travel(CHANNEL, 0).await.unwrap();
        service.start_wild_encounter(CHANNEL).await.unwrap();

        let sink = Collect::default();
        let subscription = service.subscribe_advance(CHANNEL, sink.clone());
        assert!(subscription.signal());
        assert!(subscription.signal());
        subscription.close().await;

        assert_eq!(*lock(&sink.0), vec!["Use join to step in!".to_string()]);
    }
}
