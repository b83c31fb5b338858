//! Roster persistence.
//!
//! Stores hold one textual roster record per trainer. Battle outcomes never
//! wait on a store: the service hands records to a [`PersistenceWorker`]
//! through a [`PersistenceHandle`] and moves on. A failed write is logged and
//! does not undo anything already applied in memory.

use crate::errors::StoreError;
use crate::ids::TrainerId;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type StoreResult<T> = Result<T, StoreError>;

/// Where roster records live.
pub trait RosterStore: Send + Sync {
    fn save(&self, trainer: TrainerId, record: &str) -> StoreResult<()>;

    /// `None` when the trainer has never been saved.
    fn load(&self, trainer: TrainerId) -> StoreResult<Option<String>>;

    fn delete(&self, trainer: TrainerId) -> StoreResult<()>;
}

/// One `<id>.txt` file per trainer under a directory.
#[derive(Debug, Clone)]
pub struct FileRosterStore {
    dir: PathBuf,
}

impl FileRosterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, trainer: TrainerId) -> PathBuf {
        self.dir.join(format!("{}.txt", trainer))
    }
}

impl RosterStore for FileRosterStore {
    fn save(&self, trainer: TrainerId, record: &str) -> StoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(trainer);
        // Write beside the target, then rename, so a crash never leaves half a record.
        let staging = path.with_extension("txt.tmp");
        fs::write(&staging, record)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn load(&self, trainer: TrainerId) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.path_for(trainer)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, trainer: TrainerId) -> StoreResult<()> {
        match fs::remove_file(self.path_for(trainer)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Keeps records in memory. Used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryRosterStore {
    records: Mutex<HashMap<TrainerId, String>>,
}

impl MemoryRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<TrainerId, String>> {
        // A poisoned map is still a valid map.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RosterStore for MemoryRosterStore {
    fn save(&self, trainer: TrainerId, record: &str) -> StoreResult<()> {
        self.records().insert(trainer, record.to_string());
        Ok(())
    }

    fn load(&self, trainer: TrainerId) -> StoreResult<Option<String>> {
        Ok(self.records().get(&trainer).cloned())
    }

    fn delete(&self, trainer: TrainerId) -> StoreResult<()> {
        self.records().remove(&trainer);
        Ok(())
    }
}

/// Commands accepted by the persistence worker.
pub enum Command {
    Save { trainer: TrainerId, record: String },
    Delete { trainer: TrainerId },
    /// Replies once every earlier command has been handled.
    Flush { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Background task that applies roster writes in submission order.
pub struct PersistenceWorker {
    store: Arc<dyn RosterStore>,
    command_rx: mpsc::UnboundedReceiver<Command>,
}

impl PersistenceWorker {
    pub fn new(store: Arc<dyn RosterStore>, command_rx: mpsc::UnboundedReceiver<Command>) -> Self {
        Self { store, command_rx }
    }

    /// Spawn a worker on the current runtime.
    pub fn spawn(store: Arc<dyn RosterStore>) -> (PersistenceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = PersistenceWorker::new(store, rx);
        (PersistenceHandle { tx }, tokio::spawn(worker.run()))
    }

    /// Main worker loop
    pub async fn run(mut self) {
        info!("PersistenceWorker started");
        while let Some(command) = self.command_rx.recv().await {
            match command {
                Command::Save { trainer, record } => match self.store.save(trainer, &record) {
                    Ok(()) => debug!(%trainer, "roster saved"),
                    Err(e) => error!(%trainer, "Failed to save roster: {}", e),
                },
                Command::Delete { trainer } => match self.store.delete(trainer) {
                    Ok(()) => debug!(%trainer, "roster deleted"),
                    Err(e) => error!(%trainer, "Failed to delete roster: {}", e),
                },
                Command::Flush { reply } => {
                    let _ = reply.send(());
                }
                Command::Shutdown => {
                    info!("Shutdown command received");
                    break;
                }
            }
        }
        info!("PersistenceWorker stopped");
    }
}

/// Cheap, cloneable sender side of the persistence worker.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PersistenceHandle {
    /// Queue a save. Never blocks; a stopped worker is logged and ignored.
    pub fn save(&self, trainer: TrainerId, record: String) {
        self.send(Command::Save { trainer, record });
    }

    pub fn delete(&self, trainer: TrainerId) {
        self.send(Command::Delete { trainer });
    }

    /// Wait until everything queued so far has reached the store.
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        self.send(Command::Flush { reply });
        let _ = done.await;
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("persistence worker is gone; roster write dropped");
        }
    }
}
