//! Message Sequencer: per-channel narration queue released one chunk at a
//! time by an explicit advance signal.
//!
//! The sequencer itself is plain data. Callers own the mutual exclusion; the
//! service keeps one sequencer per channel behind that channel's lock so an
//! enqueue and an advance never interleave.

use crate::ids::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Identifies one enqueued chunk. Ids increase monotonically per sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk-{}", self.0)
    }
}

/// A fully rendered piece of narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MessageSequencer {
    queue: VecDeque<Chunk>,
    next_id: u64,
    delivered: Option<Chunk>,
}

impl MessageSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append chunks in order. Blank chunks are dropped. Returns how many
    /// were queued.
    pub fn enqueue<I, S>(&mut self, chunks: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.queue.len();
        for text in chunks {
            let text = text.into();
            if text.trim().is_empty() {
                continue;
            }
            let id = ChunkId(self.next_id);
            self.next_id += 1;
            self.queue.push_back(Chunk { id, text });
        }
        self.queue.len() - before
    }

    /// Deliver the next pending chunk. `None` (and no state change) when the
    /// queue is empty, so repeated signals for content already shown are harmless.
    pub fn advance(&mut self) -> Option<Chunk> {
        let chunk = self.queue.pop_front()?;
        self.delivered = Some(chunk.clone());
        Some(chunk)
    }

    /// The most recently delivered chunk, if any.
    pub fn peek_active_delivery(&self) -> Option<&Chunk> {
        self.delivered.as_ref()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drop everything not yet delivered.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Receives chunks released by an [`AdvanceSubscription`].
pub trait NarrationSink: Send + Sync + 'static {
    fn deliver(&self, channel: ChannelId, chunk: &Chunk);
}

/// A cancellable listener that turns advance signals into deliveries.
///
/// The transport forwards every "advance" gesture through [`signal`](Self::signal);
/// where the gesture came from (a reaction, a button, a typed command) does not
/// matter here. Dropping the subscription cancels it.
pub struct AdvanceSubscription {
    channel: ChannelId,
    signals: Option<mpsc::UnboundedSender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AdvanceSubscription {
    /// Spawn the listener task. `advance` releases the next chunk for
    /// `channel`; every released chunk goes to `sink`.
    pub fn spawn<F, Fut, S>(channel: ChannelId, advance: F, sink: S) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Option<Chunk>> + Send,
        S: NarrationSink,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match advance().await {
                    Some(chunk) => {
                        debug!(%channel, chunk = %chunk.id, "advance delivered");
                        sink.deliver(channel, &chunk);
                    }
                    None => debug!(%channel, "advance with nothing pending"),
                }
            }
            debug!(%channel, "advance subscription closed");
        });
        Self {
            channel,
            signals: Some(tx),
            task: Some(task),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Forward one advance signal. Returns false once the subscription is gone.
    pub fn signal(&self) -> bool {
        match &self.signals {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Stop accepting signals and wait until every signal already sent has
    /// been handled.
    pub async fn close(mut self) {
        self.signals.take();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(channel = %self.channel, %err, "advance task ended abnormally");
            }
        }
    }

    /// Stop immediately. Pending signals are discarded.
    pub fn cancel(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        self.signals.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for AdvanceSubscription {
    fn drop(&mut self) {
        self.abort();
    }
}
