//! Per-chunk table of outstanding acknowledgements.
//!
//! The sender registers an entry before putting a chunk on the wire and
//! waits on it; an inbound `ack` resolves the entry. Every exit path
//! (ack, timeout, cancellation) removes the entry, so nothing dangles
//! after the wait returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// How a wait for an acknowledgement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    TimedOut,
    /// The entry was cancelled or the loop was told to stop.
    Cancelled,
}

/// Handle returned by [`PendingAcks::register`].
#[derive(Debug)]
pub struct AckWaiter {
    index: u32,
    generation: u64,
    rx: oneshot::Receiver<()>,
}

/// Outstanding acknowledgements keyed by chunk index.
#[derive(Debug, Default)]
pub struct PendingAcks {
    entries: Mutex<HashMap<u32, (u64, oneshot::Sender<()>)>>,
    next_generation: AtomicU64,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u32, (u64, oneshot::Sender<()>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers interest in the ack for `index`.
    ///
    /// A previous registration for the same index is replaced; its waiter
    /// observes [`AckOutcome::Cancelled`].
    pub fn register(&self, index: u32) -> AckWaiter {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries().insert(index, (generation, tx));
        AckWaiter {
            index,
            generation,
            rx,
        }
    }

    /// Resolves the entry for `index`. Returns `false` if nobody was waiting.
    pub fn resolve(&self, index: u32) -> bool {
        match self.entries().remove(&index) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Drops the entry for `index`, waking its waiter with `Cancelled`.
    pub fn cancel(&self, index: u32) -> bool {
        self.entries().remove(&index).is_some()
    }

    /// Drops every entry. Returns how many were outstanding.
    pub fn cancel_all(&self) -> usize {
        let mut entries = self.entries();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until the ack arrives, `timeout` elapses, or `cancel` fires.
    pub async fn wait(
        &self,
        waiter: AckWaiter,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AckOutcome {
        let AckWaiter {
            index,
            generation,
            rx,
        } = waiter;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => AckOutcome::Cancelled,
            result = tokio::time::timeout(timeout, rx) => match result {
                Ok(Ok(())) => AckOutcome::Acked,
                Ok(Err(_)) => AckOutcome::Cancelled,
                Err(_) => AckOutcome::TimedOut,
            },
        };

        // Clean up our own entry on any exit path; a newer registration
        // for the same index is left alone.
        let mut entries = self.entries();
        if entries.get(&index).is_some_and(|(g, _)| *g == generation) {
            entries.remove(&index);
        }
        outcome
    }
}
