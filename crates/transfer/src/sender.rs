use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use shareit_protocol::constants::total_chunks;
use shareit_protocol::{CHUNK_SIZE, FileMeta};
use tokio_util::sync::CancellationToken;

use crate::pending::PendingAcks;

/// Sender-side lifecycle of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    Idle,
    Hashing,
    Announced,
    Sending,
    Completed,
}

/// Byte range of chunk `index` in a file of `size` bytes.
///
/// Every chunk is `chunk_size` long except the last, which holds the
/// remainder. Indices past the end yield an empty range.
pub fn chunk_range(index: u32, size: u64, chunk_size: usize) -> Range<usize> {
    let start = (u64::from(index) * chunk_size as u64).min(size);
    let end = (start + chunk_size as u64).min(size);
    start as usize..end as usize
}

/// State shared between the registry and the running flow-control loop.
#[derive(Debug)]
pub(crate) struct SenderShared {
    pub(crate) file_id: String,
    pub(crate) name: String,
    data: Arc<[u8]>,
    total_chunks: u32,
    checksum: OnceLock<String>,
    phase: Mutex<SenderPhase>,
    ack_count: AtomicU32,
    pub(crate) pending: PendingAcks,
    loop_cancel: Mutex<Option<CancellationToken>>,
    updated_at: Mutex<Instant>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SenderShared {
    pub(crate) fn new(file_id: String, name: String, data: Vec<u8>) -> Self {
        let total_chunks = total_chunks(data.len() as u64, CHUNK_SIZE);
        Self {
            file_id,
            name,
            data: data.into(),
            total_chunks,
            checksum: OnceLock::new(),
            phase: Mutex::new(SenderPhase::Idle),
            ack_count: AtomicU32::new(0),
            pending: PendingAcks::new(),
            loop_cancel: Mutex::new(None),
            updated_at: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub(crate) fn data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Bytes of chunk `index`.
    pub(crate) fn chunk(&self, index: u32) -> &[u8] {
        &self.data[chunk_range(index, self.size(), CHUNK_SIZE)]
    }

    /// Records the whole-file digest. It is computed once and never replaced.
    pub(crate) fn set_checksum(&self, checksum: String) {
        let _ = self.checksum.set(checksum);
    }

    /// Announcement for this file, available once hashing finished.
    pub(crate) fn meta(&self) -> Option<FileMeta> {
        self.checksum.get().map(|checksum| FileMeta {
            file_id: self.file_id.clone(),
            name: self.name.clone(),
            size: self.size(),
            total_chunks: self.total_chunks,
            checksum: checksum.clone(),
        })
    }

    pub(crate) fn phase(&self) -> SenderPhase {
        *lock(&self.phase)
    }

    pub(crate) fn set_phase(&self, phase: SenderPhase) {
        *lock(&self.phase) = phase;
        self.touch();
    }

    pub(crate) fn ack_count(&self) -> u32 {
        self.ack_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_ack_count(&self, count: u32) {
        self.ack_count.store(count, Ordering::Relaxed);
    }

    /// Counts one more chunk for the loop holding `token` and returns the
    /// new total, or `None` once that loop was replaced or stopped.
    pub(crate) fn record_chunk(&self, token: &CancellationToken) -> Option<u32> {
        let _current = lock(&self.loop_cancel);
        if token.is_cancelled() {
            return None;
        }
        self.touch();
        Some(self.ack_count.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Starts a new loop generation at chunk `start`.
    ///
    /// The previous loop is cancelled and the count reset in one critical
    /// section, so a loop on its way out cannot count into the new run.
    pub(crate) fn restart_loop(&self, start: u32) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = lock(&self.loop_cancel);
        if let Some(old) = current.replace(token.clone()) {
            old.cancel();
        }
        self.ack_count
            .store(start.min(self.total_chunks), Ordering::Relaxed);
        token
    }

    /// Stops the running loop, if any, and drops its pending acks.
    pub(crate) fn stop(&self) {
        {
            let mut current = lock(&self.loop_cancel);
            if let Some(token) = current.take() {
                token.cancel();
            }
        }
        self.pending.cancel_all();
    }

    pub(crate) fn updated_at(&self) -> Instant {
        *lock(&self.updated_at)
    }

    fn touch(&self) {
        *lock(&self.updated_at) = Instant::now();
    }
}
