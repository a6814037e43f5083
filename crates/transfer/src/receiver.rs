use std::collections::BTreeMap;
use std::time::Instant;

use shareit_protocol::{FileMeta, ResumeEntry};

use crate::TransferError;
use crate::integrity::{Verification, verify_checksum};

/// Receiver-side lifecycle of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Announcement seen, chunks arriving.
    Receiving,
    /// Every chunk arrived; reassembly and hashing in progress.
    Verifying,
    Verified,
    ChecksumMismatch,
}

/// What happened to a delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// New chunk stored; more are expected.
    Stored,
    /// A chunk already held at this index; nothing changed.
    Duplicate,
    /// New chunk stored and it was the last missing one.
    Complete,
    /// The transfer is past the receiving stage; the chunk was dropped.
    Ignored,
}

/// Receiver half of a transfer: buffers chunks by index until all arrived.
#[derive(Debug)]
pub struct ReceiveTransfer {
    meta: FileMeta,
    state: ReceiverState,
    chunks: BTreeMap<u32, Vec<u8>>,
    /// Distinct indices stored so far. Survives [`take_chunks`](Self::take_chunks).
    chunks_received: u32,
    last_received_index: i64,
    updated_at: Instant,
}

impl ReceiveTransfer {
    /// Creates a receiver from an announcement.
    pub fn new(meta: FileMeta) -> Self {
        Self {
            meta,
            state: ReceiverState::Receiving,
            chunks: BTreeMap::new(),
            chunks_received: 0,
            last_received_index: -1,
            updated_at: Instant::now(),
        }
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn chunks_received(&self) -> u32 {
        self.chunks_received
    }

    pub fn last_received_index(&self) -> i64 {
        self.last_received_index
    }

    pub fn updated_at(&self) -> Instant {
        self.updated_at
    }

    /// Returns `true` once every announced chunk has a buffer.
    ///
    /// An empty file is complete from the moment it is announced.
    pub fn is_complete(&self) -> bool {
        self.chunks_received == self.meta.total_chunks
    }

    /// Stores a chunk. A slot, once filled, is never overwritten.
    pub fn accept_chunk(&mut self, index: u32, data: Vec<u8>) -> Result<ChunkOutcome, TransferError> {
        if self.state != ReceiverState::Receiving {
            return Ok(ChunkOutcome::Ignored);
        }
        if index >= self.meta.total_chunks {
            return Err(TransferError::InvalidChunkIndex {
                file_id: self.meta.file_id.clone(),
                index,
                total: self.meta.total_chunks,
            });
        }

        self.updated_at = Instant::now();
        self.last_received_index = self.last_received_index.max(i64::from(index));

        if self.chunks.contains_key(&index) {
            return Ok(ChunkOutcome::Duplicate);
        }
        self.chunks.insert(index, data);
        self.chunks_received += 1;

        if self.is_complete() {
            self.state = ReceiverState::Verifying;
            Ok(ChunkOutcome::Complete)
        } else {
            Ok(ChunkOutcome::Stored)
        }
    }

    /// Moves the buffered chunks out for reassembly off the registry lock.
    ///
    /// Only valid in [`ReceiverState::Verifying`]; counters are kept so the
    /// transfer still reports its progress afterwards.
    pub fn take_chunks(&mut self) -> Result<BTreeMap<u32, Vec<u8>>, TransferError> {
        if self.state != ReceiverState::Verifying {
            return Err(self.incomplete());
        }
        Ok(std::mem::take(&mut self.chunks))
    }

    /// Concatenates the buffered chunks in index order.
    ///
    /// Fails unless every slot `0..total_chunks` is populated.
    #[cfg(test)]
    pub(crate) fn reassemble(&self) -> Result<Vec<u8>, TransferError> {
        if !self.is_complete() {
            return Err(self.incomplete());
        }
        concat_chunks(&self.meta, &self.chunks)
    }

    /// Marks the transfer verified or mismatched.
    pub fn finish(&mut self, verification: &Verification) {
        self.state = if verification.is_verified() {
            ReceiverState::Verified
        } else {
            ReceiverState::ChecksumMismatch
        };
        self.updated_at = Instant::now();
    }

    /// Moves straight to verification when the announcement carries no chunks.
    pub(crate) fn mark_verifying_if_empty(&mut self) -> bool {
        if self.meta.total_chunks == 0 && self.state == ReceiverState::Receiving {
            self.state = ReceiverState::Verifying;
            return true;
        }
        false
    }

    /// Progress entry for a `resume-state` reply.
    pub fn resume_entry(&self) -> ResumeEntry {
        ResumeEntry {
            received: self.chunks_received,
            last_index: self.last_received_index,
        }
    }

    fn incomplete(&self) -> TransferError {
        TransferError::Incomplete {
            file_id: self.meta.file_id.clone(),
            received: self.chunks_received,
            total: self.meta.total_chunks,
        }
    }
}

/// Joins chunk buffers into the original byte sequence.
pub(crate) fn concat_chunks(
    meta: &FileMeta,
    chunks: &BTreeMap<u32, Vec<u8>>,
) -> Result<Vec<u8>, TransferError> {
    let missing = (0..meta.total_chunks).any(|i| !chunks.contains_key(&i));
    if missing {
        return Err(TransferError::Incomplete {
            file_id: meta.file_id.clone(),
            received: chunks.len() as u32,
            total: meta.total_chunks,
        });
    }

    let total_len: usize = chunks.values().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total_len);
    for chunk in chunks.values() {
        merged.extend_from_slice(chunk);
    }
    Ok(merged)
}

/// Reassembles and verifies in one step.
pub(crate) fn reassemble_and_verify(
    meta: &FileMeta,
    chunks: &BTreeMap<u32, Vec<u8>>,
) -> Result<(Vec<u8>, Verification), TransferError> {
    let data = concat_chunks(meta, chunks)?;
    let verification = verify_checksum(&data, &meta.checksum);
    Ok((data, verification))
}
