use serde::{Deserialize, Serialize};

use crate::constants::{CHUNK_SIZE, total_chunks};

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

/// Announces a file before any of its chunks are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub total_chunks: u32,
    /// Lowercase hex SHA-256 of the whole file.
    pub checksum: String,
}

impl FileMeta {
    /// Builds an announcement, deriving `total_chunks` from `size`.
    pub fn new(
        file_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            name: name.into(),
            size,
            total_chunks: total_chunks(size, CHUNK_SIZE),
            checksum: checksum.into(),
        }
    }
}

/// Confirms receipt of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub file_id: String,
    pub chunk_index: u32,
}

/// JSON control message exchanged between peers.
///
/// Sent as a text message on the direct channel, or wrapped in
/// [`RelayPayload::Control`](crate::relay::RelayPayload::Control) on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    FileMeta(FileMeta),
    Ack(Ack),
    RequestResume,
}

// ---------------------------------------------------------------------------
// Chunk header
// ---------------------------------------------------------------------------

/// Discriminator carried in every binary frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    #[serde(rename = "file-chunk")]
    FileChunk,
}

/// Header of a binary chunk frame on the direct channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHeader {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub file_id: String,
    pub chunk_index: u32,
}

impl ChunkHeader {
    pub fn new(file_id: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            kind: FrameKind::FileChunk,
            file_id: file_id.into(),
            chunk_index,
        }
    }
}
