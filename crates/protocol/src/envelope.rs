//! Events exchanged with the signaling service.
//!
//! Every WebSocket text frame carries one event in the envelope
//! `{"event": "<name>", "data": <payload>}`. The service scopes events to a
//! session room and forwards them to the other members; `from` fields carry
//! the originating connection id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::relay::RelayPayload;

/// Receiver progress for one file, as reported in `resume-state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeEntry {
    /// Number of distinct chunks received.
    pub received: u32,
    /// Highest chunk index seen, `-1` when nothing arrived yet.
    pub last_index: i64,
}

impl ResumeEntry {
    /// Chunk index the sender should restart from.
    pub fn resume_from(&self) -> u32 {
        self.last_index.saturating_add(1).clamp(0, i64::from(u32::MAX)) as u32
    }
}

/// Progress snapshot keyed by file id.
pub type ResumeState = BTreeMap<String, ResumeEntry>;

/// Events a peer emits to the signaling service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Joins the room named by the session id.
    Join(String),
    #[serde(rename_all = "camelCase")]
    Signal {
        session_id: String,
        signal: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    RelayChunk {
        session_id: String,
        payload: RelayPayload,
    },
    #[serde(rename_all = "camelCase")]
    ResumeRequest { session_id: String },
    #[serde(rename_all = "camelCase")]
    ResumeState {
        session_id: String,
        state: ResumeState,
    },
}

/// Events the signaling service delivers to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    PeerJoined { socket_id: String },
    /// Opaque negotiation payload for the peer-connection service.
    Signal {
        from: String,
        signal: serde_json::Value,
    },
    RelayChunk(RelayPayload),
    ResumeRequest {
        #[serde(default)]
        from: Option<String>,
    },
    ResumeState(ResumeState),
}
