//! Payloads carried by the signaling service's `relay-chunk` event.
//!
//! The relay is message-oriented, so there is no binary framing: a chunk
//! travels as JSON with its bytes base64-encoded, and a control message
//! travels as a JSON string nested inside a JSON object.

use serde::{Deserialize, Serialize};

use crate::messages::ControlMessage;

/// A file chunk sent over the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayChunk {
    pub file_id: String,
    pub chunk_index: u32,
    #[serde(rename = "chunkBase64", with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Body of a `relay-chunk` event: either a wrapped control message or a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayPayload {
    Control {
        /// A serialized [`ControlMessage`].
        control: String,
    },
    Chunk(RelayChunk),
}

impl RelayPayload {
    /// Wraps a control message for the relay.
    pub fn control(msg: &ControlMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::Control {
            control: serde_json::to_string(msg)?,
        })
    }

    /// Wraps chunk bytes for the relay.
    pub fn chunk(file_id: impl Into<String>, chunk_index: u32, data: &[u8]) -> Self {
        Self::Chunk(RelayChunk {
            file_id: file_id.into(),
            chunk_index,
            data: data.to_vec(),
        })
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
