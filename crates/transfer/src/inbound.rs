use shareit_protocol::{
    Ack, ChunkHeader, ControlMessage, FileMeta, Frame, RelayPayload, decode_frame,
};

use crate::TransferError;
use crate::transport::PeerMessage;

/// Chunk bytes with their position, however they arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub file_id: String,
    pub chunk_index: u32,
    pub data: Vec<u8>,
}

/// Every message a peer can receive, decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    FileMeta(FileMeta),
    Ack(Ack),
    RequestResume,
    /// Binary frame from the direct channel. Acknowledged.
    ChunkFrame(ChunkData),
    /// Chunk from the relay. Never acknowledged.
    RelayedChunk(ChunkData),
    /// Ack that came back over the relay.
    RelayedAck(Ack),
}

impl Inbound {
    /// Decodes a direct-channel message: text is a control message, binary
    /// is a chunk frame.
    pub fn from_peer(msg: PeerMessage) -> Result<Self, TransferError> {
        match msg {
            PeerMessage::Text(text) => {
                let control: ControlMessage = serde_json::from_str(&text)?;
                Ok(match control {
                    ControlMessage::FileMeta(meta) => Inbound::FileMeta(meta),
                    ControlMessage::Ack(ack) => Inbound::Ack(ack),
                    ControlMessage::RequestResume => Inbound::RequestResume,
                })
            }
            PeerMessage::Binary(bytes) => {
                let Frame { header, payload } = decode_frame::<ChunkHeader>(&bytes)?;
                Ok(Inbound::ChunkFrame(ChunkData {
                    file_id: header.file_id,
                    chunk_index: header.chunk_index,
                    data: payload,
                }))
            }
        }
    }

    /// Decodes a `relay-chunk` payload.
    pub fn from_relay(payload: RelayPayload) -> Result<Self, TransferError> {
        match payload {
            RelayPayload::Control { control } => {
                let control: ControlMessage = serde_json::from_str(&control)?;
                Ok(match control {
                    ControlMessage::FileMeta(meta) => Inbound::FileMeta(meta),
                    ControlMessage::Ack(ack) => Inbound::RelayedAck(ack),
                    ControlMessage::RequestResume => Inbound::RequestResume,
                })
            }
            RelayPayload::Chunk(chunk) => Ok(Inbound::RelayedChunk(ChunkData {
                file_id: chunk.file_id,
                chunk_index: chunk.chunk_index,
                data: chunk.data,
            })),
        }
    }
}
