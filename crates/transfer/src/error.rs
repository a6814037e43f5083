use shareit_protocol::FramingError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("checksum mismatch for {file_id}")]
    ChecksumMismatch { file_id: String },

    #[error("unknown file id: {0}")]
    UnknownFileId(String),

    #[error("duplicate file id: {0}")]
    DuplicateFileId(String),

    #[error("file {0} is not in the expected role")]
    WrongRole(String),

    #[error("chunk index {index} out of range for {file_id} ({total} chunks)")]
    InvalidChunkIndex {
        file_id: String,
        index: u32,
        total: u32,
    },

    #[error("reassembly of {file_id} attempted with {received}/{total} chunks")]
    Incomplete {
        file_id: String,
        received: u32,
        total: u32,
    },

    #[error("session closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Errors from sending over a direct or relay transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not ready")]
    NotReady,

    #[error("transport closed")]
    Closed,

    #[error("outbound queue full")]
    Backpressure,

    #[error("encode error: {0}")]
    Encode(String),
}

impl From<FramingError> for TransportError {
    fn from(err: FramingError) -> Self {
        TransportError::Encode(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Encode(err.to_string())
    }
}
