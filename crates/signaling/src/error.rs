use shareit_transfer::TransportError;
use tokio_tungstenite::tungstenite;

/// Errors from the signaling client.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

impl From<SignalingError> for TransportError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::Closed => TransportError::Closed,
            other => TransportError::Encode(other.to_string()),
        }
    }
}
