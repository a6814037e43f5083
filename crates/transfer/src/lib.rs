//! Chunked file transfer with acknowledgement, relay fallback and resume support.
//!
//! A [`Session`] owns every transfer of one rendezvous session. Outbound
//! chunks go over the direct peer channel when it is open and over the
//! signaling relay otherwise; inbound traffic from either path is decoded
//! once into [`Inbound`] and dispatched by file id.

mod error;
mod flow;
mod inbound;
mod integrity;
mod pending;
mod progress;
mod receiver;
mod sender;
mod session;
mod transport;
mod validation;

#[cfg(test)]
mod testing;

use std::time::Duration;

pub use error::{TransferError, TransportError};
pub use inbound::{ChunkData, Inbound};
pub use integrity::{Verification, checksum_bytes, verify_checksum};
pub use pending::{AckOutcome, AckWaiter, PendingAcks};
pub use progress::{SpeedCalculator, TransferProgress, format_rate};
pub use receiver::{ChunkOutcome, ReceiveTransfer, ReceiverState};
pub use sender::{SenderPhase, chunk_range};
pub use session::{Role, Session, SessionEvent};
pub use transport::{
    DirectTransport, PeerChannel, PeerEvent, PeerMessage, RelayTransport, Reliability,
    SignalingChannel, Transport, TransportKind, TransportSet,
};
pub use validation::{MAX_FILE_NAME_LEN, sanitize_file_name};

pub use shareit_protocol::constants::{ACK_TIMEOUT, CHUNK_SIZE, RELAY_PACING};

/// Default time after which an inactive transfer is swept from the session.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Tunables for the flow-control loop and the session registry.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// How long to wait for a chunk acknowledgement on the direct channel.
    pub ack_timeout: Duration,
    /// Pause between chunks on the relay.
    pub relay_pacing: Duration,
    /// Re-sends of an unacknowledged chunk before moving on (0 = never).
    pub retransmit_limit: u32,
    /// Inactivity window after which [`Session::sweep_idle`] drops a transfer.
    pub idle_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ack_timeout: ACK_TIMEOUT,
            relay_pacing: RELAY_PACING,
            retransmit_limit: 0,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
