//! In-memory stand-ins for the peer channel and the signaling service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use shareit_protocol::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

use crate::TransportError;
use crate::transport::{PeerChannel, PeerMessage, SignalingChannel};

/// Peer channel whose outbound messages land in an unbounded queue.
pub(crate) struct MemoryPeer {
    open: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<PeerMessage>,
}

impl MemoryPeer {
    pub(crate) fn new(open: bool) -> (Self, mpsc::UnboundedReceiver<PeerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Self {
            open: Arc::new(AtomicBool::new(open)),
            tx,
        };
        (peer, rx)
    }

    pub(crate) fn open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }
}

impl PeerChannel for MemoryPeer {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn send(&self, msg: PeerMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }
}

/// Signaling channel that records every emitted event.
pub(crate) struct MemorySignaling {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl MemorySignaling {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SignalingChannel for MemorySignaling {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::Closed)
    }
}

/// What the signaling service delivers to the other room member when `from`
/// emits `event`. `None` for events the service does not forward.
pub(crate) fn forward(event: ClientEvent, from: &str) -> Option<ServerEvent> {
    match event {
        ClientEvent::Join(_) => Some(ServerEvent::PeerJoined {
            socket_id: from.to_string(),
        }),
        ClientEvent::Signal { signal, .. } => Some(ServerEvent::Signal {
            from: from.to_string(),
            signal,
        }),
        ClientEvent::RelayChunk { payload, .. } => Some(ServerEvent::RelayChunk(payload)),
        ClientEvent::ResumeRequest { .. } => Some(ServerEvent::ResumeRequest {
            from: Some(from.to_string()),
        }),
        ClientEvent::ResumeState { state, .. } => Some(ServerEvent::ResumeState(state)),
    }
}
