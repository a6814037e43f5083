//! Uniform send surface over the direct peer channel and the signaling relay.
//!
//! Both external collaborators are reduced to the smallest interface the
//! protocol needs: [`PeerChannel`] for the peer-to-peer byte channel and
//! [`SignalingChannel`] for the room-scoped relay. The [`TransportSet`]
//! picks between them for every outbound operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use shareit_protocol::{ChunkHeader, ClientEvent, ControlMessage, RelayPayload, encode_frame};

use crate::TransportError;

/// A message on the direct channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Events raised by the peer-connection service for the direct channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Open,
    Closed,
    Message(PeerMessage),
}

/// Direct bidirectional channel provided by the peer-connection service.
pub trait PeerChannel: Send + Sync {
    fn is_open(&self) -> bool;
    fn send(&self, msg: PeerMessage) -> Result<(), TransportError>;
}

/// Outbound half of the signaling service connection.
pub trait SignalingChannel: Send + Sync {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Direct,
    Relay,
}

/// Delivery guarantee a transport offers to the flow-control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    /// Ordered; the receiver acknowledges every chunk.
    Acknowledged,
    /// No acknowledgement, no ordering; the sender paces itself.
    BestEffort,
}

/// Capability set shared by the direct and relay paths.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;
    fn is_ready(&self) -> bool;
    fn reliability(&self) -> Reliability;
    fn send_control(&self, msg: &ControlMessage) -> Result<(), TransportError>;
    fn send_chunk(&self, header: &ChunkHeader, payload: &[u8]) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Direct
// ---------------------------------------------------------------------------

/// Sends control messages as JSON text and chunks as binary frames.
pub struct DirectTransport {
    channel: Arc<dyn PeerChannel>,
}

impl DirectTransport {
    pub fn new(channel: Arc<dyn PeerChannel>) -> Self {
        Self { channel }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.channel.is_open() {
            Ok(())
        } else {
            Err(TransportError::NotReady)
        }
    }
}

impl Transport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    fn is_ready(&self) -> bool {
        self.channel.is_open()
    }

    fn reliability(&self) -> Reliability {
        Reliability::Acknowledged
    }

    fn send_control(&self, msg: &ControlMessage) -> Result<(), TransportError> {
        self.ensure_open()?;
        let json = serde_json::to_string(msg)?;
        self.channel.send(PeerMessage::Text(json))
    }

    fn send_chunk(&self, header: &ChunkHeader, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let frame = encode_frame(header, payload)?;
        self.channel.send(PeerMessage::Binary(frame))
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Sends everything as `relay-chunk` broadcasts to the session room.
pub struct RelayTransport {
    session_id: String,
    signaling: Arc<dyn SignalingChannel>,
    joined: AtomicBool,
}

impl RelayTransport {
    pub fn new(session_id: impl Into<String>, signaling: Arc<dyn SignalingChannel>) -> Self {
        Self {
            session_id: session_id.into(),
            signaling,
            joined: AtomicBool::new(false),
        }
    }

    /// Joins the session room. The relay is ready from then on.
    pub fn join(&self) -> Result<(), TransportError> {
        self.signaling
            .emit(ClientEvent::Join(self.session_id.clone()))?;
        self.joined.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Emits a raw signaling event (resume requests, negotiation payloads).
    pub fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.signaling.emit(event)
    }

    fn relay(&self, payload: RelayPayload) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        self.signaling.emit(ClientEvent::RelayChunk {
            session_id: self.session_id.clone(),
            payload,
        })
    }
}

impl Transport for RelayTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Relay
    }

    fn is_ready(&self) -> bool {
        self.joined.load(Ordering::Relaxed)
    }

    fn reliability(&self) -> Reliability {
        Reliability::BestEffort
    }

    fn send_control(&self, msg: &ControlMessage) -> Result<(), TransportError> {
        self.relay(RelayPayload::control(msg)?)
    }

    fn send_chunk(&self, header: &ChunkHeader, payload: &[u8]) -> Result<(), TransportError> {
        self.relay(RelayPayload::chunk(
            header.file_id.clone(),
            header.chunk_index,
            payload,
        ))
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// The relay plus an optional direct channel, with the selection policy.
pub struct TransportSet {
    direct: RwLock<Option<Arc<DirectTransport>>>,
    relay: Arc<RelayTransport>,
}

impl TransportSet {
    pub fn new(relay: RelayTransport) -> Self {
        Self {
            direct: RwLock::new(None),
            relay: Arc::new(relay),
        }
    }

    pub fn relay(&self) -> &RelayTransport {
        &self.relay
    }

    pub fn attach_direct(&self, channel: Arc<dyn PeerChannel>) {
        let direct = Arc::new(DirectTransport::new(channel));
        *self.direct.write().unwrap_or_else(PoisonError::into_inner) = Some(direct);
    }

    pub fn detach_direct(&self) {
        *self.direct.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns `true` if a direct channel is attached and open.
    pub fn direct_ready(&self) -> bool {
        self.ready_direct().is_some()
    }

    fn ready_direct(&self) -> Option<Arc<DirectTransport>> {
        self.direct
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|d| d.is_ready())
            .cloned()
    }

    /// Picks the transport for one outbound operation: direct when it is
    /// ready, the relay otherwise. Never cached by callers.
    pub fn select(&self) -> Arc<dyn Transport> {
        match self.ready_direct() {
            Some(direct) => direct,
            None => Arc::clone(&self.relay) as Arc<dyn Transport>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryPeer, MemorySignaling};
    use shareit_protocol::{Ack, Frame, decode_frame};

    #[test]
    fn direct_sends_binary_frames() {
        let (peer, mut rx) = MemoryPeer::new(true);
        let direct = DirectTransport::new(Arc::new(peer));
        assert_eq!(direct.reliability(), Reliability::Acknowledged);

        direct
            .send_chunk(&ChunkHeader::new("f1", 4), b"payload")
            .unwrap();
        let PeerMessage::Binary(bytes) = rx.try_recv().unwrap() else {
            panic!("expected binary message");
        };
        let frame: Frame<ChunkHeader> = decode_frame(&bytes).unwrap();
        assert_eq!(frame.header, ChunkHeader::new("f1", 4));
        assert_eq!(frame.payload, b"payload");
    }

    #[test]
    fn direct_sends_control_as_text() {
        let (peer, mut rx) = MemoryPeer::new(true);
        let direct = DirectTransport::new(Arc::new(peer));
        direct.send_control(&ControlMessage::RequestResume).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            PeerMessage::Text(r#"{"type":"request-resume"}"#.into())
        );
    }

    #[test]
    fn closed_direct_refuses_to_send() {
        let (peer, _rx) = MemoryPeer::new(false);
        let direct = DirectTransport::new(Arc::new(peer));
        assert!(!direct.is_ready());
        let result = direct.send_control(&ControlMessage::RequestResume);
        assert!(matches!(result, Err(TransportError::NotReady)));
    }

    #[test]
    fn relay_requires_join() {
        let (signaling, mut rx) = MemorySignaling::new();
        let relay = RelayTransport::new("s1", Arc::new(signaling));
        assert!(!relay.is_ready());
        assert!(matches!(
            relay.send_chunk(&ChunkHeader::new("f", 0), b"x"),
            Err(TransportError::NotReady)
        ));

        relay.join().unwrap();
        assert!(relay.is_ready());
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::Join("s1".into()));
    }

    #[test]
    fn relay_wraps_chunks_and_control() {
        let (signaling, mut rx) = MemorySignaling::new();
        let relay = RelayTransport::new("s1", Arc::new(signaling));
        relay.join().unwrap();
        let _ = rx.try_recv();

        relay.send_chunk(&ChunkHeader::new("f", 2), b"abc").unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::RelayChunk {
                session_id: "s1".into(),
                payload: RelayPayload::chunk("f", 2, b"abc"),
            }
        );

        let ack = ControlMessage::Ack(Ack {
            file_id: "f".into(),
            chunk_index: 2,
        });
        relay.send_control(&ack).unwrap();
        let ClientEvent::RelayChunk { payload, .. } = rx.try_recv().unwrap() else {
            panic!("expected relay-chunk");
        };
        assert_eq!(payload, RelayPayload::control(&ack).unwrap());
    }

    #[test]
    fn selection_prefers_open_direct() {
        let (signaling, _srx) = MemorySignaling::new();
        let relay = RelayTransport::new("s1", Arc::new(signaling));
        relay.join().unwrap();
        let set = TransportSet::new(relay);
        assert_eq!(set.select().kind(), TransportKind::Relay);

        let (peer, _prx) = MemoryPeer::new(false);
        let open = peer.open_flag();
        set.attach_direct(Arc::new(peer));
        assert_eq!(set.select().kind(), TransportKind::Relay);

        // Re-evaluated on every call: the channel opening is picked up.
        open.store(true, Ordering::Relaxed);
        assert_eq!(set.select().kind(), TransportKind::Direct);
        assert!(set.direct_ready());

        set.detach_direct();
        assert_eq!(set.select().kind(), TransportKind::Relay);
    }
}
