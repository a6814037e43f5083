//! Session controller.
//!
//! Owns every transfer of one rendezvous session, keyed by file id. The
//! embedding application feeds it peer-channel and signaling events; it
//! reports back through a [`SessionEvent`] stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use shareit_protocol::{
    Ack, ClientEvent, ControlMessage, FileMeta, ResumeState, ServerEvent,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::flow::{self, FlowContext};
use crate::inbound::{ChunkData, Inbound};
use crate::integrity::{Verification, checksum_bytes};
use crate::progress::TransferProgress;
use crate::receiver::{ChunkOutcome, ReceiveTransfer, ReceiverState, reassemble_and_verify};
use crate::sender::{SenderPhase, SenderShared};
use crate::transport::{
    PeerChannel, PeerEvent, RelayTransport, SignalingChannel, TransportSet,
};
use crate::{TransferConfig, TransferError, TransportError};

/// Which side of a transfer this peer is on. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Notifications emitted by a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Another member joined the session room.
    PeerJoined { socket_id: String },
    /// Negotiation payload for the peer-connection service.
    Signal {
        from: String,
        signal: serde_json::Value,
    },
    DirectOpened,
    DirectClosed,
    /// A local file was hashed and announced to the peer.
    Announced { meta: FileMeta },
    /// The peer announced a file.
    Incoming { meta: FileMeta },
    Progress(TransferProgress),
    SendCompleted { file_id: String },
    FileReceived {
        file_id: String,
        name: String,
        data: Vec<u8>,
    },
    ChecksumMismatch {
        file_id: String,
        expected: String,
        actual: String,
    },
}

enum Entry {
    Sender(Arc<SenderShared>),
    Receiver(ReceiveTransfer),
}

impl Entry {
    fn role(&self) -> Role {
        match self {
            Entry::Sender(_) => Role::Sender,
            Entry::Receiver(_) => Role::Receiver,
        }
    }
}

type Registry = HashMap<String, Entry>;

struct Inner {
    session_id: String,
    config: TransferConfig,
    transports: Arc<TransportSet>,
    registry: Mutex<Registry>,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: CancellationToken,
}

/// Handle to one session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a session bound to the signaling connection. Call
    /// [`join`](Self::join) before sending anything over the relay.
    pub fn new(
        session_id: impl Into<String>,
        config: TransferConfig,
        signaling: Arc<dyn SignalingChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let session_id = session_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = RelayTransport::new(session_id.clone(), signaling);
        let session = Self {
            inner: Arc::new(Inner {
                session_id,
                config,
                transports: Arc::new(TransportSet::new(relay)),
                registry: Mutex::new(HashMap::new()),
                events: tx,
                closed: CancellationToken::new(),
            }),
        };
        (session, rx)
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.send(event);
    }

    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.is_closed() {
            Err(TransferError::SessionClosed)
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Transports
    // -----------------------------------------------------------------------

    /// Joins the session room on the signaling service.
    pub fn join(&self) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.inner.transports.relay().join()?;
        info!(session_id = %self.inner.session_id, "joined session");
        Ok(())
    }

    /// Attaches the direct channel. It is used as soon as it reports open.
    pub fn attach_direct(&self, channel: Arc<dyn PeerChannel>) {
        self.inner.transports.attach_direct(channel);
    }

    pub fn detach_direct(&self) {
        self.inner.transports.detach_direct();
    }

    /// Forwards a negotiation payload to the other member of the room.
    pub fn send_signal(&self, signal: serde_json::Value) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.inner.transports.relay().emit(ClientEvent::Signal {
            session_id: self.inner.session_id.clone(),
            signal,
        })?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Registers `data` for sending and returns its file id.
    ///
    /// Hashing, the announcement and the send loop run in a background
    /// task; progress is reported through the event stream.
    pub fn send_file(&self, name: impl Into<String>, data: Vec<u8>) -> Result<String, TransferError> {
        self.ensure_open()?;
        let file_id = uuid::Uuid::new_v4().to_string();
        let shared = Arc::new(SenderShared::new(file_id.clone(), name.into(), data));

        {
            let mut registry = self.registry();
            if registry.contains_key(&file_id) {
                return Err(TransferError::DuplicateFileId(file_id));
            }
            registry.insert(file_id.clone(), Entry::Sender(Arc::clone(&shared)));
        }

        info!(
            file_id = %file_id,
            name = %shared.name,
            size = shared.size(),
            chunks = shared.total_chunks(),
            "queued file for sending"
        );
        shared.set_phase(SenderPhase::Hashing);

        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.announce_and_send(shared).await {
                warn!(error = %e, "failed to start transfer");
            }
        });
        Ok(file_id)
    }

    async fn announce_and_send(&self, shared: Arc<SenderShared>) -> Result<(), TransferError> {
        let data = shared.data();
        let checksum = run_blocking(move || checksum_bytes(&data)).await?;
        shared.set_checksum(checksum);

        // The session may have been closed while hashing.
        if self.is_closed() || !self.registry().contains_key(&shared.file_id) {
            return Err(TransferError::SessionClosed);
        }
        let Some(meta) = shared.meta() else {
            return Err(TransferError::UnknownFileId(shared.file_id.clone()));
        };

        let announcement = ControlMessage::FileMeta(meta.clone());
        let transport = loop {
            let transport = self.inner.transports.select();
            match transport.send_control(&announcement) {
                Ok(()) => break transport,
                Err(TransportError::Backpressure) => {
                    debug!(file_id = %meta.file_id, "outbound queue full, delaying announcement");
                    tokio::time::sleep(self.inner.config.relay_pacing.max(flow::MIN_REQUEUE_DELAY)).await;
                    if self.is_closed() {
                        return Err(TransferError::SessionClosed);
                    }
                }
                Err(e) => {
                    warn!(file_id = %meta.file_id, error = %e, "failed to announce file");
                    break transport;
                }
            }
        };
        shared.set_phase(SenderPhase::Announced);
        debug!(file_id = %meta.file_id, transport = ?transport.kind(), "file announced");
        self.emit(SessionEvent::Announced { meta });

        flow::spawn(self.flow_context(shared), 0);
        Ok(())
    }

    fn flow_context(&self, shared: Arc<SenderShared>) -> FlowContext {
        FlowContext {
            shared,
            transports: Arc::clone(&self.inner.transports),
            config: self.inner.config.clone(),
            events: self.inner.events.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Handles an event from the peer-connection service.
    pub fn handle_peer_event(&self, event: PeerEvent) {
        if self.is_closed() {
            debug!("peer event after session close ignored");
            return;
        }
        match event {
            PeerEvent::Open => {
                info!(session_id = %self.inner.session_id, "direct channel open");
                self.emit(SessionEvent::DirectOpened);
            }
            PeerEvent::Closed => {
                info!(session_id = %self.inner.session_id, "direct channel closed, using relay");
                self.detach_direct();
                self.emit(SessionEvent::DirectClosed);
            }
            PeerEvent::Message(msg) => match Inbound::from_peer(msg) {
                Ok(inbound) => self.dispatch(inbound),
                Err(e) => warn!(error = %e, "dropping malformed peer message"),
            },
        }
    }

    /// Handles an event delivered by the signaling service.
    pub fn handle_server_event(&self, event: ServerEvent) {
        if self.is_closed() {
            debug!("signaling event after session close ignored");
            return;
        }
        match event {
            ServerEvent::PeerJoined { socket_id } => {
                info!(%socket_id, "peer joined session");
                self.emit(SessionEvent::PeerJoined { socket_id });
            }
            ServerEvent::Signal { from, signal } => {
                self.emit(SessionEvent::Signal { from, signal });
            }
            ServerEvent::RelayChunk(payload) => match Inbound::from_relay(payload) {
                Ok(inbound) => self.dispatch(inbound),
                Err(e) => warn!(error = %e, "dropping malformed relay payload"),
            },
            ServerEvent::ResumeRequest { from } => {
                debug!(?from, "resume requested over signaling");
                self.answer_resume();
            }
            ServerEvent::ResumeState(state) => self.apply_resume_state(state),
        }
    }

    fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::FileMeta(meta) => self.on_file_meta(meta),
            Inbound::Ack(ack) | Inbound::RelayedAck(ack) => self.on_ack(&ack),
            Inbound::RequestResume => self.forward_resume_request(),
            Inbound::ChunkFrame(chunk) => self.on_chunk(chunk, true),
            Inbound::RelayedChunk(chunk) => self.on_chunk(chunk, false),
        }
    }

    fn on_file_meta(&self, meta: FileMeta) {
        let verify = {
            let mut registry = self.registry();
            if registry.contains_key(&meta.file_id) {
                warn!(
                    error = %TransferError::DuplicateFileId(meta.file_id.clone()),
                    "dropping repeated announcement"
                );
                return;
            }
            let mut transfer = ReceiveTransfer::new(meta.clone());
            let verify = transfer
                .mark_verifying_if_empty()
                .then(|| transfer.take_chunks().ok())
                .flatten();
            registry.insert(meta.file_id.clone(), Entry::Receiver(transfer));
            verify
        };

        info!(
            file_id = %meta.file_id,
            name = %meta.name,
            size = meta.size,
            chunks = meta.total_chunks,
            "incoming file"
        );
        self.emit(SessionEvent::Incoming { meta: meta.clone() });

        if let Some(chunks) = verify {
            self.spawn_verification(meta, chunks);
        }
    }

    fn on_ack(&self, ack: &Ack) {
        let registry = self.registry();
        match registry.get(&ack.file_id) {
            Some(Entry::Sender(shared)) => {
                if !shared.pending.resolve(ack.chunk_index) {
                    debug!(file_id = %ack.file_id, index = ack.chunk_index, "ack with no pending entry");
                }
            }
            Some(Entry::Receiver(_)) => {
                warn!(error = %TransferError::WrongRole(ack.file_id.clone()), "dropping ack");
            }
            None => {
                warn!(error = %TransferError::UnknownFileId(ack.file_id.clone()), "dropping ack");
            }
        }
    }

    fn on_chunk(&self, chunk: ChunkData, acknowledge: bool) {
        let ChunkData {
            file_id,
            chunk_index,
            data,
        } = chunk;

        let (progress, verify) = {
            let mut registry = self.registry();
            let transfer = match registry.get_mut(&file_id) {
                Some(Entry::Receiver(transfer)) => transfer,
                Some(Entry::Sender(_)) => {
                    warn!(error = %TransferError::WrongRole(file_id), "dropping chunk");
                    return;
                }
                None => {
                    warn!(error = %TransferError::UnknownFileId(file_id), "dropping chunk");
                    return;
                }
            };

            match transfer.accept_chunk(chunk_index, data) {
                Ok(ChunkOutcome::Stored) => (Some(progress_of(transfer)), None),
                Ok(ChunkOutcome::Complete) => {
                    let chunks = transfer.take_chunks().ok();
                    let meta = transfer.meta().clone();
                    (Some(progress_of(transfer)), chunks.map(|c| (meta, c)))
                }
                Ok(ChunkOutcome::Duplicate) => {
                    debug!(file_id = %file_id, index = chunk_index, "duplicate chunk");
                    (None, None)
                }
                Ok(ChunkOutcome::Ignored) => {
                    debug!(file_id = %file_id, index = chunk_index, "chunk after completion");
                    (None, None)
                }
                Err(e) => {
                    warn!(error = %e, "dropping chunk");
                    return;
                }
            }
        };

        if acknowledge {
            let ack = ControlMessage::Ack(Ack {
                file_id: file_id.clone(),
                chunk_index,
            });
            if let Err(e) = self.inner.transports.select().send_control(&ack) {
                warn!(file_id = %file_id, index = chunk_index, error = %e, "failed to send ack");
            }
        }
        if let Some(progress) = progress {
            self.emit(SessionEvent::Progress(progress));
        }
        if let Some((meta, chunks)) = verify {
            self.spawn_verification(meta, chunks);
        }
    }

    fn spawn_verification(&self, meta: FileMeta, chunks: BTreeMap<u32, Vec<u8>>) {
        let session = self.clone();
        tokio::spawn(async move {
            let file_id = meta.file_id.clone();
            let name = meta.name.clone();
            let (data, verification) = match run_blocking(move || reassemble_and_verify(&meta, &chunks)).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) | Err(e) => {
                    error!(file_id = %file_id, error = %e, "reassembly failed");
                    return;
                }
            };

            if let Some(Entry::Receiver(transfer)) = session.registry().get_mut(&file_id) {
                transfer.finish(&verification);
            }

            match verification {
                Verification::Verified => {
                    info!(file_id = %file_id, name = %name, bytes = data.len(), "file verified");
                    session.emit(SessionEvent::FileReceived {
                        file_id,
                        name,
                        data,
                    });
                }
                Verification::ChecksumMismatch { expected, actual } => {
                    let err = TransferError::ChecksumMismatch {
                        file_id: file_id.clone(),
                    };
                    error!(
                        error = %err,
                        %expected,
                        %actual,
                        "integrity check failed"
                    );
                    session.emit(SessionEvent::ChecksumMismatch {
                        file_id,
                        expected,
                        actual,
                    });
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Resume
    // -----------------------------------------------------------------------

    /// Asks the peer for its receive progress.
    ///
    /// Goes over the direct channel when it is open, over signaling otherwise.
    pub fn request_resume(&self) -> Result<(), TransferError> {
        self.ensure_open()?;
        let transports = &self.inner.transports;
        if transports.direct_ready() {
            transports.select().send_control(&ControlMessage::RequestResume)?;
        } else {
            transports.relay().emit(ClientEvent::ResumeRequest {
                session_id: self.inner.session_id.clone(),
            })?;
        }
        Ok(())
    }

    /// A `request-resume` from the direct channel is turned into the
    /// signaling `resume-request`, which the peer answers with its state.
    fn forward_resume_request(&self) {
        debug!("resume requested over direct channel");
        let event = ClientEvent::ResumeRequest {
            session_id: self.inner.session_id.clone(),
        };
        if let Err(e) = self.inner.transports.relay().emit(event) {
            warn!(error = %e, "failed to forward resume request");
        }
    }

    /// Receive progress of every receiver-role transfer.
    pub fn resume_snapshot(&self) -> ResumeState {
        self.registry()
            .iter()
            .filter_map(|(id, entry)| match entry {
                Entry::Receiver(transfer) => Some((id.clone(), transfer.resume_entry())),
                Entry::Sender(_) => None,
            })
            .collect()
    }

    fn answer_resume(&self) {
        let state = self.resume_snapshot();
        debug!(files = state.len(), "answering resume request");
        let event = ClientEvent::ResumeState {
            session_id: self.inner.session_id.clone(),
            state,
        };
        if let Err(e) = self.inner.transports.relay().emit(event) {
            warn!(error = %e, "failed to send resume state");
        }
    }

    fn apply_resume_state(&self, state: ResumeState) {
        for (file_id, entry) in state {
            let shared = match self.registry().get(&file_id) {
                Some(Entry::Sender(shared)) => Arc::clone(shared),
                Some(Entry::Receiver(_)) => {
                    warn!(error = %TransferError::WrongRole(file_id), "ignoring resume entry");
                    continue;
                }
                None => {
                    warn!(error = %TransferError::UnknownFileId(file_id), "ignoring resume entry");
                    continue;
                }
            };
            if shared.meta().is_none() {
                debug!(file_id = %file_id, "resume entry for file still hashing");
                continue;
            }

            let start = entry.resume_from();
            let total = shared.total_chunks();
            if start >= total {
                shared.stop();
                shared.set_ack_count(total);
                if shared.phase() != SenderPhase::Completed {
                    shared.set_phase(SenderPhase::Completed);
                    self.emit(SessionEvent::SendCompleted { file_id });
                }
                continue;
            }

            info!(file_id = %file_id, start, total, "resuming transfer");
            flow::spawn(self.flow_context(shared), start);
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn progress(&self, file_id: &str) -> Option<TransferProgress> {
        self.registry().get(file_id).map(|entry| match entry {
            Entry::Sender(shared) => TransferProgress {
                file_id: file_id.to_string(),
                role: Role::Sender,
                done: shared.ack_count(),
                total: shared.total_chunks(),
            },
            Entry::Receiver(transfer) => progress_of(transfer),
        })
    }

    /// Ids of every transfer in the session, sorted.
    pub fn transfer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn role(&self, file_id: &str) -> Option<Role> {
        self.registry().get(file_id).map(Entry::role)
    }

    pub fn sender_phase(&self, file_id: &str) -> Option<SenderPhase> {
        match self.registry().get(file_id)? {
            Entry::Sender(shared) => Some(shared.phase()),
            Entry::Receiver(_) => None,
        }
    }

    pub fn receiver_state(&self, file_id: &str) -> Option<ReceiverState> {
        match self.registry().get(file_id)? {
            Entry::Receiver(transfer) => Some(transfer.state()),
            Entry::Sender(_) => None,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Drops transfers with no activity for `idle_timeout`. Senders that are
    /// hashing or sending and receivers being verified are kept.
    pub fn sweep_idle(&self) -> usize {
        let idle_timeout = self.inner.config.idle_timeout;
        let now = Instant::now();
        let mut registry = self.registry();
        let before = registry.len();

        registry.retain(|file_id, entry| {
            let (busy, updated_at) = match entry {
                Entry::Sender(shared) => (
                    matches!(shared.phase(), SenderPhase::Hashing | SenderPhase::Sending),
                    shared.updated_at(),
                ),
                Entry::Receiver(transfer) => (
                    transfer.state() == ReceiverState::Verifying,
                    transfer.updated_at(),
                ),
            };
            let keep = busy || now.saturating_duration_since(updated_at) < idle_timeout;
            if !keep {
                debug!(file_id = %file_id, role = ?entry.role(), "sweeping idle transfer");
                if let Entry::Sender(shared) = entry {
                    shared.stop();
                }
            }
            keep
        });

        before - registry.len()
    }

    /// Runs [`sweep_idle`](Self::sweep_idle) periodically until the session
    /// is closed.
    pub fn spawn_idle_sweeper(&self) -> JoinHandle<()> {
        let session = self.clone();
        let period = (self.inner.config.idle_timeout / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = session.inner.closed.cancelled() => break,
                    _ = ticker.tick() => {
                        let swept = session.sweep_idle();
                        if swept > 0 {
                            info!(swept, "removed idle transfers");
                        }
                    }
                }
            }
        })
    }

    /// Cancels every send loop and pending ack and drops all transfers.
    pub fn close_session(&self) {
        self.inner.closed.cancel();
        let drained: Vec<Entry> = self.registry().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            if let Entry::Sender(shared) = entry {
                shared.stop();
            }
        }
        self.detach_direct();
        info!(
            session_id = %self.inner.session_id,
            transfers = drained.len(),
            "session closed"
        );
    }
}

fn progress_of(transfer: &ReceiveTransfer) -> TransferProgress {
    TransferProgress {
        file_id: transfer.meta().file_id.clone(),
        role: Role::Receiver,
        done: transfer.chunks_received(),
        total: transfer.meta().total_chunks,
    }
}

/// Runs CPU-bound work off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, TransferError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))
}
