//! Sender-side flow control.
//!
//! Chunks go out strictly one after another. On an acknowledged transport
//! the next chunk waits for the previous ack (or the ack timeout); on a
//! best-effort transport the loop only paces itself.

use std::sync::Arc;
use std::time::Duration;

use shareit_protocol::ChunkHeader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pending::AckOutcome;
use crate::progress::TransferProgress;
use crate::sender::{SenderPhase, SenderShared};
use crate::session::{Role, SessionEvent};
use crate::transport::{Reliability, Transport, TransportKind, TransportSet};
use crate::{TransferConfig, TransportError};

/// Shortest wait before retrying a chunk the relay queue refused.
pub(crate) const MIN_REQUEUE_DELAY: Duration = Duration::from_millis(1);

/// Everything a running loop needs besides its start offset.
#[derive(Clone)]
pub(crate) struct FlowContext {
    pub(crate) shared: Arc<SenderShared>,
    pub(crate) transports: Arc<TransportSet>,
    pub(crate) config: TransferConfig,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
}

/// How one attempt to hand a chunk to a transport ended.
enum Delivery {
    /// On the wire, and acknowledged or given up on after the ack timeout.
    Sent,
    Cancelled,
    Failed(TransportError),
}

/// Starts a loop at `start`, cancelling any loop already running for the file.
pub(crate) fn spawn(ctx: FlowContext, start: u32) -> JoinHandle<()> {
    let cancel = ctx.shared.restart_loop(start);
    ctx.shared.set_phase(SenderPhase::Sending);
    tokio::spawn(run(ctx, start, cancel))
}

/// Emits chunks `start..total_chunks` and marks the file completed.
pub(crate) async fn run(ctx: FlowContext, start: u32, cancel: CancellationToken) {
    let shared = &ctx.shared;
    let total = shared.total_chunks();
    debug!(file_id = %shared.file_id, start, total, "send loop started");

    for index in start..total {
        if cancel.is_cancelled() {
            return;
        }

        let header = ChunkHeader::new(shared.file_id.clone(), index);
        if !deliver(&ctx, &header, &cancel).await {
            debug!(file_id = %shared.file_id, index, "send loop stopped");
            return;
        }

        let Some(done) = shared.record_chunk(&cancel) else {
            debug!(file_id = %shared.file_id, index, "send loop superseded");
            return;
        };
        let _ = ctx.events.send(SessionEvent::Progress(TransferProgress {
            file_id: shared.file_id.clone(),
            role: Role::Sender,
            done,
            total,
        }));
    }

    if cancel.is_cancelled() {
        return;
    }
    shared.set_phase(SenderPhase::Completed);
    info!(file_id = %shared.file_id, chunks = total, "all chunks sent");
    let _ = ctx.events.send(SessionEvent::SendCompleted {
        file_id: shared.file_id.clone(),
    });
}

/// Puts one chunk on the wire.
///
/// A chunk the direct channel refuses goes out over the relay instead, and a
/// full relay queue is waited out. Returns `false` when cancelled or when
/// neither path can take the chunk.
async fn deliver(ctx: &FlowContext, header: &ChunkHeader, cancel: &CancellationToken) -> bool {
    let shared = &ctx.shared;
    let index = header.chunk_index;
    let mut skip_direct = false;

    loop {
        let selected;
        let transport: &dyn Transport = if skip_direct {
            ctx.transports.relay()
        } else {
            selected = ctx.transports.select();
            &*selected
        };

        let outcome = match transport.reliability() {
            Reliability::Acknowledged => send_acknowledged(ctx, transport, header, cancel).await,
            Reliability::BestEffort => send_paced(ctx, transport, header, cancel).await,
        };
        match outcome {
            Delivery::Sent => return true,
            Delivery::Cancelled => return false,
            Delivery::Failed(e) if transport.kind() == TransportKind::Direct => {
                warn!(file_id = %shared.file_id, index, error = %e, "direct send failed, using relay");
                skip_direct = true;
            }
            Delivery::Failed(TransportError::Backpressure) => {
                debug!(file_id = %shared.file_id, index, "relay queue full, waiting");
                let delay = ctx.config.relay_pacing.max(MIN_REQUEUE_DELAY);
                if !pause(delay, cancel).await {
                    return false;
                }
                skip_direct = false;
            }
            Delivery::Failed(e) => {
                warn!(file_id = %shared.file_id, index, error = %e, "relay unavailable");
                return false;
            }
        }
    }
}

/// Sends one chunk and waits for its ack, re-sending up to
/// `retransmit_limit` times.
async fn send_acknowledged(
    ctx: &FlowContext,
    transport: &dyn Transport,
    header: &ChunkHeader,
    cancel: &CancellationToken,
) -> Delivery {
    let shared = &ctx.shared;
    let index = header.chunk_index;

    for attempt in 0..=ctx.config.retransmit_limit {
        let waiter = shared.pending.register(index);
        if let Err(e) = transport.send_chunk(header, shared.chunk(index)) {
            shared.pending.cancel(index);
            return Delivery::Failed(e);
        }

        match shared.pending.wait(waiter, ctx.config.ack_timeout, cancel).await {
            AckOutcome::Acked => return Delivery::Sent,
            AckOutcome::Cancelled if cancel.is_cancelled() => return Delivery::Cancelled,
            AckOutcome::Cancelled => return Delivery::Sent,
            AckOutcome::TimedOut if attempt < ctx.config.retransmit_limit => {
                debug!(file_id = %shared.file_id, index, attempt, "ack timeout, retransmitting");
            }
            AckOutcome::TimedOut => {
                debug!(file_id = %shared.file_id, index, "ack timeout, advancing");
            }
        }
    }
    Delivery::Sent
}

/// Sends one chunk with no ack wait, then pauses for the relay pacing.
async fn send_paced(
    ctx: &FlowContext,
    transport: &dyn Transport,
    header: &ChunkHeader,
    cancel: &CancellationToken,
) -> Delivery {
    let shared = &ctx.shared;
    if let Err(e) = transport.send_chunk(header, shared.chunk(header.chunk_index)) {
        return Delivery::Failed(e);
    }
    if pause(ctx.config.relay_pacing, cancel).await {
        Delivery::Sent
    } else {
        Delivery::Cancelled
    }
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
