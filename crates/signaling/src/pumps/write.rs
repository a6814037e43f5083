//! WebSocket write pump: the only task that touches the sink.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Drains the outbound queue into the WebSocket until cancelled, the queue
/// closes, or a write fails. Sends a close frame on the way out.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => msg,
        };
        let Some(msg) = msg else {
            debug!("outbound queue closed");
            break;
        };
        if let Err(e) = write.send(msg).await {
            error!("signaling write error: {e}");
            break;
        }
    }

    // Stop the sibling pumps too; the connection is unusable without us.
    cancel.cancel();
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
