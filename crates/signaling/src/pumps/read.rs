//! WebSocket read pump: decodes server events and keeps the pong deadline.

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use shareit_protocol::ServerEvent;
use shareit_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};

/// Reads frames until the connection ends and pushes decoded events.
///
/// Any inbound frame resets the deadline; if nothing arrives within
/// [`WS_PONG_WAIT`] the connection is considered dead. On exit the shared
/// token is cancelled and the event channel closes, which is how the owner
/// learns about the disconnect.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events: mpsc::UnboundedSender<ServerEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            () = &mut deadline => {
                warn!("no traffic from signaling service within {WS_PONG_WAIT:?}, closing");
                break;
            }
            msg = read.next() => msg,
        };

        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!("signaling read error: {e}");
                break;
            }
            None => {
                debug!("signaling stream ended");
                break;
            }
        };
        deadline
            .as_mut()
            .reset(tokio::time::Instant::now() + WS_PONG_WAIT);

        match msg {
            tungstenite::Message::Text(text) => {
                if let Some(event) = decode_event(text.as_str()) {
                    let _ = events.send(event);
                }
            }
            tungstenite::Message::Ping(data) => {
                trace!("received ping, sending pong");
                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
            }
            tungstenite::Message::Pong(_) => trace!("received pong"),
            tungstenite::Message::Close(frame) => {
                debug!(?frame, "received close frame");
                break;
            }
            _ => debug!("ignoring non-text frame"),
        }
    }

    cancel.cancel();
}

/// Parses one envelope. Oversized or malformed text is dropped with a warning.
fn decode_event(text: &str) -> Option<ServerEvent> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return None;
    }
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("failed to parse signaling event: {e}");
            None
        }
    }
}
