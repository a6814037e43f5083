use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shareit_protocol::constants::WS_MAX_MESSAGE_SIZE;
use shareit_protocol::{ClientEvent, ServerEvent};
use shareit_transfer::{SignalingChannel, TransportError};

use crate::SignalingError;
use crate::pumps::{ping::ping_pump, read::read_pump, write::write_pump};

/// Capacity of the outbound frame queue.
const WRITE_QUEUE: usize = 256;

/// WebSocket connection to the signaling service.
///
/// Three tasks own the socket: a write pump draining the outbound queue, a
/// read pump decoding [`ServerEvent`]s, and a ping pump. When any of them
/// stops the others follow and the event receiver yields `None`.
pub struct WsSignalingClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: JoinHandle<()>,
    _write_handle: JoinHandle<()>,
    _ping_handle: JoinHandle<()>,
}

impl WsSignalingClient {
    /// Connects to `url` and starts the pumps.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), SignalingError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        info!(url, "connected to signaling service");

        let (write, read) = ws_stream.split();
        Ok(Self::start(write, read, WRITE_QUEUE))
    }

    /// Spawns the pumps over an already-open socket split into halves.
    pub(crate) fn start<W, R>(
        write: W,
        read: R,
        queue: usize,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>)
    where
        W: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin + Send + 'static,
        R: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::channel(queue);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(write_pump(write, write_rx, cancel.clone()));
        let read_handle = tokio::spawn(read_pump(
            read,
            events_tx,
            write_tx.clone(),
            cancel.clone(),
        ));
        let ping_handle = tokio::spawn(ping_pump(write_tx.clone(), cancel.clone()));

        let client = Self {
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        };
        (client, events_rx)
    }

    /// Serializes and queues one event without waiting.
    pub fn send(&self, event: &ClientEvent) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(SignalingError::Closed.into());
        }
        let json = serde_json::to_string(event).map_err(SignalingError::from)?;
        self.write_tx
            .try_send(tungstenite::Message::Text(json.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops all pumps. The write pump sends a close frame on its way out.
    pub fn close(&self) {
        debug!("closing signaling connection");
        self.cancel.cancel();
    }
}

impl SignalingChannel for WsSignalingClient {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.send(&event)
    }
}

impl Drop for WsSignalingClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};
    use shareit_protocol::{CHUNK_SIZE, RelayPayload, ResumeState};
    use shareit_transfer::{Session, SessionEvent, TransferConfig};
    use std::sync::Arc;
    use std::time::Duration;

    type Frame = Result<tungstenite::Message, tungstenite::Error>;

    /// Client wired to in-memory halves: returns the client, its event
    /// stream, what it wrote, and a handle to feed server frames.
    fn connected(
        queue: usize,
    ) -> (
        WsSignalingClient,
        mpsc::UnboundedReceiver<ServerEvent>,
        mpsc::UnboundedReceiver<tungstenite::Message>,
        mpsc::UnboundedSender<Frame>,
    ) {
        connected_with_latency(queue, Duration::ZERO)
    }

    /// Like [`connected`], but every socket write takes `latency`.
    fn connected_with_latency(
        queue: usize,
        latency: Duration,
    ) -> (
        WsSignalingClient,
        mpsc::UnboundedReceiver<ServerEvent>,
        mpsc::UnboundedReceiver<tungstenite::Message>,
        mpsc::UnboundedSender<Frame>,
    ) {
        let (wire_tx, wire_rx) = mpsc::unbounded_channel();
        let write = Box::pin(sink::unfold(wire_tx, move |tx, msg: tungstenite::Message| async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        }));

        let (server_tx, server_rx) = mpsc::unbounded_channel::<Frame>();
        let read = Box::pin(stream::unfold(server_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }));

        let (client, events) = WsSignalingClient::start(write, read, queue);
        (client, events, wire_rx, server_tx)
    }

    fn text_of(msg: tungstenite::Message) -> serde_json::Value {
        let tungstenite::Message::Text(text) = msg else {
            panic!("expected text frame, got {msg:?}");
        };
        serde_json::from_str(text.as_str()).unwrap()
    }

    #[tokio::test]
    async fn emits_envelope_as_text_frame() {
        let (client, _events, mut wire, _server) = connected(16);
        client.emit(ClientEvent::Join("k3j9x0qa".into())).unwrap();
        client
            .emit(ClientEvent::RelayChunk {
                session_id: "k3j9x0qa".into(),
                payload: RelayPayload::chunk("f1", 0, b"hi"),
            })
            .unwrap();

        assert_eq!(
            text_of(wire.recv().await.unwrap()),
            serde_json::json!({"event": "join", "data": "k3j9x0qa"})
        );
        assert_eq!(
            text_of(wire.recv().await.unwrap()),
            serde_json::json!({
                "event": "relay-chunk",
                "data": {
                    "sessionId": "k3j9x0qa",
                    "payload": {"fileId": "f1", "chunkIndex": 0, "chunkBase64": "aGk="}
                }
            })
        );
    }

    #[tokio::test]
    async fn delivers_server_events() {
        let (_client, mut events, _wire, server) = connected(16);
        server
            .send(Ok(tungstenite::Message::Text(
                r#"{"event":"resume-state","data":{"f1":{"received":3,"lastIndex":4}}}"#.into(),
            )))
            .unwrap();

        let Some(ServerEvent::ResumeState(state)) = events.recv().await else {
            panic!("expected resume-state");
        };
        let expected: ResumeState = serde_json::from_str(r#"{"f1":{"received":3,"lastIndex":4}}"#).unwrap();
        assert_eq!(state, expected);
    }

    #[tokio::test]
    async fn full_queue_is_backpressure() {
        let (client, _events, _wire, _server) = connected(1);
        // The write pump has not run yet on this single-threaded runtime.
        client.emit(ClientEvent::Join("a".into())).unwrap();
        assert!(matches!(
            client.emit(ClientEvent::Join("b".into())),
            Err(TransportError::Backpressure)
        ));
    }

    #[tokio::test]
    async fn close_stops_pumps_and_rejects_emits() {
        let (client, mut events, mut wire, _server) = connected(16);
        client.close();
        assert!(client.is_closed());
        assert!(matches!(
            client.emit(ClientEvent::Join("a".into())),
            Err(TransportError::Closed)
        ));

        let closing = tokio::time::timeout(Duration::from_secs(2), async {
            assert_eq!(events.recv().await, None);
            wire.recv().await
        })
        .await
        .unwrap();
        assert!(matches!(closing, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn server_disconnect_ends_event_stream() {
        let (client, mut events, _wire, server) = connected(16);
        drop(server);
        let end = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap();
        assert_eq!(end, None);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn slow_socket_delays_relay_but_loses_no_chunks() {
        let (client, _events, mut wire, _server) =
            connected_with_latency(4, Duration::from_millis(10));
        let config = TransferConfig {
            relay_pacing: Duration::from_millis(1),
            ..TransferConfig::default()
        };
        let (session, mut session_events) =
            Session::new("k3j9x0qa", config, Arc::new(client) as Arc<dyn SignalingChannel>);
        session.join().unwrap();

        let chunks = 20u32;
        let file_id = session
            .send_file("big.bin", vec![3u8; chunks as usize * CHUNK_SIZE])
            .unwrap();

        let completed = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = session_events.recv().await {
                if let SessionEvent::SendCompleted { file_id: done } = event {
                    return done;
                }
            }
            panic!("session event stream ended");
        })
        .await
        .unwrap();
        assert_eq!(completed, file_id);

        let mut indices = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), async {
            while indices.len() < chunks as usize {
                let frame = text_of(wire.recv().await.unwrap());
                if frame["event"] == "relay-chunk" {
                    if let Some(index) = frame["data"]["payload"]["chunkIndex"].as_u64() {
                        indices.push(index as u32);
                    }
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(indices, (0..chunks).collect::<Vec<_>>());
    }
}
