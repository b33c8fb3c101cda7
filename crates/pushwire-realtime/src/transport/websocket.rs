//! WebSocket transport built on tokio-tungstenite.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use pushwire_core::{AppError, AppResult, ErrorKind};

use super::{ReadyState, Transport, TransportEvent, TransportHandle, TransportLink};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const PROBE_PAYLOAD: &[u8] = b"pushwire-heartbeat";

/// Dials `ws://` and `wss://` endpoints.
///
/// Text and binary frames surface as [`TransportEvent::MessageReceived`],
/// pong frames as [`TransportEvent::Acknowledged`]. Probes are ping frames.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a WebSocket transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &str) -> AppResult<TransportLink> {
        let (stream, _response) = connect_async(endpoint).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                format!("WebSocket handshake with {endpoint} failed: {e}"),
                e,
            )
        })?;

        let (sink, mut source) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Open as u8));
        let _ = tx.send(TransportEvent::Opened);

        let reader_state = Arc::clone(&state);
        let reader_endpoint = endpoint.to_string();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => {
                        TransportEvent::MessageReceived(Bytes::copy_from_slice(text.as_str().as_bytes()))
                    }
                    Ok(Message::Binary(data)) => TransportEvent::MessageReceived(data),
                    Ok(Message::Pong(_)) => TransportEvent::Acknowledged,
                    Ok(Message::Ping(_)) | Ok(Message::Frame(_)) => continue,
                    Ok(Message::Close(frame)) => {
                        debug!(endpoint = %reader_endpoint, ?frame, "WebSocket close frame received");
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Errored(AppError::with_source(
                            ErrorKind::Transport,
                            format!("WebSocket read from {reader_endpoint} failed: {e}"),
                            e,
                        )));
                        break;
                    }
                };
                if tx.send(event).is_err() {
                    break;
                }
            }

            reader_state.store(ReadyState::Closed as u8, Ordering::SeqCst);
            let _ = tx.send(TransportEvent::Closed);
            trace!(endpoint = %reader_endpoint, "WebSocket reader finished");
        });

        let handle = Arc::new(WebSocketHandle {
            endpoint: endpoint.to_string(),
            sink: Mutex::new(sink),
            state,
            reader,
        });
        Ok(TransportLink::new(handle, rx))
    }
}

/// Outbound payloads are opaque bytes and always travel as binary frames.
fn payload_frame(payload: Bytes) -> Message {
    Message::Binary(payload)
}

struct WebSocketHandle {
    endpoint: String,
    sink: Mutex<WsSink>,
    state: Arc<AtomicU8>,
    reader: JoinHandle<()>,
}

impl fmt::Debug for WebSocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketHandle")
            .field("endpoint", &self.endpoint)
            .field("state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl WebSocketHandle {
    async fn write(&self, message: Message) -> AppResult<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(AppError::transport(format!(
                "WebSocket to {} is not open",
                self.endpoint
            )));
        }
        self.sink.lock().await.send(message).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                format!("WebSocket write to {} failed: {e}", self.endpoint),
                e,
            )
        })
    }
}

#[async_trait]
impl TransportHandle for WebSocketHandle {
    async fn send(&self, payload: Bytes) -> AppResult<()> {
        self.write(payload_frame(payload)).await
    }

    async fn probe(&self) -> AppResult<()> {
        self.write(Message::Ping(Bytes::from_static(PROBE_PAYLOAD)))
            .await
    }

    async fn close(&self) {
        let opened = self.state.compare_exchange(
            ReadyState::Open as u8,
            ReadyState::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if opened.is_err() {
            return;
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(endpoint = %self.endpoint, error = %e, "WebSocket close handshake failed");
            self.reader.abort();
            self.state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}
