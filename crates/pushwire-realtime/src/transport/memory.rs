//! In-memory scripted transport for single-process use and tests.
//!
//! Each `open` consumes the next scripted [`OpenOutcome`] (accepting when the
//! script is empty) and registers a [`MemoryPeer`] that plays the remote side.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pushwire_core::{AppError, AppResult};

use super::{ReadyState, Transport, TransportEvent, TransportHandle, TransportLink};

/// Result of one scripted dial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Open the connection.
    #[default]
    Accept,
    /// Refuse the dial with the given reason.
    Reject(String),
}

/// Scripted in-memory transport. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryTransportInner>,
}

#[derive(Debug, Default)]
struct MemoryTransportInner {
    opens: AtomicUsize,
    script: Mutex<VecDeque<OpenOutcome>>,
    fallback: Mutex<OpenOutcome>,
    open_delay: Mutex<Duration>,
    auto_ack: AtomicBool,
    peers: Mutex<Vec<MemoryPeer>>,
}

impl MemoryTransport {
    /// Create a transport that accepts every dial immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted dial.
    pub fn push_outcome(&self, outcome: OpenOutcome) {
        self.inner.script.lock().push_back(outcome);
    }

    /// Queue `count` rejections.
    pub fn reject_next(&self, count: usize, reason: &str) {
        let mut script = self.inner.script.lock();
        for _ in 0..count {
            script.push_back(OpenOutcome::Reject(reason.to_string()));
        }
    }

    /// Outcome used once the script is exhausted.
    pub fn set_fallback(&self, outcome: OpenOutcome) {
        *self.inner.fallback.lock() = outcome;
    }

    /// Delay every dial by `delay` before resolving it.
    pub fn set_open_delay(&self, delay: Duration) {
        *self.inner.open_delay.lock() = delay;
    }

    /// Answer every probe with an acknowledgement on connections opened from now on.
    pub fn set_auto_ack(&self, enabled: bool) {
        self.inner.auto_ack.store(enabled, Ordering::SeqCst);
    }

    /// Number of `open` calls so far, including rejected ones.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Every peer created so far, oldest first.
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.inner.peers.lock().clone()
    }

    /// The most recently opened peer.
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.inner.peers.lock().last().cloned()
    }

    fn next_outcome(&self) -> OpenOutcome {
        self.inner
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.inner.fallback.lock().clone())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, endpoint: &str) -> AppResult<TransportLink> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let OpenOutcome::Reject(reason) = self.next_outcome() {
            return Err(AppError::transport(format!(
                "{endpoint} refused the connection: {reason}"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            shared: Arc::new(PeerShared {
                endpoint: endpoint.to_string(),
                events: tx,
                state: AtomicU8::new(ReadyState::Open as u8),
                sent: Mutex::new(Vec::new()),
                probes: AtomicUsize::new(0),
                auto_ack: self.inner.auto_ack.load(Ordering::SeqCst),
            }),
        };
        peer.shared.emit(TransportEvent::Opened);
        self.inner.peers.lock().push(peer.clone());

        let handle = Arc::new(MemoryHandle {
            peer: Arc::clone(&peer.shared),
        });
        Ok(TransportLink::new(handle, rx))
    }
}

#[derive(Debug)]
struct PeerShared {
    endpoint: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: AtomicU8,
    sent: Mutex<Vec<Bytes>>,
    probes: AtomicUsize,
    auto_ack: bool,
}

impl PeerShared {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn close(&self) {
        let previous = self.state.swap(ReadyState::Closed as u8, Ordering::SeqCst);
        if ReadyState::from_u8(previous) != ReadyState::Closed {
            self.emit(TransportEvent::Closed);
        }
    }
}

/// Remote side of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Arc<PeerShared>,
}

impl MemoryPeer {
    /// Endpoint this peer was dialled at.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Close the connection from the remote side.
    pub fn close_from_remote(&self) {
        self.shared.close();
    }

    /// Report a transport error without closing.
    pub fn emit_error(&self, message: &str) {
        self.shared
            .emit(TransportEvent::Errored(AppError::transport(message)));
    }

    /// Report a transport error and close, as a dropped socket would.
    pub fn fail(&self, message: &str) {
        self.shared.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
        self.emit_error(message);
        self.shared.close();
    }

    /// Push a payload to the client.
    pub fn push_message(&self, payload: impl Into<Bytes>) {
        self.shared
            .emit(TransportEvent::MessageReceived(payload.into()));
    }

    /// Acknowledge a probe.
    pub fn ack(&self) {
        self.shared.emit(TransportEvent::Acknowledged);
    }

    /// Payloads the client has sent.
    pub fn sent(&self) -> Vec<Bytes> {
        self.shared.sent.lock().clone()
    }

    /// Probes the client has sent.
    pub fn probe_count(&self) -> usize {
        self.shared.probes.load(Ordering::SeqCst)
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.shared.ready_state() == ReadyState::Closed
    }
}

#[derive(Debug)]
struct MemoryHandle {
    peer: Arc<PeerShared>,
}

#[async_trait]
impl TransportHandle for MemoryHandle {
    async fn send(&self, payload: Bytes) -> AppResult<()> {
        if self.peer.ready_state() != ReadyState::Open {
            return Err(AppError::transport("in-memory connection is closed"));
        }
        self.peer.sent.lock().push(payload);
        Ok(())
    }

    async fn probe(&self) -> AppResult<()> {
        if self.peer.ready_state() != ReadyState::Open {
            return Err(AppError::transport("in-memory connection is closed"));
        }
        self.peer.probes.fetch_add(1, Ordering::SeqCst);
        if self.peer.auto_ack {
            self.peer.emit(TransportEvent::Acknowledged);
        }
        Ok(())
    }

    async fn close(&self) {
        self.peer.close();
    }

    fn ready_state(&self) -> ReadyState {
        self.peer.ready_state()
    }
}
