//! Connection manager: owns the single managed connection.
//!
//! Every state transition goes through one lock around [`ManagerState`].
//! Dials, transport events, retry timers and heartbeat ticks run on their own
//! tasks but re-enter through that lock and re-check for destruction before
//! acting on what they observed.

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};

use pushwire_core::config::ConnectionConfig;
use pushwire_core::{AppError, AppResult, ErrorKind};

use crate::events::{
    ConnectedEvent, DisconnectReason, DisconnectedEvent, EventDispatcher, Subscription,
};
use crate::reconnect::{BackoffPolicy, ReconnectScheduler};
use crate::transport::{ReadyState, Transport, TransportEvent, TransportLink};

use super::handle::{Connection, ConnectionId};
use super::heartbeat::{HeartbeatMonitor, HeartbeatTick};
use super::state::{ConnectionState, LiveConnection, ManagerState, PendingDial};
use super::stats::{ConnectionStats, LifecycleCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialOrigin {
    /// A caller invoked `connect()`.
    Caller,
    /// A retry timer fired.
    Scheduler,
}

/// Manages one logical push connection: dialing, liveness, recovery and
/// lifecycle notifications.
///
/// Clones are cheap and share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<ManagerState>,
    dispatcher: EventDispatcher,
    scheduler: ReconnectScheduler,
    heartbeat: HeartbeatMonitor,
    messages: broadcast::Sender<Bytes>,
    counters: LifecycleCounters,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager for `config.endpoint` over `transport`.
    ///
    /// Nothing is dialled until [`ConnectionManager::connect`] is called.
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> AppResult<Self> {
        config.validate()?;

        let scheduler = ReconnectScheduler::new(
            BackoffPolicy::from(&config.reconnect),
            config.max_reconnect_attempts,
        );
        let heartbeat = HeartbeatMonitor::from(&config.heartbeat);
        let (messages, _) = broadcast::channel(config.message_buffer_size);

        let mut state = ManagerState::new();
        scheduler.reset(&mut state.reconnect);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                state: Mutex::new(state),
                dispatcher: EventDispatcher::new(),
                scheduler,
                heartbeat,
                messages,
                counters: LifecycleCounters::new(),
            }),
        })
    }

    /// Returns the live connection, dialing if needed.
    ///
    /// Concurrent calls made while a dial is in flight share that dial and
    /// its result. A failed dial arms a retry when auto-reconnect is on.
    /// Fails with [`ErrorKind::Destroyed`] after [`ConnectionManager::destroy`].
    pub async fn connect(&self) -> AppResult<Arc<Connection>> {
        self.inner.connect(DialOrigin::Caller).await
    }

    /// Whether a connection exists and its transport reports it open.
    pub fn is_connected(&self) -> bool {
        let state = self.inner.state.lock();
        state.phase == ConnectionState::Connected && state.open_connection().is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    /// Managed endpoint.
    pub fn endpoint(&self) -> &str {
        &self.inner.config.endpoint
    }

    /// Sends a payload over the live connection.
    pub async fn send(&self, payload: impl Into<Bytes>) -> AppResult<()> {
        let connection = self
            .inner
            .state
            .lock()
            .open_connection()
            .cloned()
            .ok_or_else(|| {
                AppError::not_connected(format!(
                    "No open connection to {}",
                    self.inner.config.endpoint
                ))
            })?;
        connection.send(payload).await
    }

    /// Subscribes to payloads pushed over the connection.
    ///
    /// Payloads arriving while nobody is subscribed, or while disconnected,
    /// are not replayed.
    pub fn messages(&self) -> broadcast::Receiver<Bytes> {
        self.inner.messages.subscribe()
    }

    /// Tears everything down: cancels timers, closes the connection and
    /// drops all listeners. Idempotent; later `connect()` calls fail fast.
    pub async fn destroy(&self) {
        self.inner.destroy().await;
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> ConnectionStats {
        let inner = &self.inner;
        let state = inner.state.lock();
        let live = state.open_connection();

        ConnectionStats {
            endpoint: inner.config.endpoint.clone(),
            state: state.phase,
            connected: state.phase == ConnectionState::Connected && live.is_some(),
            connection_id: state.live.as_ref().map(|l| l.connection.id()),
            reconnect_attempts: state.reconnect.attempts,
            max_reconnect_attempts: inner.scheduler.max_attempts(),
            auto_reconnect: inner.config.auto_reconnect,
            current_delay_ms: state.reconnect.current_delay.as_millis() as u64,
            last_ack_time: state.heartbeat.last_ack_at,
            last_probe_time: state.heartbeat.last_probe_at,
            counters: inner.counters.snapshot(),
        }
    }

    /// Registers a listener for successful connects.
    pub fn on_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectedEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_connected(callback)
    }

    /// Registers a listener for lost connections.
    pub fn on_disconnected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DisconnectedEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_disconnected(callback)
    }

    /// Registers a listener for dial failures and transport errors.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AppError) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_error(callback)
    }
}

/// A connection removed from the state, with its heartbeat loop.
struct Detached {
    live: LiveConnection,
    heartbeat: Option<JoinHandle<()>>,
}

impl ManagerInner {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn destroyed_error(&self) -> AppError {
        AppError::destroyed(format!(
            "Connection manager for {} has been destroyed",
            self.endpoint()
        ))
    }

    async fn connect(self: &Arc<Self>, origin: DialOrigin) -> AppResult<Arc<Connection>> {
        let pending = loop {
            let stale = {
                let mut state = self.state.lock();
                if state.phase == ConnectionState::Destroyed {
                    return Err(self.destroyed_error());
                }

                if let Some(live) = state.live.as_ref() {
                    if live.connection.is_open() {
                        return Ok(Arc::clone(&live.connection));
                    }
                    live.connection.id()
                } else if let Some(pending) = state.in_flight.as_ref() {
                    break pending.clone();
                } else {
                    if origin == DialOrigin::Caller {
                        self.scheduler.reset(&mut state.reconnect);
                    }
                    state.phase = ConnectionState::Connecting;
                    let pending = self.spawn_dial();
                    state.in_flight = Some(pending.clone());
                    break pending;
                }
            };

            // The transport dropped this connection but its close event has
            // not been drained yet.
            self.handle_closed(stale, DisconnectReason::TransportFailure);
        };

        pending.await
    }

    fn spawn_dial(self: &Arc<Self>) -> PendingDial {
        let inner = Arc::clone(self);
        let manager = Arc::downgrade(self);
        let task = tokio::spawn(async move { inner.dial().await });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    if let Some(inner) = manager.upgrade() {
                        let mut state = inner.state.lock();
                        state.in_flight = None;
                        if state.phase == ConnectionState::Connecting {
                            state.phase = ConnectionState::Disconnected;
                        }
                    }
                    Err(AppError::internal(format!("Dial task failed: {e}")))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn dial(self: Arc<Self>) -> AppResult<Arc<Connection>> {
        let endpoint = self.endpoint();
        debug!(endpoint, "Dialing");

        let opened = match timeout(self.config.dial_timeout(), self.transport.open(endpoint)).await
        {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(AppError::with_source(
                ErrorKind::Connection,
                format!("Failed to connect to {endpoint}: {}", e.message),
                e,
            )),
            Err(_) => Err(AppError::connection(format!(
                "Connecting to {endpoint} timed out after {}ms",
                self.config.dial_timeout_ms
            ))),
        };

        match opened {
            Ok(link) => self.establish(link).await,
            Err(err) => Err(self.dial_failed(err)),
        }
    }

    async fn establish(self: &Arc<Self>, link: TransportLink) -> AppResult<Arc<Connection>> {
        let TransportLink { handle, events } = link;
        let connection = Arc::new(Connection::new(self.config.endpoint.clone(), handle));
        let conn_id = connection.id();

        let accepted = {
            let mut state = self.state.lock();
            state.in_flight = None;

            if state.phase == ConnectionState::Destroyed {
                false
            } else {
                state.phase = ConnectionState::Connected;
                self.scheduler.reset(&mut state.reconnect);
                self.heartbeat.restart(&mut state.heartbeat);

                if self.config.heartbeat_enabled {
                    let manager = Arc::downgrade(self);
                    self.heartbeat.start(&mut state.heartbeat, move || {
                        let manager = manager.clone();
                        async move {
                            match manager.upgrade() {
                                Some(inner) => inner.heartbeat_tick(conn_id).await,
                                None => HeartbeatTick::Stop,
                            }
                        }
                    });
                }

                let pump = tokio::spawn(Self::pump(Arc::downgrade(self), conn_id, events));
                state.live = Some(LiveConnection {
                    connection: Arc::clone(&connection),
                    pump,
                });
                true
            }
        };

        if !accepted {
            debug!(endpoint = self.endpoint(), "Dial finished after destroy; closing");
            connection.close().await;
            return Err(self.destroyed_error());
        }

        self.counters.record_connect();
        info!(endpoint = self.endpoint(), conn_id = %conn_id, "Connection established");

        self.dispatcher.notify_connected(&ConnectedEvent {
            connection_id: conn_id,
            endpoint: self.config.endpoint.clone(),
            connected_at: connection.connected_at(),
        });

        Ok(connection)
    }

    fn dial_failed(self: &Arc<Self>, err: AppError) -> AppError {
        {
            let mut state = self.state.lock();
            state.in_flight = None;
            if state.phase == ConnectionState::Destroyed {
                return self.destroyed_error();
            }
            state.phase = ConnectionState::Disconnected;
        }

        self.counters.record_dial_failure();
        warn!(endpoint = self.endpoint(), error = %err, "Connection attempt failed");
        self.dispatcher.notify_error(&err);
        self.schedule_reconnect();
        err
    }

    /// Arms the next retry, or gives up once the attempt limit is reached.
    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.config.auto_reconnect {
            return;
        }

        let scheduled = {
            let mut state = self.state.lock();
            if state.phase == ConnectionState::Destroyed {
                return;
            }

            match self.scheduler.next_delay(&mut state.reconnect) {
                Some(delay) => {
                    let manager = Arc::downgrade(self);
                    self.scheduler
                        .arm(&mut state.reconnect, delay, move |token| async move {
                            if let Some(inner) = manager.upgrade() {
                                inner.retry(token).await;
                            }
                        });
                    if state.phase == ConnectionState::Disconnected {
                        state.phase = ConnectionState::Reconnecting;
                    }
                    Ok((state.reconnect.attempts, delay))
                }
                None => {
                    state.phase = ConnectionState::Disconnected;
                    Err(state.reconnect.attempts)
                }
            }
        };

        match scheduled {
            Ok((attempt, delay)) => info!(
                endpoint = self.endpoint(),
                attempt,
                max_attempts = self.scheduler.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            ),
            Err(attempts) => warn!(
                endpoint = self.endpoint(),
                attempts,
                "Reconnect attempts exhausted; waiting for an explicit connect()"
            ),
        }
    }

    async fn retry(self: &Arc<Self>, token: u64) {
        let attempt = {
            let mut state = self.state.lock();
            if state.phase == ConnectionState::Destroyed
                || !self.scheduler.claim(&mut state.reconnect, token)
            {
                return;
            }
            state.reconnect.attempts
        };

        debug!(endpoint = self.endpoint(), attempt, "Reconnect timer fired");
        match self.connect(DialOrigin::Scheduler).await {
            Ok(connection) => {
                debug!(endpoint = self.endpoint(), conn_id = %connection.id(), attempt, "Reconnected")
            }
            Err(e) if e.kind == ErrorKind::Destroyed => {}
            Err(e) => debug!(endpoint = self.endpoint(), attempt, error = %e, "Reconnect attempt failed"),
        }
    }

    async fn pump(
        manager: Weak<Self>,
        conn_id: ConnectionId,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(inner) = manager.upgrade() else {
                return;
            };

            match event {
                TransportEvent::Opened => trace!(conn_id = %conn_id, "Transport reported open"),
                TransportEvent::MessageReceived(payload) => {
                    inner.counters.record_message();
                    trace!(conn_id = %conn_id, bytes = payload.len(), "Message received");
                    let _ = inner.messages.send(payload);
                }
                TransportEvent::Acknowledged => inner.record_ack(conn_id),
                TransportEvent::Errored(err) => {
                    warn!(endpoint = inner.endpoint(), conn_id = %conn_id, error = %err, "Transport error");
                    inner.dispatcher.notify_error(&err);
                    if !inner.is_current_and_open(conn_id) {
                        inner.handle_closed(conn_id, DisconnectReason::TransportFailure);
                        return;
                    }
                }
                TransportEvent::Closed => {
                    inner.handle_closed(conn_id, DisconnectReason::ClosedByPeer);
                    return;
                }
            }
        }

        if let Some(inner) = manager.upgrade() {
            inner.handle_closed(conn_id, DisconnectReason::ClosedByPeer);
        }
    }

    fn record_ack(&self, conn_id: ConnectionId) {
        let mut state = self.state.lock();
        if state.is_current(conn_id) {
            self.heartbeat.record_ack(&mut state.heartbeat);
            trace!(conn_id = %conn_id, "Heartbeat acknowledged");
        }
    }

    fn is_current_and_open(&self, conn_id: ConnectionId) -> bool {
        self.state
            .lock()
            .open_connection()
            .is_some_and(|connection| connection.id() == conn_id)
    }

    async fn heartbeat_tick(self: &Arc<Self>, conn_id: ConnectionId) -> HeartbeatTick {
        let (connection, expired) = {
            let mut state = self.state.lock();
            let connection = match state.live.as_ref() {
                Some(live) if live.connection.id() == conn_id => Arc::clone(&live.connection),
                _ => return HeartbeatTick::Stop,
            };
            let expired = self.heartbeat.is_expired(&state.heartbeat, Instant::now());
            if !expired {
                self.heartbeat.record_probe(&mut state.heartbeat);
            }
            (connection, expired)
        };

        if expired {
            let err = AppError::heartbeat_timeout(format!(
                "No heartbeat acknowledgement from {} for over {}ms",
                self.endpoint(),
                self.heartbeat.dead_after().as_millis()
            ));
            warn!(endpoint = self.endpoint(), conn_id = %conn_id, error = %err, "Closing dead connection");

            // This task is the heartbeat loop; detach it rather than abort it.
            if let Some(detached) = self.detach(conn_id) {
                connection.close().await;
                self.finish_disconnect(detached.live, DisconnectReason::HeartbeatTimeout);
            }
            return HeartbeatTick::Stop;
        }

        trace!(conn_id = %conn_id, "Sending heartbeat probe");
        if let Err(e) = connection.probe().await {
            debug!(conn_id = %conn_id, error = %e, "Heartbeat probe failed");
        }
        HeartbeatTick::Continue
    }

    /// Removes `conn_id` from the state if it is still the live connection.
    fn detach(&self, conn_id: ConnectionId) -> Option<Detached> {
        let mut state = self.state.lock();
        if !state.is_current(conn_id) {
            return None;
        }

        let heartbeat = self.heartbeat.detach(&mut state.heartbeat);
        if state.phase != ConnectionState::Destroyed {
            state.phase = ConnectionState::Disconnected;
        }
        state.live.take().map(|live| Detached { live, heartbeat })
    }

    /// Transport-reported loss of `conn_id`. Stale ids are ignored.
    fn handle_closed(self: &Arc<Self>, conn_id: ConnectionId, reason: DisconnectReason) {
        let Some(detached) = self.detach(conn_id) else {
            return;
        };
        if let Some(task) = detached.heartbeat {
            task.abort();
        }

        let connection = Arc::clone(&detached.live.connection);
        if connection.ready_state() != ReadyState::Closed {
            tokio::spawn(async move { connection.close().await });
        }

        self.finish_disconnect(detached.live, reason);
    }

    fn finish_disconnect(self: &Arc<Self>, live: LiveConnection, reason: DisconnectReason) {
        let conn_id = live.connection.id();
        self.counters.record_disconnect(reason);
        info!(
            endpoint = self.endpoint(),
            conn_id = %conn_id,
            reason = reason.as_str(),
            "Connection lost"
        );

        self.dispatcher.notify_disconnected(&DisconnectedEvent {
            connection_id: conn_id,
            endpoint: self.config.endpoint.clone(),
            reason,
            disconnected_at: Utc::now(),
        });

        self.schedule_reconnect();
    }

    async fn destroy(&self) {
        let live = {
            let mut state = self.state.lock();
            if state.phase == ConnectionState::Destroyed {
                return;
            }
            state.phase = ConnectionState::Destroyed;
            self.scheduler.cancel(&mut state.reconnect);
            self.heartbeat.stop(&mut state.heartbeat);
            state.in_flight = None;
            state.live.take()
        };

        self.dispatcher.clear_all();

        if let Some(live) = live {
            live.pump.abort();
            live.connection.close().await;
        }

        info!(endpoint = self.endpoint(), "Connection manager destroyed");
    }
}
