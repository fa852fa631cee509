//! Realtime connection lifecycle
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Connected
//!      ▲                        │                    │
//!      │ token failure          │ open failure       │ close / error
//!      ├────────────────────────┘                    ▼
//!      │                    Connecting ◀──backoff── Reconnecting
//!      └──────────── disconnect / attempts exhausted ─┘
//! ```
//!
//! Each `connect`/`disconnect` starts a new session generation. Reader and
//! retry tasks carry the generation they were spawned for and go quiet once
//! it is no longer current, so events from a torn-down transport never touch
//! the state of a newer one.

use crate::error::{LinkError, LinkResult};
use crate::metrics::LinkMetrics;
use crate::router::{MessageFilter, MessageRouter};
use crate::state::{ConnectionPhase, ConnectionState};
use crate::token::TokenProvider;
use crate::transport::{Identity, OutboundFrame, Transport, TransportChannel, TransportEvent};
use crate::typing::{TypingTracker, DEFAULT_TYPING_TTL};
use crate::wire::{message_type, WireMessage};
use chrono::Utc;
use parking_lot::Mutex;
use resilience::{with_timeout, with_timeout_result, BackoffPolicy, TimeoutError};
use std::sync::{Arc, Weak};
use std::time::Duration;
use subscriber_registry::{Registry, Subscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket endpoint, e.g. `wss://api.example.com/ws`
    pub endpoint: String,
    pub token_timeout: Duration,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// How long a typing signal stays valid without renewal
    pub typing_ttl: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/ws".to_string(),
            token_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            backoff: BackoffPolicy::default(),
            typing_ttl: DEFAULT_TYPING_TTL,
        }
    }
}

impl LinkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
struct Target {
    identity: Identity,
    provider: Arc<dyn TokenProvider>,
}

#[derive(Default)]
struct Session {
    generation: u64,
    target: Option<Target>,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    reader: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

// Lock order: `session` before `state`. Listeners are notified with neither held.
struct Inner {
    config: LinkConfig,
    transport: Arc<dyn Transport>,
    session: Mutex<Session>,
    state: Mutex<ConnectionState>,
    state_listeners: Registry<ConnectionState>,
    router: MessageRouter,
    typing: TypingTracker,
    metrics: LinkMetrics,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if let Some(retry) = session.retry.take() {
            retry.abort();
        }
        if let Some(reader) = session.reader.take() {
            reader.abort();
        }
        if let Some(outbound) = session.outbound.take() {
            let _ = outbound.send(OutboundFrame::Close);
        }
    }
}

/// Owns the realtime connection: state machine, reconnect schedule, outbound
/// sends and inbound routing. Cloning yields another handle to the same link.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: LinkConfig, transport: Arc<dyn Transport>) -> Self {
        let typing = TypingTracker::new(config.typing_ttl);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                session: Mutex::new(Session::default()),
                state: Mutex::new(ConnectionState::default()),
                state_listeners: Registry::new(),
                router: MessageRouter::new(),
                typing,
                metrics: LinkMetrics::new(),
            }),
        }
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.state.lock().phase
    }

    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.inner.typing
    }

    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        self.inner.typing.typing_users(conversation_id)
    }

    /// Open the link for `identity`.
    ///
    /// No-op while already connecting or connected. A token failure is
    /// returned as [`LinkError::Auth`] and leaves the link disconnected. A
    /// transport failure is returned as [`LinkError::Network`] while retries
    /// continue in the background.
    pub async fn connect(&self, identity: Identity, provider: Arc<dyn TokenProvider>) -> LinkResult<()> {
        let generation = {
            let mut session = self.inner.session.lock();
            {
                let mut state = self.inner.state.lock();
                if matches!(state.phase, ConnectionPhase::Connecting | ConnectionPhase::Connected) {
                    debug!(phase = %state.phase, "Connect ignored, link already active");
                    return Ok(());
                }
                // Each explicit connect gets the full retry budget. Published
                // together with the Connecting transition in `attempt`.
                state.reconnect_attempts = 0;
            }

            if let Some(retry) = session.retry.take() {
                retry.abort();
            }
            session.generation += 1;
            session.target = Some(Target { identity, provider });
            session.generation
        };

        self.attempt(generation).await
    }

    /// Close the link and cancel any scheduled reconnect. Terminal until the
    /// next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let (outbound, reader, retry, changed) = {
            let mut session = self.inner.session.lock();
            session.generation += 1;
            session.target = None;
            let changed = self.update_state(|state| {
                state.phase = ConnectionPhase::Disconnected;
                state.reconnect_attempts = 0;
                state.error = None;
            });
            (
                session.outbound.take(),
                session.reader.take(),
                session.retry.take(),
                changed,
            )
        };

        if let Some(retry) = retry {
            retry.abort();
        }
        if let Some(reader) = reader {
            reader.abort();
        }
        if let Some(outbound) = outbound {
            let _ = outbound.send(OutboundFrame::Close);
        }
        self.inner.typing.clear();

        if changed.is_some() {
            info!("Realtime link disconnected");
        }
        self.publish(changed);
    }

    /// Queue one frame. Only valid while connected; otherwise fails with
    /// [`LinkError::State`] without touching the transport.
    pub fn send(&self, message: &WireMessage) -> LinkResult<()> {
        {
            let session = self.inner.session.lock();
            let phase = self.inner.state.lock().phase;
            let outbound = match (&session.outbound, phase) {
                (Some(outbound), ConnectionPhase::Connected) => outbound,
                _ => {
                    return Err(LinkError::State {
                        operation: "send",
                        phase,
                    })
                }
            };

            let frame = message.to_json()?;
            outbound
                .send(OutboundFrame::Text(frame))
                .map_err(|_| LinkError::Network("transport writer closed".to_string()))?;
        }

        self.inner.metrics.record_frame_sent();
        debug!(kind = %message.kind, conversation_id = ?message.conversation_id, "Frame sent");
        Ok(())
    }

    /// Observe connection state. The callback fires immediately with the
    /// current state, then on every change.
    pub fn subscribe_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        let current = self.state();
        callback(&current);
        self.inner.state_listeners.subscribe(callback)
    }

    pub fn subscribe<F>(&self, filter: impl Into<MessageFilter>, callback: F) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.inner.router.subscribe(filter, callback)
    }

    pub fn subscribe_scoped<F>(
        &self,
        filter: impl Into<MessageFilter>,
        conversation_id: impl Into<String>,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.inner.router.subscribe_scoped(filter, conversation_id, callback)
    }

    // ==================== Connect path ====================

    async fn attempt(&self, generation: u64) -> LinkResult<()> {
        let (target, changed) = {
            let session = self.inner.session.lock();
            let phase = self.inner.state.lock().phase;
            if session.generation != generation {
                return Err(LinkError::State {
                    operation: "connect",
                    phase,
                });
            }
            let Some(target) = session.target.clone() else {
                return Err(LinkError::State {
                    operation: "connect",
                    phase,
                });
            };
            let changed = self.update_state(|state| state.phase = ConnectionPhase::Connecting);
            (target, changed)
        };
        self.publish(changed);
        info!(user_id = %target.identity.user_id, endpoint = %self.inner.config.endpoint, "Connecting realtime link");

        let token = match with_timeout_result(self.inner.config.token_timeout, target.provider.token()).await {
            Ok(token) => token,
            Err(e) => {
                let err = LinkError::Auth(match e {
                    TimeoutError::Elapsed(after) => format!("token acquisition timed out after {after:?}"),
                    TimeoutError::OperationFailed(message) => message,
                });
                self.inner.metrics.record_auth_failure();
                warn!(error = %err, "Token acquisition failed, not retrying");
                self.fail(generation, &err);
                return Err(err);
            }
        };

        let opened = with_timeout(
            self.inner.config.connect_timeout,
            self.inner
                .transport
                .open(&self.inner.config.endpoint, &target.identity, &token),
        )
        .await;

        let channel = match opened {
            Ok(Ok(channel)) => channel,
            Ok(Err(err)) => {
                if err.is_retryable() {
                    warn!(error = %err, "Transport open failed");
                    self.connection_lost(generation, err.to_string());
                } else {
                    warn!(error = %err, "Transport rejected connection, not retrying");
                    self.fail(generation, &err);
                }
                return Err(err);
            }
            Err(e) => {
                let err = LinkError::Network(e.to_string());
                warn!(error = %err, "Transport open timed out");
                self.connection_lost(generation, err.to_string());
                return Err(err);
            }
        };

        self.on_open(generation, channel)
    }

    fn on_open(&self, generation: u64, channel: TransportChannel) -> LinkResult<()> {
        let TransportChannel {
            outbound,
            mut inbound,
        } = channel;

        let changed = {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                // Disconnected (or reconnected) while the handshake was in flight.
                let _ = outbound.send(OutboundFrame::Close);
                return Err(LinkError::State {
                    operation: "connect",
                    phase: self.inner.state.lock().phase,
                });
            }

            let manager = Arc::downgrade(&self.inner);
            session.outbound = Some(outbound);
            session.retry = None;
            session.reader = Some(tokio::spawn(async move {
                let reason = loop {
                    match inbound.recv().await {
                        Some(TransportEvent::Message(raw)) => match Self::from_weak(&manager) {
                            Some(link) => link.handle_frame(&raw),
                            None => return,
                        },
                        Some(TransportEvent::Closed { code: Some(code), reason }) => {
                            break format!("connection closed ({code}): {reason}")
                        }
                        Some(TransportEvent::Closed { code: None, reason }) => {
                            break format!("connection closed: {reason}")
                        }
                        Some(TransportEvent::Error(e)) => break e,
                        None => break "transport channel dropped".to_string(),
                    }
                };
                if let Some(link) = Self::from_weak(&manager) {
                    link.connection_lost(generation, reason);
                }
            }));

            self.update_state(|state| {
                state.phase = ConnectionPhase::Connected;
                state.last_connected_at = Some(Utc::now());
                state.reconnect_attempts = 0;
                state.error = None;
            })
        };

        self.inner.metrics.record_connect();
        info!(endpoint = %self.inner.config.endpoint, "Realtime link connected");
        self.publish(changed);
        Ok(())
    }

    async fn retry(&self, generation: u64) {
        if let Err(e) = self.attempt(generation).await {
            debug!(error = %e, "Reconnect attempt failed");
        }
    }

    // ==================== Failure handling ====================

    /// Unexpected loss: count the attempt and schedule the next one, or give
    /// up once the backoff budget is spent.
    fn connection_lost(&self, generation: u64, reason: String) {
        let policy = &self.inner.config.backoff;

        let changed = {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                debug!(reason = %reason, "Ignoring event from a previous session");
                return;
            }
            session.outbound = None;
            session.reader = None;

            let attempts = self.inner.state.lock().reconnect_attempts + 1;
            if policy.should_retry(attempts) {
                let delay = policy.delay_for(attempts);
                let manager = Arc::downgrade(&self.inner);
                session.retry = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(link) = Self::from_weak(&manager) {
                        link.retry(generation).await;
                    }
                }));

                self.inner.metrics.record_reconnect_attempt();
                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Realtime link lost, scheduling reconnect"
                );
                self.update_state(|state| {
                    state.phase = ConnectionPhase::Reconnecting;
                    state.reconnect_attempts = attempts;
                    state.error = Some(reason);
                })
            } else {
                session.target = None;
                session.retry = None;
                warn!(attempts = attempts - 1, reason = %reason, "Reconnect attempts exhausted");
                self.update_state(|state| {
                    state.phase = ConnectionPhase::Disconnected;
                    state.error = Some(format!("reconnect attempts exhausted: {reason}"));
                })
            }
        };

        self.publish(changed);
    }

    /// Non-retryable failure: straight to Disconnected with the error recorded
    fn fail(&self, generation: u64, err: &LinkError) {
        let changed = {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                return;
            }
            session.target = None;
            session.retry = None;
            self.update_state(|state| {
                state.phase = ConnectionPhase::Disconnected;
                state.error = Some(err.to_string());
            })
        };
        self.publish(changed);
    }

    // ==================== Inbound ====================

    fn handle_frame(&self, raw: &str) {
        let message = match WireMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                self.inner.metrics.record_frame_dropped("malformed");
                return;
            }
        };

        if message.is_type(message_type::USER_TYPING) {
            if let Err(e) = self.inner.typing.observe(&message) {
                warn!(error = %e, "Dropping invalid typing frame");
                self.inner.metrics.record_frame_dropped("typing");
                return;
            }
        }

        self.inner.metrics.record_frame_received();
        let routes = self.inner.router.dispatch(&message);
        debug!(kind = %message.kind, routes, "Routed inbound frame");
    }

    // ==================== State ====================

    /// Mutate the state; returns the new snapshot if anything changed
    fn update_state(&self, apply: impl FnOnce(&mut ConnectionState)) -> Option<ConnectionState> {
        let mut state = self.inner.state.lock();
        let before = state.clone();
        apply(&mut state);
        (*state != before).then(|| state.clone())
    }

    fn publish(&self, changed: Option<ConnectionState>) {
        if let Some(state) = changed {
            debug!(phase = %state.phase, attempts = state.reconnect_attempts, "Connection state changed");
            self.inner.state_listeners.notify_all(&state);
        }
    }
}
