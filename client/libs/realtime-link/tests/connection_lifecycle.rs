/// Connection state machine tests against a scripted in-memory transport
use async_trait::async_trait;
use parking_lot::Mutex;
use realtime_link::wire::{message_type, WireMessage};
use realtime_link::{
    ConnectionManager, ConnectionPhase, ConnectionState, Identity, LinkConfig, LinkError,
    LinkResult, OutboundFrame, StaticTokenProvider, TokenError, TokenProvider, Transport,
    TransportChannel, TransportEvent,
};
use resilience::BackoffPolicy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Far end of an accepted connection
struct Peer {
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
}

/// Transport whose `open` outcomes are scripted; once the script is used up
/// every further open is accepted.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<bool>>,
    opens: AtomicU32,
    peers: Mutex<Vec<Peer>>,
}

impl ScriptedTransport {
    fn failing_then_accepting(failures: usize) -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().extend(std::iter::repeat(false).take(failures));
        Arc::new(transport)
    }

    fn always_failing() -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().extend(std::iter::repeat(false).take(1000));
        Arc::new(transport)
    }

    fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    fn take_peer(&self) -> Peer {
        self.peers.lock().remove(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _endpoint: &str, _identity: &Identity, token: &str) -> LinkResult<TransportChannel> {
        assert_eq!(token, "secret");
        self.opens.fetch_add(1, Ordering::SeqCst);

        let accept = self.script.lock().pop_front().unwrap_or(true);
        if !accept {
            return Err(LinkError::Network("connection refused".to_string()));
        }

        let (channel, events, frames) = TransportChannel::pair();
        self.peers.lock().push(Peer { events, frames });
        Ok(channel)
    }
}

struct RejectingTokens;

#[async_trait]
impl TokenProvider for RejectingTokens {
    async fn token(&self) -> Result<String, TokenError> {
        Err(TokenError::Unavailable("session expired".to_string()))
    }
}

fn config() -> LinkConfig {
    LinkConfig {
        backoff: BackoffPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: false,
            max_attempts: Some(10),
        },
        ..LinkConfig::new("ws://test/ws")
    }
}

fn token() -> Arc<dyn TokenProvider> {
    Arc::new(StaticTokenProvider::new("secret"))
}

fn record_states(link: &ConnectionManager) -> (Arc<Mutex<Vec<ConnectionState>>>, subscriber_registry::Subscription) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let states = states.clone();
        link.subscribe_state(move |state| states.lock().push(state.clone()))
    };
    (states, sub)
}

// ==================== Reconnect schedule ====================

#[tokio::test(start_paused = true)]
async fn test_three_failures_then_success_resets_attempts() {
    let transport = ScriptedTransport::failing_then_accepting(3);
    let link = ConnectionManager::new(config(), transport.clone());
    let (states, _sub) = record_states(&link);

    let result = link.connect(Identity::new("u1"), token()).await;
    assert!(matches!(result, Err(LinkError::Network(_))));
    assert_eq!(link.state().reconnect_attempts, 1);
    assert_eq!(transport.opens(), 1);

    // First retry after 1s
    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(transport.opens(), 1);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.opens(), 2);
    assert_eq!(link.state().reconnect_attempts, 2);

    // Second retry 2s later
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(transport.opens(), 3);
    assert_eq!(link.state().reconnect_attempts, 3);

    // Third retry 4s later succeeds
    tokio::time::sleep(Duration::from_millis(3998)).await;
    assert_eq!(link.phase(), ConnectionPhase::Reconnecting);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.opens(), 4);

    let state = link.state();
    assert_eq!(state.phase, ConnectionPhase::Connected);
    assert_eq!(state.reconnect_attempts, 0);
    assert!(state.error.is_none());
    assert!(state.last_connected_at.is_some());

    let reconnecting: Vec<u32> = states
        .lock()
        .iter()
        .filter(|s| s.phase == ConnectionPhase::Reconnecting)
        .map(|s| s.reconnect_attempts)
        .collect();
    assert_eq!(reconnecting, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_reconnects() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());

    link.connect(Identity::new("u1"), token()).await.unwrap();
    assert_eq!(link.phase(), ConnectionPhase::Connected);

    let peer = transport.take_peer();
    peer.events
        .send(TransportEvent::Closed {
            code: Some(1006),
            reason: "abnormal closure".to_string(),
        })
        .unwrap();
    tokio::task::yield_now().await;

    let state = link.state();
    assert_eq!(state.phase, ConnectionPhase::Reconnecting);
    assert_eq!(state.reconnect_attempts, 1);
    assert_eq!(
        state.error.as_deref(),
        Some("connection closed (1006): abnormal closure")
    );

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(link.phase(), ConnectionPhase::Connected);
    assert_eq!(transport.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_budget_exhaustion_disconnects() {
    let transport = ScriptedTransport::always_failing();
    let mut config = config();
    config.backoff.max_attempts = Some(2);
    let link = ConnectionManager::new(config, transport.clone());

    let _ = link.connect(Identity::new("u1"), token()).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(transport.opens(), 3);
    let state = link.state();
    assert_eq!(state.phase, ConnectionPhase::Disconnected);
    assert!(state
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("reconnect attempts exhausted")));
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_exhaustion_gets_full_retry_budget() {
    let transport = ScriptedTransport::always_failing();
    let mut config = config();
    config.backoff.max_attempts = Some(2);
    let link = ConnectionManager::new(config, transport.clone());

    let _ = link.connect(Identity::new("u1"), token()).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(link.phase(), ConnectionPhase::Disconnected);
    assert_eq!(link.state().reconnect_attempts, 2);

    let result = link.connect(Identity::new("u1"), token()).await;
    assert!(matches!(result, Err(LinkError::Network(_))));

    let state = link.state();
    assert_eq!(state.phase, ConnectionPhase::Reconnecting);
    assert_eq!(state.reconnect_attempts, 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.opens(), 6);
    assert_eq!(link.phase(), ConnectionPhase::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_scheduled_retry() {
    let transport = ScriptedTransport::always_failing();
    let link = ConnectionManager::new(config(), transport.clone());

    let _ = link.connect(Identity::new("u1"), token()).await;
    assert_eq!(link.phase(), ConnectionPhase::Reconnecting);

    link.disconnect();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.opens(), 1);
    assert_eq!(link.state(), ConnectionState::default());
}

// ==================== Auth ====================

#[tokio::test(start_paused = true)]
async fn test_token_failure_is_terminal() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());
    let (states, _sub) = record_states(&link);

    let result = link.connect(Identity::new("u1"), Arc::new(RejectingTokens)).await;
    assert!(matches!(result, Err(LinkError::Auth(_))));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.opens(), 0);

    let state = link.state();
    assert_eq!(state.phase, ConnectionPhase::Disconnected);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("session expired")));

    let phases: Vec<ConnectionPhase> = states.lock().iter().map(|s| s.phase).collect();
    assert_eq!(
        phases,
        vec![
            ConnectionPhase::Disconnected,
            ConnectionPhase::Connecting,
            ConnectionPhase::Disconnected,
        ]
    );
}

// ==================== Send ====================

#[tokio::test]
async fn test_send_while_disconnected_does_no_io() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());

    let result = link.send(&WireMessage::send_message("c1", "hello", None));
    assert!(matches!(
        result,
        Err(LinkError::State {
            operation: "send",
            phase: ConnectionPhase::Disconnected
        })
    ));
    assert_eq!(transport.opens(), 0);
}

#[tokio::test]
async fn test_send_while_connected_reaches_transport() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());
    link.connect(Identity::new("u1"), token()).await.unwrap();

    link.send(&WireMessage::mark_read("c1", "m1")).unwrap();

    let mut peer = transport.take_peer();
    match peer.frames.recv().await {
        Some(OutboundFrame::Text(json)) => {
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["type"], "MARK_READ");
            assert_eq!(value["data"]["messageId"], "m1");
        }
        other => panic!("expected text frame, got {other:?}"),
    }

    link.disconnect();
    assert_eq!(peer.frames.recv().await, Some(OutboundFrame::Close));
    assert!(link.send(&WireMessage::typing("c1", false)).is_err());
}

#[tokio::test]
async fn test_connect_is_noop_while_connected() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());

    link.connect(Identity::new("u1"), token()).await.unwrap();
    link.connect(Identity::new("u1"), token()).await.unwrap();

    assert_eq!(transport.opens(), 1);
}

// ==================== Inbound ====================

#[tokio::test]
async fn test_inbound_frames_are_routed_and_typing_tracked() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());
    link.connect(Identity::new("u1"), token()).await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let received = received.clone();
        link.subscribe_scoped(message_type::NEW_MESSAGE, "c1", move |message: &WireMessage| {
            received.lock().push(message.clone());
        })
    };

    let peer = transport.take_peer();
    for raw in [
        "garbage",
        r#"{"type":"NEW_MESSAGE","conversationId":"c2","data":{"content":"elsewhere"}}"#,
        r#"{"type":"USER_TYPING","conversationId":"c1","senderId":"u2","data":{"isTyping":true}}"#,
        r#"{"type":"NEW_MESSAGE","conversationId":"c1","senderId":"u2","data":{"content":"hi"}}"#,
    ] {
        peer.events.send(TransportEvent::Message(raw.to_string())).unwrap();
    }
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert_eq!(link.phase(), ConnectionPhase::Connected);
    assert_eq!(link.typing_users("c1"), vec!["u2".to_string()]);
    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].data.as_ref().unwrap()["content"], "hi");
}

#[tokio::test]
async fn test_events_from_previous_session_are_ignored() {
    let transport = ScriptedTransport::failing_then_accepting(0);
    let link = ConnectionManager::new(config(), transport.clone());

    link.connect(Identity::new("u1"), token()).await.unwrap();
    let old_peer = transport.take_peer();
    link.disconnect();
    link.connect(Identity::new("u1"), token()).await.unwrap();

    let _ = old_peer.events.send(TransportEvent::Error("stale socket reset".to_string()));
    tokio::task::yield_now().await;

    let state = link.state();
    assert_eq!(state.phase, ConnectionPhase::Connected);
    assert!(state.error.is_none());
}
