//! Realtime link for the sync client
//!
//! One bidirectional connection per client, shared by every consumer:
//!
//! - [`ConnectionManager`]: connection state machine with exponential-backoff
//!   reconnects, outbound sends and inbound routing
//! - [`MessageRouter`]: wildcard and per-type subscriptions, optionally scoped
//!   to one conversation
//! - [`TypingTracker`]: who is typing in which conversation, with expiry
//! - [`TokenProvider`] / [`Transport`]: the two seams to the outside world,
//!   with [`WebSocketTransport`] as the production transport
//!
//! # Example
//!
//! ```rust,no_run
//! use realtime_link::{ConnectionManager, Identity, LinkConfig, StaticTokenProvider, WebSocketTransport};
//! use realtime_link::wire::{message_type, WireMessage};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), realtime_link::LinkError> {
//! let link = ConnectionManager::new(
//!     LinkConfig::new("wss://api.example.com/ws"),
//!     Arc::new(WebSocketTransport::new()),
//! );
//!
//! let _messages = link.subscribe(message_type::NEW_MESSAGE, |message| {
//!     println!("new message in {:?}", message.conversation_id);
//! });
//!
//! link.connect(Identity::new("user-1"), Arc::new(StaticTokenProvider::new("token")))
//!     .await?;
//! link.send(&WireMessage::send_message("conversation-1", "hello", None))?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod metrics;
pub mod router;
pub mod state;
pub mod token;
pub mod transport;
pub mod typing;
pub mod wire;

pub use connection::{ConnectionManager, LinkConfig};
pub use error::{ErrorKind, LinkError, LinkResult};
pub use metrics::LinkMetrics;
pub use router::{MessageFilter, MessageRouter};
pub use state::{ConnectionPhase, ConnectionState};
pub use token::{FallbackTokenProvider, StaticTokenProvider, TokenError, TokenProvider};
pub use transport::{
    Identity, OutboundFrame, Transport, TransportChannel, TransportEvent, WebSocketTransport,
};
pub use typing::{TypingEvent, TypingTracker, DEFAULT_TYPING_TTL};
pub use wire::{ChatMessagePayload, WireMessage};
