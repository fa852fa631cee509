//! Client realtime sync layer
//!
//! Keeps every consumer of notifications, profile and live chat state in
//! agreement while keeping network traffic down:
//!
//! - reads go through single-flight TTL caches ([`NotificationsStore`],
//!   [`ProfileStore`]) so concurrent consumers share one fetch
//! - mutations are applied optimistically and reconciled with the server on
//!   failure
//! - one realtime link per client carries chat traffic, typing indicators and
//!   freshness hints (a new message invalidates the notification list)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sync_client::{SyncApi, SyncClient, SyncConfig};
//! use realtime_link::StaticTokenProvider;
//!
//! # async fn run(api: Arc<dyn SyncApi>) -> Result<(), sync_client::SyncError> {
//! sync_client::logging::init_tracing();
//!
//! let client = SyncClient::with_websocket(SyncConfig::from_env()?, "user-1", api);
//! client.connect(Arc::new(StaticTokenProvider::new("token"))).await?;
//!
//! let _badge = client.notifications().subscribe(|entry| {
//!     println!("loading={} unread data={:?}", entry.is_loading, entry.data.is_some());
//! });
//! client.notifications().list().await?;
//! client.chat().send_message("conversation-1", "hello", None)?;
//!
//! client.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod profile;

pub use api::SyncApi;
pub use chat::ChatChannel;
pub use client::SyncClient;
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use models::{Notification, Profile, ProfilePatch};
pub use notifications::NotificationsStore;
pub use profile::ProfileStore;
