use crate::api::SyncApi;
use crate::chat::ChatChannel;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::notifications::NotificationsStore;
use crate::profile::ProfileStore;
use parking_lot::Mutex;
use realtime_link::wire::{message_type, WireMessage};
use realtime_link::{
    ConnectionManager, ConnectionState, Identity, LinkMetrics, TokenProvider, Transport,
    WebSocketTransport,
};
use resource_cache::{CacheMetrics, ResourceCache};
use std::sync::Arc;
use subscriber_registry::Subscription;
use tracing::{debug, info};

/// One signed-in user's sync session.
///
/// Owns the resource caches and the realtime link; nothing is global, so
/// several clients can live side by side (e.g. in tests).
pub struct SyncClient {
    config: SyncConfig,
    identity: Identity,
    link: ConnectionManager,
    notifications: NotificationsStore,
    profile: ProfileStore,
    chat: ChatChannel,
    wiring: Mutex<Vec<Subscription>>,
}

impl SyncClient {
    pub fn new(
        config: SyncConfig,
        user_id: impl Into<String>,
        api: Arc<dyn SyncApi>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let identity = Identity::new(user_id);
        let link = ConnectionManager::new(config.link_config(), transport);

        let notifications = NotificationsStore::new(
            ResourceCache::new("notifications", config.cache_config(config.notifications_ttl)),
            Arc::clone(&api),
            &identity.user_id,
        );
        let profile = ProfileStore::new(
            ResourceCache::new("profile", config.cache_config(config.profile_ttl)),
            api,
            &identity.user_id,
        );
        let chat = ChatChannel::new(link.clone());

        // A new chat message usually comes with a notification server-side.
        let stale = notifications.clone();
        let on_new_message = link.subscribe(message_type::NEW_MESSAGE, move |message: &WireMessage| {
            debug!(conversation_id = ?message.conversation_id, "New message, invalidating notifications");
            stale.invalidate();
        });

        info!(user_id = %identity.user_id, endpoint = %config.ws_url, "Sync client created");

        Self {
            config,
            identity,
            link,
            notifications,
            profile,
            chat,
            wiring: Mutex::new(vec![on_new_message]),
        }
    }

    /// Client backed by the production WebSocket transport
    pub fn with_websocket(config: SyncConfig, user_id: impl Into<String>, api: Arc<dyn SyncApi>) -> Self {
        Self::new(config, user_id, api, Arc::new(WebSocketTransport::new()))
    }

    /// Register every cache and link counter with `registry`
    pub fn register_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
        CacheMetrics::register(registry)?;
        LinkMetrics::register(registry)
    }

    pub async fn connect(&self, tokens: Arc<dyn TokenProvider>) -> SyncResult<()> {
        self.link.connect(self.identity.clone(), tokens).await?;
        Ok(())
    }

    /// Disconnect and drop internal subscriptions. Safe to call more than once.
    pub fn shutdown(&self) {
        let released = {
            let mut wiring = self.wiring.lock();
            let released = wiring.len();
            wiring.clear();
            released
        };
        self.link.disconnect();
        if released > 0 {
            info!(user_id = %self.identity.user_id, "Sync client shut down");
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationsStore {
        &self.notifications
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    pub fn chat(&self) -> &ChatChannel {
        &self.chat
    }

    pub fn link(&self) -> &ConnectionManager {
        &self.link
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn subscribe_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.link.subscribe_state(callback)
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
