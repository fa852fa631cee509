use crate::api::SyncApi;
use crate::error::SyncResult;
use crate::models::{self, Notification};
use resource_cache::{CacheEntry, Resource, ResourceCache};
use std::sync::Arc;
use subscriber_registry::Subscription;
use tracing::debug;

/// The signed-in user's notification list, shared by every consumer
#[derive(Clone)]
pub struct NotificationsStore {
    resource: Resource<Vec<Notification>>,
    api: Arc<dyn SyncApi>,
    user_id: String,
}

impl NotificationsStore {
    pub fn new(
        cache: ResourceCache<Vec<Notification>>,
        api: Arc<dyn SyncApi>,
        user_id: &str,
    ) -> Self {
        let fetch_api = Arc::clone(&api);
        let fetch_user = user_id.to_string();
        let resource = Resource::with_default_ttl(cache, format!("notifications:{user_id}"), move || {
            let api = Arc::clone(&fetch_api);
            let user_id = fetch_user.clone();
            async move { api.list_notifications(&user_id).await }
        });

        Self {
            resource,
            api,
            user_id: user_id.to_string(),
        }
    }

    pub async fn list(&self) -> SyncResult<Arc<Vec<Notification>>> {
        Ok(self.resource.get().await?)
    }

    pub async fn refresh(&self) -> SyncResult<Arc<Vec<Notification>>> {
        Ok(self.resource.refresh().await?)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<Vec<Notification>>) + Send + Sync + 'static,
    {
        self.resource.subscribe(callback)
    }

    pub fn entry(&self) -> CacheEntry<Vec<Notification>> {
        self.resource.entry()
    }

    /// Unread notifications in the cached list (0 before the first load)
    pub fn unread_count(&self) -> usize {
        self.entry()
            .data
            .as_deref()
            .map(|list| models::unread_count(list))
            .unwrap_or(0)
    }

    /// Force the next read to refetch
    pub fn invalidate(&self) {
        debug!(user_id = %self.user_id, "Notifications invalidated");
        self.resource.invalidate();
    }

    pub async fn mark_read(&self, notification_id: &str) -> SyncResult<()> {
        self.resource
            .optimistic_update(
                |list| models::mark_read(list, notification_id),
                self.api.mark_notification_read(&self.user_id, notification_id),
            )
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> SyncResult<()> {
        self.resource
            .optimistic_update(
                |list| models::mark_all_read(list),
                self.api.mark_all_notifications_read(&self.user_id),
            )
            .await?;
        Ok(())
    }
}
