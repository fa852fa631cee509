use crate::api::SyncApi;
use crate::error::SyncResult;
use crate::models::{Profile, ProfilePatch};
use resource_cache::{CacheEntry, Resource, ResourceCache};
use std::sync::Arc;
use subscriber_registry::Subscription;
use tracing::info;

/// The signed-in user's (or business's) profile
#[derive(Clone)]
pub struct ProfileStore {
    resource: Resource<Profile>,
    api: Arc<dyn SyncApi>,
    user_id: String,
}

impl ProfileStore {
    pub fn new(cache: ResourceCache<Profile>, api: Arc<dyn SyncApi>, user_id: &str) -> Self {
        let fetch_api = Arc::clone(&api);
        let fetch_user = user_id.to_string();
        let resource = Resource::with_default_ttl(cache, format!("profile:{user_id}"), move || {
            let api = Arc::clone(&fetch_api);
            let user_id = fetch_user.clone();
            async move { api.fetch_profile(&user_id).await }
        });

        Self {
            resource,
            api,
            user_id: user_id.to_string(),
        }
    }

    pub async fn get(&self) -> SyncResult<Arc<Profile>> {
        Ok(self.resource.get().await?)
    }

    pub async fn refresh(&self) -> SyncResult<Arc<Profile>> {
        Ok(self.resource.refresh().await?)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<Profile>) + Send + Sync + 'static,
    {
        self.resource.subscribe(callback)
    }

    pub fn entry(&self) -> CacheEntry<Profile> {
        self.resource.entry()
    }

    /// Apply `patch` locally right away, then persist it. The server's copy
    /// replaces the local one on success; on failure the profile is refetched.
    pub async fn update(&self, patch: ProfilePatch) -> SyncResult<Profile> {
        if patch.is_empty() {
            return Ok(self.get().await?.as_ref().clone());
        }

        let saved = self
            .resource
            .optimistic_update(
                |profile| patch.apply(profile),
                self.api.update_profile(&self.user_id, &patch),
            )
            .await?;

        self.resource.set(saved.clone());
        info!(user_id = %self.user_id, "Profile updated");
        Ok(saved)
    }
}
