use crate::models::{Notification, Profile, ProfilePatch};
use async_trait::async_trait;

/// REST endpoints the sync layer reads from and mutates through.
///
/// Implementations own transport, auth headers and status mapping; any error
/// they return is surfaced as a fetch or mutation failure.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn list_notifications(&self, user_id: &str) -> anyhow::Result<Vec<Notification>>;

    async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> anyhow::Result<()>;

    async fn mark_all_notifications_read(&self, user_id: &str) -> anyhow::Result<()>;

    async fn fetch_profile(&self, user_id: &str) -> anyhow::Result<Profile>;

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> anyhow::Result<Profile>;
}
