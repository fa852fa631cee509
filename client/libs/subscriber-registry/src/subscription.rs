use crate::{Detach, SubscriberId};
use std::sync::Weak;

/// Handle returned by every `subscribe` call.
///
/// Dropping the handle unsubscribes. Unsubscribing only detaches the callback;
/// it never cancels work that other subscribers are still waiting on.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, registry: Weak<dyn Detach>) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the callback is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.is_registered(self.id))
            .unwrap_or(false)
    }

    /// Remove the callback from its registry
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
