//! Per-conversation typing indicators with automatic expiry

use crate::error::{LinkError, LinkResult};
use crate::wire::WireMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use subscriber_registry::{Registry, Subscription};
use tokio::task::JoinHandle;
use tracing::trace;

/// Default time a typing signal stays valid without renewal
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_millis(3000);

/// Current typing set of one conversation, published on every change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub conversation_id: String,
    /// Sorted user ids
    pub users: Vec<String>,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct TypingInner {
    ttl: Duration,
    conversations: Mutex<HashMap<String, HashMap<String, Timer>>>,
    listeners: Registry<TypingEvent>,
    next_generation: AtomicU64,
}

impl TypingInner {
    fn snapshot(
        conversations: &HashMap<String, HashMap<String, Timer>>,
        conversation_id: &str,
    ) -> TypingEvent {
        let mut users: Vec<String> = conversations
            .get(conversation_id)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        TypingEvent {
            conversation_id: conversation_id.to_string(),
            users,
        }
    }

    fn expire(&self, conversation_id: &str, user_id: &str, generation: u64) {
        let event = {
            let mut guard = self.conversations.lock();
            let Some(users) = guard.get_mut(conversation_id) else {
                return;
            };
            // A renewal after this timer fired owns the slot now.
            if users.get(user_id).map(|t| t.generation) != Some(generation) {
                return;
            }
            users.remove(user_id);
            if users.is_empty() {
                guard.remove(conversation_id);
            }
            Self::snapshot(&guard, conversation_id)
        };

        trace!(conversation_id, user_id, "Typing indicator expired");
        self.listeners.notify_all(&event);
    }
}

/// Tracks who is typing where.
///
/// Each `(conversation, user)` pair owns one expiry task; renewing a signal
/// aborts the old task and schedules a new one.
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<TypingInner>,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(TypingInner {
                ttl,
                conversations: Mutex::new(HashMap::new()),
                listeners: Registry::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Apply a `USER_TYPING` frame
    pub fn observe(&self, message: &WireMessage) -> LinkResult<()> {
        let conversation_id = message
            .conversation_id
            .as_deref()
            .ok_or_else(|| LinkError::Protocol("typing frame without conversationId".to_string()))?;
        let user_id = message
            .sender_id
            .as_deref()
            .ok_or_else(|| LinkError::Protocol("typing frame without senderId".to_string()))?;
        let is_typing = message
            .typing_flag()
            .ok_or_else(|| LinkError::Protocol("typing frame without data.isTyping".to_string()))?;

        if is_typing {
            self.start_typing(conversation_id, user_id);
        } else {
            self.stop_typing(conversation_id, user_id);
        }
        Ok(())
    }

    /// Mark `user_id` as typing and (re)start its expiry timer
    pub fn start_typing(&self, conversation_id: &str, user_id: &str) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = self.schedule_expiry(conversation_id, user_id, generation);

        let event = {
            let mut guard = self.inner.conversations.lock();
            let previous = guard
                .entry(conversation_id.to_string())
                .or_default()
                .insert(user_id.to_string(), Timer { generation, handle });

            match previous {
                Some(timer) => {
                    timer.handle.abort();
                    None
                }
                None => Some(TypingInner::snapshot(&guard, conversation_id)),
            }
        };

        if let Some(event) = event {
            self.inner.listeners.notify_all(&event);
        }
    }

    /// Remove `user_id` immediately
    pub fn stop_typing(&self, conversation_id: &str, user_id: &str) {
        let event = {
            let mut guard = self.inner.conversations.lock();
            let Some(users) = guard.get_mut(conversation_id) else {
                return;
            };
            let Some(timer) = users.remove(user_id) else {
                return;
            };
            timer.handle.abort();
            if users.is_empty() {
                guard.remove(conversation_id);
            }
            TypingInner::snapshot(&guard, conversation_id)
        };

        self.inner.listeners.notify_all(&event);
    }

    fn schedule_expiry(&self, conversation_id: &str, user_id: &str, generation: u64) -> JoinHandle<()> {
        let tracker: Weak<TypingInner> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = tracker.upgrade() {
                inner.expire(&conversation_id, &user_id, generation);
            }
        })
    }

    /// Sorted ids of users currently typing in `conversation_id`
    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        TypingInner::snapshot(&self.inner.conversations.lock(), conversation_id).users
    }

    pub fn is_typing(&self, conversation_id: &str, user_id: &str) -> bool {
        self.inner
            .conversations
            .lock()
            .get(conversation_id)
            .is_some_and(|users| users.contains_key(user_id))
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    /// Drop every indicator and cancel every timer
    pub fn clear(&self) {
        let cleared: Vec<String> = {
            let mut guard = self.inner.conversations.lock();
            guard
                .drain()
                .map(|(conversation_id, users)| {
                    for timer in users.into_values() {
                        timer.handle.abort();
                    }
                    conversation_id
                })
                .collect()
        };

        for conversation_id in cleared {
            self.inner.listeners.notify_all(&TypingEvent {
                conversation_id,
                users: Vec::new(),
            });
        }
    }
}

impl Drop for TypingInner {
    fn drop(&mut self) {
        for users in self.conversations.get_mut().values() {
            for timer in users.values() {
                timer.handle.abort();
            }
        }
    }
}
