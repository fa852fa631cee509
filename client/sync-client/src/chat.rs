use crate::error::{SyncError, SyncResult};
use realtime_link::wire::{message_type, WireMessage};
use realtime_link::{ConnectionManager, TypingEvent};
use subscriber_registry::Subscription;

/// Live chat over the shared realtime link
#[derive(Clone)]
pub struct ChatChannel {
    link: ConnectionManager,
}

impl ChatChannel {
    pub fn new(link: ConnectionManager) -> Self {
        Self { link }
    }

    pub fn send_message(&self, conversation_id: &str, content: &str, recipient_id: Option<&str>) -> SyncResult<()> {
        if content.trim().is_empty() {
            return Err(SyncError::InvalidInput("message content is empty".to_string()));
        }
        self.link
            .send(&WireMessage::send_message(conversation_id, content, recipient_id))?;
        Ok(())
    }

    pub fn mark_read(&self, conversation_id: &str, message_id: &str) -> SyncResult<()> {
        self.link.send(&WireMessage::mark_read(conversation_id, message_id))?;
        Ok(())
    }

    pub fn set_typing(&self, conversation_id: &str, is_typing: bool) -> SyncResult<()> {
        self.link.send(&WireMessage::typing(conversation_id, is_typing))?;
        Ok(())
    }

    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        self.link.typing_users(conversation_id)
    }

    /// New messages in one conversation
    pub fn subscribe_messages<F>(&self, conversation_id: &str, callback: F) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.link
            .subscribe_scoped(message_type::NEW_MESSAGE, conversation_id, callback)
    }

    /// Read receipts in one conversation
    pub fn subscribe_read_receipts<F>(&self, conversation_id: &str, callback: F) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.link
            .subscribe_scoped(message_type::MESSAGE_READ, conversation_id, callback)
    }

    pub fn subscribe_typing<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.link.typing().subscribe(callback)
    }
}
