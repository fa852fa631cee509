use crate::error::LinkResult;
use crate::wire::{message_type, WireMessage};
use subscriber_registry::{KeyedRegistry, Subscription};

/// Which frames a route receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    Type(String),
}

impl MessageFilter {
    fn route_key(&self) -> String {
        match self {
            MessageFilter::All => message_type::WILDCARD.to_string(),
            MessageFilter::Type(kind) => kind.clone(),
        }
    }
}

impl From<&str> for MessageFilter {
    fn from(value: &str) -> Self {
        if value == message_type::WILDCARD {
            MessageFilter::All
        } else {
            MessageFilter::Type(value.to_string())
        }
    }
}

/// Fans parsed frames out to wildcard routes first, then exact-type routes.
#[derive(Clone, Default)]
pub struct MessageRouter {
    routes: KeyedRegistry<String, WireMessage>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, filter: impl Into<MessageFilter>, callback: F) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.routes.subscribe(filter.into().route_key(), callback)
    }

    /// Like [`subscribe`](Self::subscribe), but only for frames of one conversation
    pub fn subscribe_scoped<F>(
        &self,
        filter: impl Into<MessageFilter>,
        conversation_id: impl Into<String>,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        let conversation_id = conversation_id.into();
        self.subscribe(filter, move |message: &WireMessage| {
            if message.conversation_id.as_deref() == Some(conversation_id.as_str()) {
                callback(message);
            }
        })
    }

    /// Deliver an already parsed frame. Returns the number of routes reached.
    pub fn dispatch(&self, message: &WireMessage) -> usize {
        let wildcard = self
            .routes
            .notify(&message_type::WILDCARD.to_string(), message);
        let exact = if message.kind == message_type::WILDCARD {
            0
        } else {
            self.routes.notify(&message.kind, message)
        };
        wildcard + exact
    }

    /// Parse a raw frame and deliver it
    pub fn route(&self, raw: &str) -> LinkResult<WireMessage> {
        let message = WireMessage::parse(raw)?;
        self.dispatch(&message);
        Ok(message)
    }

    pub fn route_count(&self, filter: impl Into<MessageFilter>) -> usize {
        self.routes.subscriber_count(&filter.into().route_key())
    }
}
