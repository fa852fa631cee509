//! JSON frames exchanged over the realtime channel
//!
//! Every frame is an object with a `type` discriminator and optional
//! `conversationId`, `senderId`, `data` and `timestamp` (epoch millis) fields.

use crate::error::{LinkError, LinkResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Frame type discriminators
pub mod message_type {
    /// Route key matching every frame type
    pub const WILDCARD: &str = "*";

    // Inbound
    pub const NEW_MESSAGE: &str = "NEW_MESSAGE";
    pub const MESSAGE_READ: &str = "MESSAGE_READ";
    pub const USER_TYPING: &str = "USER_TYPING";

    // Outbound
    pub const SEND_MESSAGE: &str = "SEND_MESSAGE";
    pub const MARK_READ: &str = "MARK_READ";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WireMessage {
    /// Parse one inbound text frame
    pub fn parse(raw: &str) -> LinkResult<Self> {
        let message: WireMessage = serde_json::from_str(raw)
            .map_err(|e| LinkError::Protocol(format!("malformed frame: {e}")))?;

        if message.kind.trim().is_empty() {
            return Err(LinkError::Protocol("frame has an empty type".to_string()));
        }
        Ok(message)
    }

    pub fn to_json(&self) -> LinkResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Outbound chat message
    pub fn send_message(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        recipient_id: Option<&str>,
    ) -> Self {
        let mut data = json!({ "content": content.into() });
        if let Some(recipient_id) = recipient_id {
            data["recipientId"] = Value::String(recipient_id.to_string());
        }
        Self::command(message_type::SEND_MESSAGE, conversation_id.into(), data)
    }

    /// Outbound read receipt
    pub fn mark_read(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self::command(
            message_type::MARK_READ,
            conversation_id.into(),
            json!({ "messageId": message_id.into() }),
        )
    }

    /// Outbound typing signal
    pub fn typing(conversation_id: impl Into<String>, is_typing: bool) -> Self {
        Self::command(
            message_type::USER_TYPING,
            conversation_id.into(),
            json!({ "isTyping": is_typing }),
        )
    }

    fn command(kind: &str, conversation_id: String, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            conversation_id: Some(conversation_id),
            sender_id: None,
            data: Some(data),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn is_type(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// `data.isTyping` of a typing frame
    pub fn typing_flag(&self) -> Option<bool> {
        self.data.as_ref()?.get("isTyping")?.as_bool()
    }

    /// Decode `data` into a typed payload
    pub fn data_as<D: DeserializeOwned>(&self) -> LinkResult<D> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| LinkError::Protocol(format!("{} frame has no data", self.kind)))?;
        serde_json::from_value(data)
            .map_err(|e| LinkError::Protocol(format!("invalid {} payload: {e}", self.kind)))
    }
}

/// `data` of a `NEW_MESSAGE` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound_frame() {
        let raw = r#"{"type":"NEW_MESSAGE","conversationId":"c1","senderId":"u2","data":{"id":"m1","content":"hi"},"timestamp":1700000000000}"#;
        let message = WireMessage::parse(raw).unwrap();

        assert_eq!(message.kind, message_type::NEW_MESSAGE);
        assert_eq!(message.conversation_id.as_deref(), Some("c1"));
        assert_eq!(message.sender_id.as_deref(), Some("u2"));
        assert_eq!(message.timestamp, Some(1_700_000_000_000));

        let payload: ChatMessagePayload = message.data_as().unwrap();
        assert_eq!(payload.content, "hi");
        assert_eq!(payload.id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(matches!(
            WireMessage::parse("not json"),
            Err(LinkError::Protocol(_))
        ));
        assert!(matches!(
            WireMessage::parse(r#"{"conversationId":"c1"}"#),
            Err(LinkError::Protocol(_))
        ));
        assert!(matches!(
            WireMessage::parse(r#"{"type":"  "}"#),
            Err(LinkError::Protocol(_))
        ));
    }

    #[test]
    fn test_outbound_send_message_shape() {
        let message = WireMessage::send_message("c1", "hello", Some("u9"));
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "SEND_MESSAGE");
        assert_eq!(value["conversationId"], "c1");
        assert_eq!(value["data"]["content"], "hello");
        assert_eq!(value["data"]["recipientId"], "u9");
        assert!(value["timestamp"].is_i64());
        assert!(value.get("senderId").is_none());
    }

    #[test]
    fn test_outbound_mark_read_and_typing() {
        let read = WireMessage::mark_read("c1", "m7");
        assert_eq!(read.kind, message_type::MARK_READ);
        assert_eq!(read.data, Some(json!({ "messageId": "m7" })));

        let typing = WireMessage::typing("c1", true);
        assert_eq!(typing.kind, message_type::USER_TYPING);
        assert_eq!(typing.typing_flag(), Some(true));
    }

    #[test]
    fn test_data_as_reports_missing_payload() {
        let message = WireMessage::parse(r#"{"type":"NEW_MESSAGE"}"#).unwrap();
        let result: LinkResult<ChatMessagePayload> = message.data_as();
        assert!(matches!(result, Err(LinkError::Protocol(_))));
    }
}
