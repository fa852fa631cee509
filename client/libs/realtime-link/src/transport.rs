//! Bidirectional frame transport
//!
//! The connection manager only sees a [`TransportChannel`]: an outbound frame
//! sender and an inbound event receiver. [`WebSocketTransport`] backs it with
//! `tokio-tungstenite`; tests plug in in-memory transports.

use crate::error::{LinkError, LinkResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Who the connection is opened for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Frames handed to the transport writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Close the channel gracefully
    Close,
}

/// Events surfaced by the transport reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// An open channel
pub struct TransportChannel {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportChannel {
    /// Two connected halves: the channel for the manager and the far end for
    /// whoever produces inbound events and consumes outbound frames.
    pub fn pair() -> (
        TransportChannel,
        mpsc::UnboundedSender<TransportEvent>,
        mpsc::UnboundedReceiver<OutboundFrame>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            TransportChannel {
                outbound: out_tx,
                inbound: in_rx,
            },
            in_tx,
            out_rx,
        )
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        endpoint: &str,
        identity: &Identity,
        token: &str,
    ) -> LinkResult<TransportChannel>;
}

/// WebSocket transport over `tokio-tungstenite`.
///
/// The token and user id travel as query parameters of the upgrade request.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }

    fn request_url(endpoint: &str, identity: &Identity, token: &str) -> String {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{endpoint}{separator}userId={}&token={}",
            urlencoding::encode(&identity.user_id),
            urlencoding::encode(token)
        )
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        endpoint: &str,
        identity: &Identity,
        token: &str,
    ) -> LinkResult<TransportChannel> {
        let url = Self::request_url(endpoint, identity, token);
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!(status = %response.status(), endpoint, "WebSocket handshake complete");

        let (mut sink, mut source) = stream.split();
        let (channel, events, mut frames) = TransportChannel::pair();

        // Writer: drains outbound frames until closed or the manager drops its sender.
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = sink.send(Message::text(text)).await {
                            warn!(error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    OutboundFrame::Close => break,
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        // Reader: forwards text frames and reports how the stream ended.
        tokio::spawn(async move {
            let ended = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if events.send(TransportEvent::Message(text)).is_err() {
                                return;
                            }
                        }
                        Err(_) => debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_owned(),
                            },
                            None => TransportEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                    }
                }
            };
            let _ = events.send(ended);
        });

        Ok(channel)
    }
}
