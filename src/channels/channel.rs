//! Channel trait and the message types every transport speaks.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::engine::event::{EventKind, InboundEvent, PromptRequest};
use crate::error::ChannelError;

/// A message received from a transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name, e.g. "telegram".
    pub channel: String,
    /// Sender identity on that channel.
    pub user_id: String,
    /// Display name of the sender, if known.
    pub user_name: Option<String>,
    pub kind: EventKind,
    pub content: String,
    /// Channel-specific routing data.
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            kind: EventKind::Text,
            content: content.to_string(),
            metadata: serde_json::json!({}),
            received_at: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    /// Session id for this sender: `<channel>:<user_id>`.
    pub fn session_id(&self) -> String {
        format!("{}:{}", self.channel, self.user_id)
    }

    /// Translate into an engine event.
    pub fn to_event(&self) -> InboundEvent {
        let event = InboundEvent::new(self.session_id(), self.kind, self.content.clone());
        match self.user_name {
            Some(ref name) => event.with_display_name(name.clone()),
            None => event,
        }
    }
}

/// A message to deliver through a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    /// Buttons to offer, in order.
    pub options: Option<Vec<String>>,
    /// Offer a share-contact button.
    pub request_contact: bool,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            options: None,
            request_contact: false,
        }
    }
}

impl From<PromptRequest> for OutgoingResponse {
    fn from(prompt: PromptRequest) -> Self {
        Self {
            content: prompt.text,
            options: prompt.options,
            request_contact: prompt.request_contact,
        }
    }
}

/// Stream of inbound messages from one or more channels.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel name, used as the session id prefix.
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a message to a user (or admin chat) on this channel.
    async fn send(&self, recipient: &str, response: OutgoingResponse) -> Result<(), ChannelError>;

    /// Check that the channel is reachable.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop the channel.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
