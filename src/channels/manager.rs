//! Channel manager: merges inbound streams and routes outbound messages.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::channels::{Channel, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Owns all active channels.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Start every channel and merge their streams.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in self.channels.values() {
            streams.push(channel.start().await?);
            tracing::info!(channel = channel.name(), "Channel started");
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Send to a session id of the form `<channel>:<recipient>`.
    pub async fn send(
        &self,
        session_id: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let (name, recipient) = session_id.split_once(':').ok_or_else(|| {
            ChannelError::InvalidMessage(format!("malformed session id {session_id:?}"))
        })?;
        let channel = self
            .channels
            .get(name)
            .ok_or_else(|| ChannelError::InvalidMessage(format!("unknown channel {name:?}")))?;
        channel.send(recipient, response).await
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for channel in self.channels.values() {
            channel.shutdown().await?;
        }
        Ok(())
    }
}
