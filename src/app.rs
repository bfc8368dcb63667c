//! Runtime loop: feeds channel messages into the dialogue engine.

use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::engine::DialogueEngine;
use crate::error::Error;

/// Sent when handling fails for reasons outside the user's control.
const RETRY_TEXT: &str = "⚠️ Что-то пошло не так. Пожалуйста, попробуйте ещё раз через минуту.";

pub struct App {
    engine: Arc<DialogueEngine>,
    channels: Arc<ChannelManager>,
}

impl App {
    pub fn new(engine: Arc<DialogueEngine>, channels: Arc<ChannelManager>) -> Self {
        Self { engine, channels }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    ///
    /// Each message is handled on its own task; the engine serializes
    /// messages of the same session.
    pub async fn run(self) -> Result<(), Error> {
        let mut message_stream = self.channels.start_all().await?;
        tracing::info!(channels = ?self.channels.names(), "Intake bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let engine = Arc::clone(&self.engine);
            let channels = Arc::clone(&self.channels);
            tokio::spawn(async move {
                handle_message(&engine, &channels, message).await;
            });
        }

        self.channels.shutdown_all().await?;
        Ok(())
    }
}

async fn handle_message(
    engine: &DialogueEngine,
    channels: &ChannelManager,
    message: IncomingMessage,
) {
    let session_id = message.session_id();
    match engine.handle(message.to_event()).await {
        Ok(outcome) => {
            tracing::debug!(session = %session_id, ?outcome, "Event handled");
        }
        Err(e) => {
            tracing::error!(session = %session_id, "Error handling message: {e}");
            if let Err(e) = channels
                .send(&session_id, OutgoingResponse::text(RETRY_TEXT))
                .await
            {
                tracing::warn!(session = %session_id, "Failed to send retry notice: {e}");
            }
        }
    }
}
