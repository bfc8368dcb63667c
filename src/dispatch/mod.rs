//! Outbound dispatcher: presents prompts and fans submissions out to
//! recipients (ledger, operator notifications).

pub mod notify;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::ChannelManager;
use crate::engine::event::PromptRequest;
use crate::error::{ChannelError, DeliveryError};

pub use notify::AdminNotifier;

/// What a submission represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// A confirmed, complete application.
    Application,
    /// An urgent call-me-back request, possibly with partial answers.
    Urgent,
}

impl std::fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// A finalized snapshot of a session's answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub session_id: String,
    pub kind: SubmissionKind,
    pub answers: HashMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(
        kind: SubmissionKind,
        session_id: impl Into<String>,
        answers: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            kind,
            answers,
            submitted_at: Utc::now(),
        }
    }

    pub fn application(session_id: impl Into<String>, answers: HashMap<String, String>) -> Self {
        Self::new(SubmissionKind::Application, session_id, answers)
    }

    pub fn urgent(session_id: impl Into<String>, answers: HashMap<String, String>) -> Self {
        Self::new(SubmissionKind::Urgent, session_id, answers)
    }

    pub fn answer(&self, field: &str) -> Option<&str> {
        self.answers.get(field).map(String::as_str)
    }

    /// User identity without the channel prefix.
    pub fn user_id(&self) -> &str {
        self.session_id
            .split_once(':')
            .map(|(_, id)| id)
            .unwrap_or(&self.session_id)
    }
}

/// A downstream sink for submissions.
#[async_trait]
pub trait Recipient: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this recipient wants submissions of `kind`.
    fn accepts(&self, kind: SubmissionKind) -> bool {
        let _ = kind;
        true
    }

    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError>;
}

/// Everything the engine needs from the outside world.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Show a prompt or message to the user.
    async fn present(&self, prompt: PromptRequest) -> Result<(), ChannelError>;

    /// Deliver a submission to every interested recipient. One result per
    /// recipient that was attempted.
    async fn deliver(&self, submission: &Submission) -> Vec<Result<(), DeliveryError>>;
}

/// Production outbound: prompts go through the channel manager, submissions
/// fan out to recipients with a per-recipient timeout.
pub struct Dispatcher {
    channels: Arc<ChannelManager>,
    recipients: Vec<Arc<dyn Recipient>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(channels: Arc<ChannelManager>, timeout: Duration) -> Self {
        Self {
            channels,
            recipients: Vec::new(),
            timeout,
        }
    }

    pub fn with_recipient(mut self, recipient: Arc<dyn Recipient>) -> Self {
        self.recipients.push(recipient);
        self
    }

    pub fn recipient_names(&self) -> Vec<&str> {
        self.recipients.iter().map(|r| r.name()).collect()
    }
}

#[async_trait]
impl Outbound for Dispatcher {
    async fn present(&self, prompt: PromptRequest) -> Result<(), ChannelError> {
        let session_id = prompt.session_id.clone();
        self.channels.send(&session_id, prompt.into()).await
    }

    async fn deliver(&self, submission: &Submission) -> Vec<Result<(), DeliveryError>> {
        fan_out(&self.recipients, submission, self.timeout).await
    }
}

/// Deliver to every accepting recipient concurrently. A failing recipient
/// never stops the others.
pub async fn fan_out(
    recipients: &[Arc<dyn Recipient>],
    submission: &Submission,
    timeout: Duration,
) -> Vec<Result<(), DeliveryError>> {
    let attempts = recipients
        .iter()
        .filter(|r| r.accepts(submission.kind))
        .map(|recipient| async move {
            let result = match tokio::time::timeout(timeout, recipient.deliver(submission)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout {
                    recipient: recipient.name().to_string(),
                    timeout,
                }),
            };
            match &result {
                Ok(()) => info!(
                    submission = %submission.id,
                    kind = %submission.kind,
                    recipient = recipient.name(),
                    "Submission delivered"
                ),
                Err(e) => warn!(
                    submission = %submission.id,
                    recipient = recipient.name(),
                    "Delivery failed: {e}"
                ),
            }
            result
        });
    futures::future::join_all(attempts).await
}
