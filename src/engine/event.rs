//! Boundary types between transports and the dialogue engine.

use serde::{Deserialize, Serialize};

use crate::flow::StepId;

/// What kind of input the user produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Typed text (including reply-keyboard buttons, which arrive as text).
    Text,
    /// An inline menu selection.
    Choice,
    /// A shared contact card; the payload is its phone number.
    Contact,
}

/// One inbound user event, already translated from the platform format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub session_id: String,
    pub kind: EventKind,
    pub payload: String,
    /// Platform display name, used to fill urgent requests.
    pub display_name: Option<String>,
}

impl InboundEvent {
    pub fn new(session_id: impl Into<String>, kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            payload: payload.into(),
            display_name: None,
        }
    }

    pub fn text(session_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Text, payload)
    }

    pub fn choice(session_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Choice, payload)
    }

    pub fn contact(session_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Contact, phone)
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Request to show a message (and optionally a menu) to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptRequest {
    pub session_id: String,
    /// Step being asked, or `None` for informational messages.
    pub step_id: Option<StepId>,
    pub text: String,
    /// Ordered option labels, or `None` for free input.
    pub options: Option<Vec<String>>,
    /// Ask the transport to offer a share-contact button.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub request_contact: bool,
}

impl PromptRequest {
    /// A plain message with no step attached.
    pub fn message(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            step_id: None,
            text: text.into(),
            options: None,
            request_contact: false,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }
}
