//! Dialogue engine: event handling, confirm screen and commands.

pub mod command;
pub mod confirm;
pub mod dialogue;
pub mod event;

pub use command::{Command, HELP_LABEL, NEW_REQUEST_LABEL};
pub use confirm::{ConfirmAction, SUBMIT_LABEL, render_summary};
pub use dialogue::{DialogueEngine, Outcome};
pub use event::{EventKind, InboundEvent, PromptRequest};
