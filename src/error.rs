//! Error types for the intake bot.

use std::time::Duration;

/// Error returned while handling an inbound event.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Structural problems in a flow definition, detected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("Flow has no steps")]
    Empty,

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Entry step {0} is not defined")]
    UnknownEntry(String),

    #[error("Step {from} transitions to undefined step {target}")]
    UnknownTarget { from: String, target: String },

    #[error("Step {0} has no outgoing transition and is not terminal")]
    DeadEnd(String),

    #[error("Step {from} goes back to undefined step {target}")]
    UnknownBackTarget { from: String, target: String },

    #[error("Step {step} branches on {label:?}, which is not one of its options")]
    UndeclaredBranch { step: String, label: String },

    #[error("Flow must have exactly one terminal step, found {0}")]
    TerminalCount(usize),
}

/// Session persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Failure of a single recipient to accept a submission.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Recipient {recipient} unreachable: {reason}")]
    Unreachable { recipient: String, reason: String },

    #[error("Recipient {recipient} timed out after {timeout:?}")]
    Timeout { recipient: String, timeout: Duration },

    #[error("Ledger write failed: {0}")]
    Ledger(#[from] StoreError),
}
