//! Intake Bot: guided questionnaire over chat.

pub mod app;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod flow;
pub mod session;
pub mod store;
pub mod validate;
