//! Session state: per-user progress and its storage.

pub mod locks;
pub mod model;
pub mod store;

pub use locks::SessionLocks;
pub use model::Session;
pub use store::{InMemorySessionStore, SessionStore, spawn_sweep_task, sweep_idle};
