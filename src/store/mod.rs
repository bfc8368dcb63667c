//! Persistence layer: libSQL-backed sessions and the submission ledger.

pub mod ledger;
pub mod libsql_backend;
pub mod migrations;

pub use ledger::Ledger;
pub use libsql_backend::{LEDGER_FIELDS, LedgerEntry, LibSqlBackend};
