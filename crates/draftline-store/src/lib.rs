//! draftline store - SQLite persistence layer
//!
//! Provides:
//! - Connection management and transactional scopes (`Database`)
//! - Embedded migrations with checksum verification
//! - Snapshot repository: polymorphic-owner queries, newest-first listing,
//!   find-or-create of the single draft
//! - Record repository: JSON attribute rows, one-level association loading
//!   and nested graph reconciliation on save

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use db::Database;
pub use errors::Result;
pub use repo::{RecordRepo, SnapshotRepo};
pub use rusqlite::TransactionBehavior;
