//! Core types shared across draftline crates
//!
//! This crate provides foundational types used by the domain, persistence
//! and orchestration layers:
//!
//! - **Identifiers**: RecordId, SnapshotId, OwnerKey
//! - **Schema constants**: Canonical field keys and event names for logging

pub mod ids;
pub mod schema;

pub use ids::{OwnerKey, RecordId, SnapshotId};
