//! draftline core - in-memory versioning kernel
//!
//! This crate provides the storage-independent half of draft/commit
//! versioning:
//! - Statically declared owner schemas held in an immutable registry
//! - `Record` values with attribute assignment, one-level nested
//!   association assignment and validation
//! - `Snapshot` values and the event state they carry
//! - The attribute snapshot builder (`versioned_attributes`)
//! - Schema compatibility diagnostics for historical snapshots
//! - Error and logging facilities shared by the store and engine crates

pub mod builder;
pub mod compat;
pub mod config;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod nested;
pub mod registry;
pub mod rules;

pub use draftline_core_types as core_types;

// Re-export commonly used types
pub use compat::{incompatible_attributes, to_sentence};
pub use builder::{nested_attributes, self_attributes, versioned_attributes};
pub use config::VersioningConfig;
pub use errors::{DraftlineError, ExError, ExErrorKind, Result};
pub use model::{
    AttributeMap, CommitParams, Event, Record, Related, Snapshot, SnapshotFilter, ValidationError,
};
pub use registry::{
    AssociationDef, AttributeDef, AttributeType, Cardinality, OwnerSchema, SchemaRegistry,
    SchemaRegistryBuilder, Validation,
};
