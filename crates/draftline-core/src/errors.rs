use draftline_core_types::{OwnerKey, SnapshotId};
use thiserror::Error;

use crate::compat::to_sentence;
use crate::model::{Record, Snapshot};

/// Result type alias using DraftlineError
pub type Result<T> = std::result::Result<T, DraftlineError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, log assertions and external reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    NotFound,
    ValidationFailed,
    UnknownKind,
    UnknownAttribute,
    UnknownAssociation,
    AlreadyExists,

    // Versioning lifecycle
    RecordNotPersisted,
    /// Mutation attempted on a snapshot that is no longer a draft
    InvalidVersion,
    /// Historical snapshot references attributes missing from the current schema
    IncompatibleVersion,

    // Integration/IO
    Config,
    Io,
    Serialization,
    Persistence,
    Concurrency,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::ValidationFailed => "ERR_VALIDATION_FAILED",
            ExErrorKind::UnknownKind => "ERR_UNKNOWN_KIND",
            ExErrorKind::UnknownAttribute => "ERR_UNKNOWN_ATTRIBUTE",
            ExErrorKind::UnknownAssociation => "ERR_UNKNOWN_ASSOCIATION",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::RecordNotPersisted => "ERR_RECORD_NOT_PERSISTED",
            ExErrorKind::InvalidVersion => "ERR_INVALID_VERSION",
            ExErrorKind::IncompatibleVersion => "ERR_INCOMPATIBLE_VERSION",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Flat, cloneable representation used by the persistence layer and by the
/// logging macros. Domain errors convert into it via `From<DraftlineError>`.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    snapshot_id: Option<String>,
    message: String,
    stale_attributes: Option<Vec<String>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            snapshot_id: None,
            message: String::new(),
            stale_attributes: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity (owner) context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add snapshot context
    pub fn with_snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add the attribute names that made a snapshot incompatible
    pub fn with_stale_attributes(mut self, attributes: Vec<String>) -> Self {
        self.stale_attributes = Some(attributes);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the snapshot context, if any
    pub fn snapshot_id(&self) -> Option<&str> {
        self.snapshot_id.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the stale attribute names, if any (populated on IncompatibleVersion)
    pub fn stale_attributes(&self) -> Option<&[String]> {
        self.stale_attributes.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(snapshot_id) = &self.snapshot_id {
            write!(f, " (snapshot_id: {})", snapshot_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Domain error taxonomy for versioning operations
#[derive(Error, Debug, Clone)]
pub enum DraftlineError {
    // ===== Lifecycle Errors =====
    /// A draft was requested for a record that has no identity yet
    #[error("{owner} must be persisted to create a draft version")]
    RecordNotPersisted { owner: String },

    /// Mutation or commit attempted on a committed snapshot
    #[error("Version {snapshot_id} must be a draft")]
    InvalidVersion { snapshot_id: SnapshotId },

    /// Validation failed; carries the invalid record with its errors
    #[error("Validation failed: {}", .record.full_messages().join(", "))]
    RecordInvalid { record: Box<Record> },

    /// Restore attempted from a snapshot whose keys no longer fit the schema
    #[error(
        "The given version contains attributes that are no longer compatible with the current schema: {}.",
        to_sentence(.attributes)
    )]
    IncompatibleVersion {
        owner: OwnerKey,
        snapshot: Box<Snapshot>,
        attributes: Vec<String>,
    },

    // ===== Lookup Errors =====
    /// Snapshot absent or owned by a different record
    #[error("Snapshot {snapshot_id} not found for {owner}")]
    SnapshotNotFound {
        snapshot_id: SnapshotId,
        owner: OwnerKey,
    },

    /// Record row not found
    #[error("Record not found: {owner}")]
    RecordNotFound { owner: OwnerKey },

    // ===== Schema Errors =====
    /// Kind tag has no registered schema
    #[error("Unknown record kind: {kind}")]
    UnknownKind { kind: String },

    /// Kind tag registered twice
    #[error("Record kind already registered: {kind}")]
    DuplicateKind { kind: String },

    /// Attribute not declared by the schema
    #[error("Unknown attribute '{attribute}' for {kind}")]
    UnknownAttribute { kind: String, attribute: String },

    /// Association not declared (or not nested) on the schema
    #[error("Unknown association '{association}' for {kind}")]
    UnknownAssociation { kind: String, association: String },

    /// Nested attributes payload has the wrong shape
    #[error("Invalid nested attributes for {association}: {reason}")]
    InvalidNestedAttributes { association: String, reason: String },

    /// Stored event value is not one of create/draft/commit
    #[error("Invalid snapshot event: {value}")]
    InvalidEvent { value: String },

    // ===== Generic Errors =====
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization error (JSON/TOML encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Persistence layer failure
    #[error(transparent)]
    Store(#[from] ExError),

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<DraftlineError> for ExError {
    fn from(err: DraftlineError) -> Self {
        let message = err.to_string();
        match err {
            DraftlineError::RecordNotPersisted { owner } => {
                ExError::new(ExErrorKind::RecordNotPersisted)
                    .with_entity_id(owner)
                    .with_message(message)
            }

            DraftlineError::InvalidVersion { snapshot_id } => {
                ExError::new(ExErrorKind::InvalidVersion)
                    .with_snapshot_id(snapshot_id.to_string())
                    .with_message(message)
            }

            DraftlineError::RecordInvalid { record } => {
                let err = ExError::new(ExErrorKind::ValidationFailed).with_message(message);
                match record.owner_key() {
                    Some(key) => err.with_entity_id(key.to_string()),
                    None => err,
                }
            }

            DraftlineError::IncompatibleVersion {
                owner,
                snapshot,
                attributes,
            } => ExError::new(ExErrorKind::IncompatibleVersion)
                .with_entity_id(owner.to_string())
                .with_snapshot_id(snapshot.id.to_string())
                .with_stale_attributes(attributes)
                .with_message(message),

            DraftlineError::SnapshotNotFound { snapshot_id, owner } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_entity_id(owner.to_string())
                    .with_snapshot_id(snapshot_id.to_string())
                    .with_message("Snapshot not found")
            }

            DraftlineError::RecordNotFound { owner } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(owner.to_string())
                .with_message("Record not found"),

            DraftlineError::UnknownKind { .. } => {
                ExError::new(ExErrorKind::UnknownKind).with_message(message)
            }

            DraftlineError::DuplicateKind { .. } => {
                ExError::new(ExErrorKind::AlreadyExists).with_message(message)
            }

            DraftlineError::UnknownAttribute { .. } => {
                ExError::new(ExErrorKind::UnknownAttribute).with_message(message)
            }

            DraftlineError::UnknownAssociation { .. } => {
                ExError::new(ExErrorKind::UnknownAssociation).with_message(message)
            }

            DraftlineError::InvalidNestedAttributes { .. } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(message)
            }

            DraftlineError::InvalidEvent { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            DraftlineError::Config { .. } => {
                ExError::new(ExErrorKind::Config).with_message(message)
            }

            DraftlineError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            DraftlineError::Store(inner) => inner,

            DraftlineError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to DraftlineError
impl From<serde_json::Error> for DraftlineError {
    fn from(err: serde_json::Error) -> Self {
        DraftlineError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftline_core_types::RecordId;

    #[test]
    fn test_versioning_error_kind_codes() {
        let cases = [
            (ExErrorKind::RecordNotPersisted, "ERR_RECORD_NOT_PERSISTED"),
            (ExErrorKind::InvalidVersion, "ERR_INVALID_VERSION"),
            (ExErrorKind::IncompatibleVersion, "ERR_INCOMPATIBLE_VERSION"),
            (ExErrorKind::ValidationFailed, "ERR_VALIDATION_FAILED"),
            (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_invalid_version_message() {
        let err = DraftlineError::InvalidVersion {
            snapshot_id: SnapshotId::from_string("s-1".to_string()),
        };
        assert_eq!(err.to_string(), "Version s-1 must be a draft");

        let ex: ExError = err.into();
        assert_eq!(ex.kind(), ExErrorKind::InvalidVersion);
        assert_eq!(ex.snapshot_id(), Some("s-1"));
    }

    #[test]
    fn test_snapshot_not_found_maps_to_not_found() {
        let err = DraftlineError::SnapshotNotFound {
            snapshot_id: SnapshotId::from_string("s-9".to_string()),
            owner: OwnerKey::new("post", RecordId::from_string("p-1".to_string())),
        };
        let ex: ExError = err.into();
        assert_eq!(ex.code(), "ERR_NOT_FOUND");
        assert_eq!(ex.entity_id(), Some("post:p-1"));
    }

    #[test]
    fn test_store_error_passes_through() {
        let inner = ExError::new(ExErrorKind::Persistence).with_op("sqlite");
        let err: DraftlineError = inner.into();
        let back: ExError = err.into();
        assert_eq!(back.kind(), ExErrorKind::Persistence);
        assert_eq!(back.op(), Some("sqlite"));
    }

    #[test]
    fn test_stale_attributes_none_by_default() {
        let err = ExError::new(ExErrorKind::NotFound);
        assert!(err.stale_attributes().is_none());
    }
}
