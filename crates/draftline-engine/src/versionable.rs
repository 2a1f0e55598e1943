//! Capability surface shared by a live owner and its draft proxy
//!
//! Callers that only read and write attributes, save, update or reload can
//! hold either variant behind `Versionable`; `is_live` / `is_version` tell
//! them apart.

#![allow(clippy::result_large_err)]

use draftline_core::{AttributeMap, DraftlineError, Record, Result, ValidationError};
use draftline_core_types::OwnerKey;
use draftline_store::Database;
use serde_json::Value;

pub trait Versionable {
    /// The in-memory record reads and writes go to
    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn is_live(&self) -> bool;

    fn is_version(&self) -> bool;

    /// Validate and persist; `Ok(false)` when validation fails
    ///
    /// # Errors
    /// Persistence failures, and `InvalidVersion` for a proxy whose snapshot
    /// is no longer a draft.
    fn save(&mut self, db: &mut Database) -> Result<bool>;

    /// Assign `attrs` then `save`
    ///
    /// # Errors
    /// As `save`, plus attribute assignment errors.
    fn update(&mut self, db: &mut Database, attrs: &AttributeMap) -> Result<bool>;

    /// Discard in-memory edits and re-read from storage
    ///
    /// # Errors
    /// Returns `RecordNotFound` / `SnapshotNotFound` when the source is gone.
    fn reload(&mut self, db: &Database) -> Result<()>;

    /// As `save`, but a validation failure is an error
    ///
    /// # Errors
    /// Returns `RecordInvalid` carrying the invalid record.
    fn save_strict(&mut self, db: &mut Database) -> Result<()> {
        if self.save(db)? {
            Ok(())
        } else {
            Err(invalid(self.record()))
        }
    }

    /// As `update`, but a validation failure is an error
    ///
    /// # Errors
    /// Returns `RecordInvalid` carrying the invalid record.
    fn update_strict(&mut self, db: &mut Database, attrs: &AttributeMap) -> Result<()> {
        if self.update(db, attrs)? {
            Ok(())
        } else {
            Err(invalid(self.record()))
        }
    }

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.record().get(name)
    }

    /// In-memory write
    ///
    /// # Errors
    /// Returns `UnknownAttribute` for undeclared names.
    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        self.record_mut().set(name, value)
    }

    /// In-memory assignment, nested keys included
    ///
    /// # Errors
    /// Propagates unknown attribute/association and nested payload errors.
    fn assign_attributes(&mut self, attrs: &AttributeMap) -> Result<()> {
        self.record_mut().assign_attributes(attrs)
    }

    fn owner_key(&self) -> Option<OwnerKey> {
        self.record().owner_key()
    }

    /// External key of the live record
    fn to_param(&self) -> Option<String> {
        self.record().id().map(|id| id.to_string())
    }

    fn errors(&self) -> &[ValidationError] {
        self.record().errors()
    }
}

fn invalid(record: &Record) -> DraftlineError {
    DraftlineError::RecordInvalid {
        record: Box::new(record.clone()),
    }
}
