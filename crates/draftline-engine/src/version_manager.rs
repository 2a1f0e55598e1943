//! Cross-history operations on one owner
//!
//! Restoring a historical snapshot as the current draft, and the
//! compatibility diagnostics that guard it. Lifecycle logging for restore
//! belongs to `LiveOwner::create_draft_from_version`; this module only
//! logs at debug level.

#![allow(clippy::result_large_err)]

use draftline_core::{incompatible_attributes, DraftlineError, Record, Result, Snapshot};
use draftline_core_types::{OwnerKey, SnapshotId};
use draftline_store::{Database, SnapshotRepo, TransactionBehavior};

/// Operations over the history of `record`
pub struct VersionManager<'a> {
    record: &'a Record,
}

impl<'a> VersionManager<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    /// Overwrite the owner's draft with the object of snapshot `id`
    ///
    /// The draft is found or created in the same IMMEDIATE transaction that
    /// loads the source snapshot, so the owner gains at most one snapshot.
    ///
    /// ## Returns
    ///
    /// The draft snapshot as written
    ///
    /// ## Errors
    ///
    /// - `RecordNotPersisted`: the owner has no identity yet
    /// - `SnapshotNotFound`: `id` is unknown or belongs to another owner
    /// - `IncompatibleVersion`: the source references attributes the owner
    ///   no longer declares
    pub fn create_draft_from_version(&self, db: &mut Database, id: &SnapshotId) -> Result<Snapshot> {
        let owner = self.owner_key()?;

        db.transaction(TransactionBehavior::Immediate, |tx, _| -> Result<Snapshot> {
            let source = SnapshotRepo::find_for_owner(tx, &owner, id)?.ok_or_else(|| {
                DraftlineError::SnapshotNotFound {
                    snapshot_id: id.clone(),
                    owner: owner.clone(),
                }
            })?;
            self.ensure_compatibility_with(&source)?;

            let (mut draft, created) = SnapshotRepo::find_or_create_draft(tx, &owner, || {
                Snapshot::new_draft(owner.clone(), None, source.object.clone())
            })?;
            if !created {
                draft.object = source.object.clone();
                draft.updated_at = chrono::Utc::now();
                SnapshotRepo::update(tx, &draft)?;
            }

            tracing::debug!(
                owner = %owner,
                source = %source.id,
                draft = %draft.id,
                created,
                "draft restored from snapshot"
            );
            Ok(draft)
        })
    }

    /// Keys of `snapshot.object` the owner's current schema does not declare
    pub fn incompatible_attributes(&self, snapshot: &Snapshot) -> Vec<String> {
        incompatible_attributes(self.record.schema(), &snapshot.object)
    }

    /// # Errors
    /// Returns `IncompatibleVersion` listing every stale key.
    pub fn ensure_compatibility_with(&self, snapshot: &Snapshot) -> Result<()> {
        let stale = self.incompatible_attributes(snapshot);
        if stale.is_empty() {
            return Ok(());
        }
        Err(DraftlineError::IncompatibleVersion {
            owner: self.owner_key()?,
            snapshot: Box::new(snapshot.clone()),
            attributes: stale,
        })
    }

    fn owner_key(&self) -> Result<OwnerKey> {
        self.record
            .owner_key()
            .ok_or_else(|| DraftlineError::RecordNotPersisted {
                owner: self.record.display(),
            })
    }
}
