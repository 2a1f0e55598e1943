//! Versioned owner lifecycle
//!
//! A `LiveOwner` wraps a persisted record together with the state its
//! history needs: the committer identity attached to the next snapshot
//! and the cached draft proxy.
//!
//! Lifecycle: the first successful save writes a `create` snapshot;
//! `current_draft` finds or creates the single draft; `destroy_draft`
//! removes it; `create_draft_from_version` restores an older snapshot
//! into it.
//!
//! ## Logging Ownership
//!
//! The engine layer owns lifecycle logging for owner operations:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal details.

#![allow(clippy::result_large_err)]

use std::sync::Arc;

use draftline_core::{
    log_op_end, log_op_error, log_op_start, versioned_attributes, AttributeMap, DraftlineError,
    Record, Result, SchemaRegistry, Snapshot, SnapshotFilter,
};
use draftline_core_types::{OwnerKey, RecordId, SnapshotId};
use draftline_store::{Database, RecordRepo, SnapshotRepo, TransactionBehavior};

use crate::draft_proxy::DraftProxy;
use crate::version_manager::VersionManager;
use crate::versionable::Versionable;

/// A live record participating in versioning
#[derive(Debug, Clone)]
pub struct LiveOwner {
    record: Record,
    committer: Option<String>,
    current_draft: Option<DraftProxy>,
}

impl LiveOwner {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            committer: None,
            current_draft: None,
        }
    }

    /// Unsaved owner of `kind` with `attrs` assigned
    ///
    /// # Errors
    /// Returns `UnknownKind` or an attribute assignment error.
    pub fn build(registry: Arc<SchemaRegistry>, kind: &str, attrs: &AttributeMap) -> Result<Self> {
        Ok(Self::new(Record::build(registry, kind, attrs)?))
    }

    /// Build and persist an owner, writing its `create` snapshot
    ///
    /// ## Arguments
    ///
    /// - `db`: Database the owner and its snapshot are written to
    /// - `kind`: Registered kind tag
    /// - `attrs`: Initial attributes, nested keys included
    /// - `committer`: Identity stored on the `create` snapshot
    ///
    /// ## Errors
    ///
    /// - `UnknownKind` / `UnknownAttribute`: bad kind or attributes
    /// - `RecordInvalid`: validation failed; nothing is written
    /// - `Store`: persistence failure; nothing is written
    pub fn create(
        db: &mut Database,
        kind: &str,
        attrs: &AttributeMap,
        committer: Option<String>,
    ) -> Result<Self> {
        log_op_start!("create", kind = kind);
        let start = std::time::Instant::now();

        let owner = Self::create_impl(db, kind, attrs, committer).map_err(|e| {
            log_op_error!(
                "create",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "create",
            duration_ms = start.elapsed().as_millis() as u64,
            owner = %owner.record.display()
        );

        Ok(owner)
    }

    fn create_impl(
        db: &mut Database,
        kind: &str,
        attrs: &AttributeMap,
        committer: Option<String>,
    ) -> Result<Self> {
        let mut owner = Self::build(db.registry().clone(), kind, attrs)?;
        owner.committer = committer;
        if owner.persist(db)? {
            Ok(owner)
        } else {
            Err(DraftlineError::RecordInvalid {
                record: Box::new(owner.record),
            })
        }
    }

    /// Load a persisted owner with its nested associations
    ///
    /// # Errors
    /// Returns `RecordNotFound` when no row of `kind` has `id`.
    pub fn find(db: &Database, kind: &str, id: &RecordId) -> Result<Self> {
        RecordRepo::find(db.connection(), db.registry(), kind, id)?
            .map(Self::new)
            .ok_or_else(|| DraftlineError::RecordNotFound {
                owner: OwnerKey::new(kind, id.clone()),
            })
    }

    pub fn committer(&self) -> Option<&str> {
        self.committer.as_deref()
    }

    /// Identity attached to the next snapshot this owner writes
    pub fn set_committer(&mut self, committer: Option<String>) {
        self.committer = committer;
    }

    pub fn with_committer(mut self, committer: impl Into<String>) -> Self {
        self.committer = Some(committer.into());
        self
    }

    /// Current captured attribute map: own attributes plus one nested level
    pub fn versioned_attributes(&self) -> AttributeMap {
        versioned_attributes(&self.record)
    }

    /// The owner's draft, found or created on first use and then cached
    ///
    /// With `force_reload` the cached proxy (and any unsaved edits on it) is
    /// discarded and rebuilt from storage. The lookup and the insert share
    /// one IMMEDIATE transaction; without a unique index this keeps drafts
    /// single per owner only as far as SQLite's writer lock reaches.
    ///
    /// ## Errors
    ///
    /// - `RecordNotPersisted`: the owner has no identity yet
    /// - `Store`: persistence failure
    pub fn current_draft(&mut self, db: &mut Database, force_reload: bool) -> Result<&mut DraftProxy> {
        log_op_start!("current_draft", owner = %self.record.display(), force_reload = force_reload);
        let start = std::time::Instant::now();

        let draft = self.current_draft_impl(db, force_reload).map_err(|e| {
            log_op_error!(
                "current_draft",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "current_draft",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshot_id = %draft.snapshot_id()
        );

        Ok(draft)
    }

    fn current_draft_impl(&mut self, db: &mut Database, force_reload: bool) -> Result<&mut DraftProxy> {
        let owner = self.persisted_key()?;

        let proxy = match self.current_draft.take() {
            Some(cached) if !force_reload => cached,
            _ => {
                let object = versioned_attributes(&self.record);
                let committer = self.committer.clone();
                let (snapshot, created) =
                    db.transaction(TransactionBehavior::Immediate, |tx, _| -> Result<(Snapshot, bool)> {
                        Ok(SnapshotRepo::find_or_create_draft(tx, &owner, || {
                            Snapshot::new_draft(owner.clone(), committer, object)
                        })?)
                    })?;
                tracing::debug!(owner = %owner, snapshot_id = %snapshot.id, created, "draft resolved");
                DraftProxy::from_snapshot(db, &snapshot, self.committer.clone())?
            }
        };

        Ok(self.current_draft.insert(proxy))
    }

    /// Whether a draft snapshot exists in storage
    ///
    /// # Errors
    /// Persistence failures only; an unsaved owner has no draft.
    pub fn has_current_draft(&self, db: &Database) -> Result<bool> {
        match self.record.owner_key() {
            Some(owner) => Ok(SnapshotRepo::has_draft(db.connection(), &owner)?),
            None => Ok(false),
        }
    }

    /// Delete every draft snapshot of the owner and drop the cached proxy
    ///
    /// ## Returns
    ///
    /// Number of snapshots removed
    ///
    /// ## Errors
    ///
    /// - `Store`: persistence failure
    pub fn destroy_draft(&mut self, db: &mut Database) -> Result<usize> {
        log_op_start!("destroy_draft", owner = %self.record.display());
        let start = std::time::Instant::now();

        let removed = self.destroy_draft_impl(db).map_err(|e| {
            log_op_error!(
                "destroy_draft",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "destroy_draft",
            duration_ms = start.elapsed().as_millis() as u64,
            removed = removed
        );

        Ok(removed)
    }

    fn destroy_draft_impl(&mut self, db: &mut Database) -> Result<usize> {
        self.current_draft = None;
        let Some(owner) = self.record.owner_key() else {
            return Ok(0);
        };
        db.transaction(TransactionBehavior::Immediate, |tx, _| -> Result<usize> {
            Ok(SnapshotRepo::delete_drafts(tx, &owner)?)
        })
    }

    /// Restore snapshot `id` as the owner's draft
    ///
    /// The cached proxy is dropped so the next `current_draft` reifies the
    /// restored object.
    ///
    /// ## Errors
    ///
    /// - `RecordNotPersisted`: the owner has no identity yet
    /// - `SnapshotNotFound`: `id` is unknown or belongs to another owner
    /// - `IncompatibleVersion`: the snapshot names attributes the owner no
    ///   longer declares
    pub fn create_draft_from_version(&mut self, db: &mut Database, id: &SnapshotId) -> Result<Snapshot> {
        log_op_start!(
            "create_draft_from_version",
            owner = %self.record.display(),
            snapshot_id = %id
        );
        let start = std::time::Instant::now();

        let draft = self
            .version_manager()
            .create_draft_from_version(db, id)
            .map_err(|e| {
                log_op_error!(
                    "create_draft_from_version",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;
        self.current_draft = None;

        log_op_end!(
            "create_draft_from_version",
            duration_ms = start.elapsed().as_millis() as u64,
            draft_id = %draft.id
        );

        Ok(draft)
    }

    pub fn version_manager(&self) -> VersionManager<'_> {
        VersionManager::new(&self.record)
    }

    /// Keys of `snapshot` this owner's schema no longer declares
    pub fn incompatible_attributes(&self, snapshot: &Snapshot) -> Vec<String> {
        self.version_manager().incompatible_attributes(snapshot)
    }

    /// History newest first, narrowed by `filter`
    ///
    /// # Errors
    /// Persistence failures only; an unsaved owner has no history.
    pub fn snapshots(&self, db: &Database, filter: SnapshotFilter) -> Result<Vec<Snapshot>> {
        match self.record.owner_key() {
            Some(owner) => Ok(SnapshotRepo::list_for_owner(db.connection(), &owner, filter)?),
            None => Ok(Vec::new()),
        }
    }

    /// Delete the owner row and its whole history in one transaction
    ///
    /// ## Returns
    ///
    /// Number of snapshots removed with the owner
    ///
    /// ## Errors
    ///
    /// - `Store`: persistence failure; nothing is deleted
    pub fn destroy(self, db: &mut Database) -> Result<usize> {
        log_op_start!("destroy", owner = %self.record.display());
        let start = std::time::Instant::now();

        let removed = self.destroy_impl(db).map_err(|e| {
            log_op_error!(
                "destroy",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "destroy",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshots_removed = removed
        );

        Ok(removed)
    }

    fn destroy_impl(&self, db: &mut Database) -> Result<usize> {
        let Some(owner) = self.record.owner_key() else {
            return Ok(0);
        };
        db.transaction(TransactionBehavior::Immediate, |tx, _| -> Result<usize> {
            let removed = SnapshotRepo::delete_for_owner(tx, &owner)?;
            RecordRepo::delete(tx, &owner.kind, &owner.id)?;
            Ok(removed)
        })
    }

    /// Human label of the owner
    pub fn to_s(&self) -> String {
        self.record.display()
    }

    /// Validate, then write the record graph; a new record also gets its
    /// `create` snapshot in the same transaction
    ///
    /// Works on a copy so a rolled-back insert leaves `self` unsaved.
    fn persist(&mut self, db: &mut Database) -> Result<bool> {
        if !self.record.validate() {
            return Ok(false);
        }
        let mut working = self.record.clone();
        let created = working.is_new_record();
        let committer = self.committer.clone();

        db.transaction(TransactionBehavior::Immediate, |tx, _| -> Result<()> {
            RecordRepo::save_graph(tx, &mut working)?;
            if created {
                let owner = working.owner_key().ok_or_else(|| DraftlineError::Internal {
                    message: "record has no id after insert".to_string(),
                })?;
                let snapshot = Snapshot::new_create(owner, committer, versioned_attributes(&working));
                SnapshotRepo::insert(tx, &snapshot)?;
            }
            Ok(())
        })?;

        self.record = working;
        Ok(true)
    }

    fn persisted_key(&self) -> Result<OwnerKey> {
        self.record
            .owner_key()
            .ok_or_else(|| DraftlineError::RecordNotPersisted {
                owner: self.record.display(),
            })
    }
}

impl Versionable for LiveOwner {
    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn is_live(&self) -> bool {
        true
    }

    fn is_version(&self) -> bool {
        false
    }

    fn save(&mut self, db: &mut Database) -> Result<bool> {
        log_op_start!("save", owner = %self.record.display());
        let start = std::time::Instant::now();

        let saved = self.persist(db).map_err(|e| {
            log_op_error!(
                "save",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "save",
            duration_ms = start.elapsed().as_millis() as u64,
            saved = saved
        );

        Ok(saved)
    }

    fn update(&mut self, db: &mut Database, attrs: &AttributeMap) -> Result<bool> {
        self.record.assign_attributes(attrs)?;
        self.save(db)
    }

    fn reload(&mut self, db: &Database) -> Result<()> {
        let owner = self.persisted_key()?;
        self.record = RecordRepo::find(db.connection(), db.registry(), &owner.kind, &owner.id)?
            .ok_or(DraftlineError::RecordNotFound { owner })?;
        Ok(())
    }
}

impl PartialEq for LiveOwner {
    fn eq(&self, other: &Self) -> bool {
        self.record.owner_key().is_some() && self.record.owner_key() == other.record.owner_key()
    }
}

impl PartialEq<DraftProxy> for LiveOwner {
    fn eq(&self, other: &DraftProxy) -> bool {
        other == self
    }
}
