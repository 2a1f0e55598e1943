//! Draft editing proxy
//!
//! A `DraftProxy` stands in for the live owner while a draft is edited.
//! It holds a reified copy of the owner: attribute writes stay in memory,
//! `save` writes the captured attributes into the draft snapshot only, and
//! `commit` finalizes the snapshot and applies the same map to the live
//! owner in one transaction.
//!
//! ## Logging Ownership
//!
//! The engine layer owns lifecycle logging for draft operations:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal details.

#![allow(clippy::result_large_err)]

use draftline_core::{
    log_op_end, log_op_error, log_op_start, versioned_attributes, AttributeMap, CommitParams,
    DraftlineError, Record, Result, Snapshot,
};
use draftline_core_types::{OwnerKey, SnapshotId};
use draftline_store::{Database, RecordRepo, SnapshotRepo, TransactionBehavior};
use rusqlite::Connection;

use crate::live_owner::LiveOwner;
use crate::reify::reify;
use crate::versionable::Versionable;

/// Editable stand-in for a live owner, backed by its draft snapshot
#[derive(Debug, Clone)]
pub struct DraftProxy {
    snapshot_id: SnapshotId,
    owner: OwnerKey,
    record: Record,
    committer: Option<String>,
}

impl DraftProxy {
    /// Reify `snapshot` into a new proxy
    ///
    /// ## Errors
    ///
    /// See [`reify`].
    pub fn from_snapshot(db: &Database, snapshot: &Snapshot, committer: Option<String>) -> Result<Self> {
        let record = reify(db, snapshot)?;
        Ok(Self {
            snapshot_id: snapshot.id.clone(),
            owner: snapshot.owner.clone(),
            record,
            committer,
        })
    }

    pub fn snapshot_id(&self) -> &SnapshotId {
        &self.snapshot_id
    }

    pub fn owner(&self) -> &OwnerKey {
        &self.owner
    }

    pub fn committer(&self) -> Option<&str> {
        self.committer.as_deref()
    }

    /// Identity stored on the snapshot by the next save or commit
    pub fn set_committer(&mut self, committer: Option<String>) {
        self.committer = committer;
    }

    /// Current stored state of the held snapshot
    ///
    /// # Errors
    /// Returns `SnapshotNotFound` once the draft has been destroyed.
    pub fn snapshot(&self, db: &Database) -> Result<Snapshot> {
        SnapshotRepo::find_for_owner(db.connection(), &self.owner, &self.snapshot_id)?
            .ok_or_else(|| self.not_found())
    }

    /// Whether the held snapshot is still a draft in storage
    ///
    /// # Errors
    /// Returns `SnapshotNotFound` once the draft has been destroyed.
    pub fn is_draft(&self, db: &Database) -> Result<bool> {
        Ok(self.snapshot(db)?.is_draft())
    }

    /// Finalize the draft and apply it to the live owner
    ///
    /// In one IMMEDIATE transaction: the captured attributes are written to
    /// the snapshot with `draft=false`, `event=commit` and `committed_at=now`
    /// (then `params` overrides), and the same map is assigned to a freshly
    /// loaded live owner which is validated and saved with its nested graph.
    ///
    /// ## Returns
    ///
    /// The committed snapshot
    ///
    /// ## Errors
    ///
    /// - `InvalidVersion`: the snapshot is no longer a draft
    /// - `SnapshotNotFound`: the draft was destroyed
    /// - `RecordInvalid`: the live owner fails validation after assignment
    /// - `Store`: persistence failure; nothing is written
    pub fn commit(&mut self, db: &mut Database, params: &CommitParams) -> Result<Snapshot> {
        log_op_start!("commit", owner = %self.owner, snapshot_id = %self.snapshot_id);
        let start = std::time::Instant::now();

        let committed = self.commit_impl(db, params).map_err(|e| {
            log_op_error!(
                "commit",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "commit",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshot_id = %committed.id
        );

        Ok(committed)
    }

    fn commit_impl(&mut self, db: &mut Database, params: &CommitParams) -> Result<Snapshot> {
        let object = versioned_attributes(&self.record);
        let committer = self.committer.clone();
        let (id, owner) = (&self.snapshot_id, &self.owner);

        db.transaction(TransactionBehavior::Immediate, |tx, registry| -> Result<Snapshot> {
            let mut snapshot = load_draft(tx, owner, id)?;
            snapshot.committer = committer;
            snapshot.apply_commit(object.clone(), params);
            SnapshotRepo::update(tx, &snapshot)?;

            let mut live = RecordRepo::find(tx, registry, &owner.kind, &owner.id)?
                .ok_or_else(|| DraftlineError::RecordNotFound { owner: owner.clone() })?;
            live.assign_attributes(&object)?;
            if !live.validate() {
                return Err(DraftlineError::RecordInvalid {
                    record: Box::new(live),
                });
            }
            RecordRepo::save_graph(tx, &mut live)?;
            Ok(snapshot)
        })
    }

    fn save_impl(&mut self, db: &mut Database) -> Result<bool> {
        if !self.record.validate() {
            return Ok(false);
        }
        let object = versioned_attributes(&self.record);
        let committer = self.committer.clone();
        let (id, owner) = (&self.snapshot_id, &self.owner);

        db.transaction(TransactionBehavior::Immediate, |tx, _| -> Result<bool> {
            let mut snapshot = load_draft(tx, owner, id)?;
            snapshot.object = object;
            snapshot.committer = committer;
            snapshot.updated_at = chrono::Utc::now();
            SnapshotRepo::update(tx, &snapshot)?;
            Ok(true)
        })
    }

    fn ensure_draft(&self, db: &Database) -> Result<()> {
        load_draft(db.connection(), &self.owner, &self.snapshot_id).map(|_| ())
    }

    fn not_found(&self) -> DraftlineError {
        DraftlineError::SnapshotNotFound {
            snapshot_id: self.snapshot_id.clone(),
            owner: self.owner.clone(),
        }
    }
}

/// The held snapshot, provided it is still a draft
fn load_draft(conn: &Connection, owner: &OwnerKey, id: &SnapshotId) -> Result<Snapshot> {
    let snapshot = SnapshotRepo::find_for_owner(conn, owner, id)?.ok_or_else(|| {
        DraftlineError::SnapshotNotFound {
            snapshot_id: id.clone(),
            owner: owner.clone(),
        }
    })?;
    if !snapshot.is_draft() {
        return Err(DraftlineError::InvalidVersion {
            snapshot_id: id.clone(),
        });
    }
    Ok(snapshot)
}

impl Versionable for DraftProxy {
    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn is_live(&self) -> bool {
        false
    }

    fn is_version(&self) -> bool {
        true
    }

    /// Validate the reified owner and write its captured attributes into
    /// the draft snapshot; the live owner is untouched
    fn save(&mut self, db: &mut Database) -> Result<bool> {
        log_op_start!("save", owner = %self.owner, snapshot_id = %self.snapshot_id);
        let start = std::time::Instant::now();

        let saved = self.save_impl(db).map_err(|e| {
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
        self.ensure_draft(db)?;
        self.record.assign_attributes(attrs)?;
        self.save(db)
    }

    fn reload(&mut self, db: &Database) -> Result<()> {
        let snapshot = self.snapshot(db)?;
        self.record = reify(db, &snapshot)?;
        Ok(())
    }
}

impl PartialEq for DraftProxy {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
    }
}

impl PartialEq<LiveOwner> for DraftProxy {
    fn eq(&self, other: &LiveOwner) -> bool {
        other.owner_key().as_ref() == Some(&self.owner)
    }
}
