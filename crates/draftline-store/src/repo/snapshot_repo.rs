//! Snapshot rows
//!
//! Snapshots are addressed by their owner's polymorphic key and listed
//! newest first (`created_at DESC`, insertion order breaking ties).

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use draftline_core::model::{AttributeMap, Event, Snapshot, SnapshotFilter};
use draftline_core_types::{OwnerKey, RecordId, SnapshotId};
use rusqlite::{Connection, OptionalExtension};

use crate::errors::{corrupt_json, corrupt_timestamp, from_rusqlite, Result};
use draftline_core::errors::{ExError, ExErrorKind};

const COLUMNS: &str = "id, owner_type, owner_id, event, committer, object, draft, \
                       commit_message, committed_at, created_at, updated_at";

/// Raw `snapshots` row before decoding
struct SnapshotRow {
    id: String,
    owner_type: String,
    owner_id: String,
    event: String,
    committer: Option<String>,
    object: String,
    draft: bool,
    commit_message: Option<String>,
    committed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        id: row.get(0)?,
        owner_type: row.get(1)?,
        owner_id: row.get(2)?,
        event: row.get(3)?,
        committer: row.get(4)?,
        object: row.get(5)?,
        draft: row.get(6)?,
        commit_message: row.get(7)?,
        committed_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn millis_to_utc(op: &str, id: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| corrupt_timestamp(op, id, millis))
}

impl SnapshotRow {
    fn decode(self) -> Result<Snapshot> {
        const OP: &str = "decode_snapshot";
        let object: AttributeMap =
            serde_json::from_str(&self.object).map_err(|e| corrupt_json(OP, &self.id, e))?;
        let event: Event = self.event.parse().map_err(ExError::from)?;
        let committed_at = self
            .committed_at
            .map(|ms| millis_to_utc(OP, &self.id, ms))
            .transpose()?;

        Ok(Snapshot {
            created_at: millis_to_utc(OP, &self.id, self.created_at)?,
            updated_at: millis_to_utc(OP, &self.id, self.updated_at)?,
            owner: OwnerKey::new(self.owner_type, RecordId::from_string(self.owner_id)),
            id: SnapshotId::from_string(self.id),
            event,
            committer: self.committer,
            object,
            draft: self.draft,
            commit_message: self.commit_message,
            committed_at,
        })
    }
}

fn encode_object(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string(&snapshot.object).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("encode_snapshot")
            .with_snapshot_id(snapshot.id.to_string())
            .with_message(e.to_string())
    })
}

/// SQLite repository for snapshots
pub struct SnapshotRepo;

impl SnapshotRepo {
    pub fn insert(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
        conn.execute(
            "INSERT INTO snapshots (id, owner_type, owner_id, event, committer, object, draft,
                                    commit_message, committed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                snapshot.id.as_str(),
                snapshot.owner.kind,
                snapshot.owner.id.as_str(),
                snapshot.event.as_str(),
                snapshot.committer,
                encode_object(snapshot)?,
                snapshot.draft,
                snapshot.commit_message,
                snapshot.committed_at.map(|at| at.timestamp_millis()),
                snapshot.created_at.timestamp_millis(),
                snapshot.updated_at.timestamp_millis(),
            ],
        )
        .map_err(from_rusqlite)?;

        tracing::debug!(snapshot_id = %snapshot.id, owner = %snapshot.owner, event = snapshot.event.as_str(), "snapshot inserted");
        Ok(())
    }

    /// Write every mutable column of an existing snapshot
    ///
    /// # Errors
    /// Returns `NotFound` if no row has the snapshot's id.
    pub fn update(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
        let changed = conn
            .execute(
                "UPDATE snapshots
                 SET event = ?2, committer = ?3, object = ?4, draft = ?5,
                     commit_message = ?6, committed_at = ?7, updated_at = ?8
                 WHERE id = ?1",
                rusqlite::params![
                    snapshot.id.as_str(),
                    snapshot.event.as_str(),
                    snapshot.committer,
                    encode_object(snapshot)?,
                    snapshot.draft,
                    snapshot.commit_message,
                    snapshot.committed_at.map(|at| at.timestamp_millis()),
                    snapshot.updated_at.timestamp_millis(),
                ],
            )
            .map_err(from_rusqlite)?;

        if changed == 0 {
            return Err(ExError::new(ExErrorKind::NotFound)
                .with_op("update_snapshot")
                .with_snapshot_id(snapshot.id.to_string())
                .with_message("snapshot not found"));
        }
        tracing::debug!(snapshot_id = %snapshot.id, draft = snapshot.draft, "snapshot updated");
        Ok(())
    }

    pub fn find(conn: &Connection, id: &SnapshotId) -> Result<Option<Snapshot>> {
        conn.query_row(
            &format!("SELECT {} FROM snapshots WHERE id = ?1", COLUMNS),
            [id.as_str()],
            read_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .map(SnapshotRow::decode)
        .transpose()
    }

    /// Snapshot `id` only if it belongs to `owner`
    pub fn find_for_owner(
        conn: &Connection,
        owner: &OwnerKey,
        id: &SnapshotId,
    ) -> Result<Option<Snapshot>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM snapshots WHERE id = ?1 AND owner_type = ?2 AND owner_id = ?3",
                COLUMNS
            ),
            rusqlite::params![id.as_str(), owner.kind, owner.id.as_str()],
            read_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .map(SnapshotRow::decode)
        .transpose()
    }

    /// Newest draft of `owner`, if any
    pub fn find_draft(conn: &Connection, owner: &OwnerKey) -> Result<Option<Snapshot>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM snapshots
                 WHERE owner_type = ?1 AND owner_id = ?2 AND draft = 1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                COLUMNS
            ),
            rusqlite::params![owner.kind, owner.id.as_str()],
            read_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .map(SnapshotRow::decode)
        .transpose()
    }

    /// Return the owner's draft, inserting `build()` when there is none
    ///
    /// Callers run this inside an IMMEDIATE transaction so the lookup and
    /// the insert hold the write lock together. Returns the snapshot and
    /// whether it was created.
    pub fn find_or_create_draft<F>(
        conn: &Connection,
        owner: &OwnerKey,
        build: F,
    ) -> Result<(Snapshot, bool)>
    where
        F: FnOnce() -> Snapshot,
    {
        if let Some(existing) = Self::find_draft(conn, owner)? {
            return Ok((existing, false));
        }
        let snapshot = build();
        Self::insert(conn, &snapshot)?;
        Ok((snapshot, true))
    }

    /// History of `owner`, newest first
    pub fn list_for_owner(
        conn: &Connection,
        owner: &OwnerKey,
        filter: SnapshotFilter,
    ) -> Result<Vec<Snapshot>> {
        let predicate = match filter {
            SnapshotFilter::All => "",
            SnapshotFilter::Draft => " AND draft = 1",
            SnapshotFilter::Committed => " AND draft = 0",
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM snapshots
                 WHERE owner_type = ?1 AND owner_id = ?2{}
                 ORDER BY created_at DESC, rowid DESC",
                COLUMNS, predicate
            ))
            .map_err(from_rusqlite)?;

        let rows = stmt
            .query_map(rusqlite::params![owner.kind, owner.id.as_str()], read_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        rows.into_iter().map(SnapshotRow::decode).collect()
    }

    pub fn count_for_owner(conn: &Connection, owner: &OwnerKey) -> Result<usize> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM snapshots WHERE owner_type = ?1 AND owner_id = ?2",
                rusqlite::params![owner.kind, owner.id.as_str()],
                |row| row.get(0),
            )
            .map_err(from_rusqlite)?;
        Ok(count as usize)
    }

    pub fn has_draft(conn: &Connection, owner: &OwnerKey) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM snapshots
                 WHERE owner_type = ?1 AND owner_id = ?2 AND draft = 1
                 LIMIT 1",
                rusqlite::params![owner.kind, owner.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        Ok(found.is_some())
    }

    /// Delete every draft of `owner`; returns the number removed
    pub fn delete_drafts(conn: &Connection, owner: &OwnerKey) -> Result<usize> {
        let removed = conn
            .execute(
                "DELETE FROM snapshots WHERE owner_type = ?1 AND owner_id = ?2 AND draft = 1",
                rusqlite::params![owner.kind, owner.id.as_str()],
            )
            .map_err(from_rusqlite)?;
        tracing::debug!(owner = %owner, removed, "drafts deleted");
        Ok(removed)
    }

    /// Delete the whole history of `owner`; returns the number removed
    pub fn delete_for_owner(conn: &Connection, owner: &OwnerKey) -> Result<usize> {
        let removed = conn
            .execute(
                "DELETE FROM snapshots WHERE owner_type = ?1 AND owner_id = ?2",
                rusqlite::params![owner.kind, owner.id.as_str()],
            )
            .map_err(from_rusqlite)?;
        tracing::debug!(owner = %owner, removed, "snapshots deleted");
        Ok(removed)
    }
}
