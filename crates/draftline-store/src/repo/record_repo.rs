//! Domain record rows and nested graph reconciliation
//!
//! Every registered kind shares the `records` table; attributes are stored
//! as one JSON document. Associations are resolved through foreign keys
//! inside that document.

#![allow(clippy::result_large_err)]

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use draftline_core::errors::{ExError, ExErrorKind};
use draftline_core::model::{AttributeMap, Record, Related};
use draftline_core::registry::{Cardinality, SchemaRegistry, CREATED_AT, ID_ATTRIBUTE, UPDATED_AT};
use draftline_core_types::RecordId;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::errors::{corrupt_json, from_rusqlite, Result};

/// SQLite repository for domain records
pub struct RecordRepo;

impl RecordRepo {
    /// Insert a new record, assigning its id and timestamps
    pub fn insert(conn: &Connection, record: &mut Record) -> Result<()> {
        let id = record.id().cloned().unwrap_or_default();
        let now = Utc::now();
        if record.schema().has_timestamps() {
            let stamp = Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true));
            record.write_raw(CREATED_AT, stamp.clone());
            record.write_raw(UPDATED_AT, stamp);
        }

        conn.execute(
            "INSERT INTO records (id, kind, attributes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id.as_str(),
                record.kind(),
                encode_attributes(record)?,
                now.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )
        .map_err(from_rusqlite)?;

        record.set_identity(id);
        record.clear_changes();
        tracing::debug!(kind = record.kind(), id = ?record.id(), "record inserted");
        Ok(())
    }

    /// Rewrite the stored attributes of a persisted record, touching
    /// `updated_at`
    ///
    /// # Errors
    /// Returns `NotFound` if the record has no row.
    pub fn update(conn: &Connection, record: &mut Record) -> Result<()> {
        let id = record.id().cloned().ok_or_else(|| {
            ExError::new(ExErrorKind::RecordNotPersisted)
                .with_op("update_record")
                .with_message(format!("{} has no id", record.kind()))
        })?;
        let now = Utc::now();
        if record.schema().has_timestamps() {
            record.write_raw(
                UPDATED_AT,
                Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }

        let changed = conn
            .execute(
                "UPDATE records SET attributes = ?3, updated_at = ?4 WHERE id = ?1 AND kind = ?2",
                rusqlite::params![
                    id.as_str(),
                    record.kind(),
                    encode_attributes(record)?,
                    now.timestamp_millis(),
                ],
            )
            .map_err(from_rusqlite)?;
        if changed == 0 {
            return Err(ExError::new(ExErrorKind::NotFound)
                .with_op("update_record")
                .with_entity_id(format!("{}:{}", record.kind(), id))
                .with_message("record not found"));
        }

        record.clear_changes();
        tracing::debug!(kind = record.kind(), %id, "record updated");
        Ok(())
    }

    /// Load one row without associations
    pub fn find_row(
        conn: &Connection,
        registry: &Arc<SchemaRegistry>,
        kind: &str,
        id: &RecordId,
    ) -> Result<Option<Record>> {
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT id, attributes FROM records WHERE id = ?1 AND kind = ?2",
                rusqlite::params![id.as_str(), kind],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(from_rusqlite)?;

        row.map(|(id, attributes)| decode_row(registry, kind, id, &attributes))
            .transpose()
    }

    /// Load a record together with its nested associations
    pub fn find(
        conn: &Connection,
        registry: &Arc<SchemaRegistry>,
        kind: &str,
        id: &RecordId,
    ) -> Result<Option<Record>> {
        match Self::find_row(conn, registry, kind, id)? {
            Some(mut record) => {
                Self::load_associations(conn, &mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Rows of `kind` whose `foreign_key` attribute equals `value`, oldest first
    pub fn find_by_foreign_key(
        conn: &Connection,
        registry: &Arc<SchemaRegistry>,
        kind: &str,
        foreign_key: &str,
        value: &str,
    ) -> Result<Vec<Record>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, attributes FROM records
                 WHERE kind = ?1 AND json_extract(attributes, ?2) = ?3
                 ORDER BY created_at, rowid",
            )
            .map_err(from_rusqlite)?;

        let rows = stmt
            .query_map(
                rusqlite::params![kind, format!("$.{}", foreign_key), value],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        rows.into_iter()
            .map(|(id, attributes)| decode_row(registry, kind, id, &attributes))
            .collect()
    }

    /// Load every nested association of `record` one level deep
    pub fn load_associations(conn: &Connection, record: &mut Record) -> Result<()> {
        let Some(owner_id) = record.id().cloned() else {
            return Ok(());
        };
        let registry = record.registry().clone();
        let schema = record.schema().clone();

        for name in schema.versioned_nested_attribute_names() {
            let Some(assoc) = schema.association(name) else {
                continue;
            };
            let related = match &assoc.cardinality {
                Cardinality::BelongsTo { foreign_key } => {
                    let target = match record.get(foreign_key) {
                        Some(Value::String(fk)) => Self::find_row(
                            conn,
                            &registry,
                            &assoc.target_kind,
                            &RecordId::from_string(fk.clone()),
                        )?,
                        _ => None,
                    };
                    Related::One(target.map(Box::new))
                }
                Cardinality::HasOne { foreign_key } => {
                    let mut found = Self::find_by_foreign_key(
                        conn,
                        &registry,
                        &assoc.target_kind,
                        foreign_key,
                        owner_id.as_str(),
                    )?;
                    Related::One(if found.is_empty() {
                        None
                    } else {
                        Some(Box::new(found.remove(0)))
                    })
                }
                Cardinality::HasMany { foreign_key } => Related::Many(Self::find_by_foreign_key(
                    conn,
                    &registry,
                    &assoc.target_kind,
                    foreign_key,
                    owner_id.as_str(),
                )?),
            };
            record.set_related(name.clone(), related);
        }
        Ok(())
    }

    pub fn exists(conn: &Connection, kind: &str, id: &RecordId) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM records WHERE id = ?1 AND kind = ?2",
                rusqlite::params![id.as_str(), kind],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        Ok(found.is_some())
    }

    pub fn count(conn: &Connection, kind: &str) -> Result<usize> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE kind = ?1",
                [kind],
                |row| row.get(0),
            )
            .map_err(from_rusqlite)?;
        Ok(count as usize)
    }

    /// Delete one row; returns whether it existed
    pub fn delete(conn: &Connection, kind: &str, id: &RecordId) -> Result<bool> {
        let removed = conn
            .execute(
                "DELETE FROM records WHERE id = ?1 AND kind = ?2",
                rusqlite::params![id.as_str(), kind],
            )
            .map_err(from_rusqlite)?;
        tracing::debug!(kind, %id, removed, "record deleted");
        Ok(removed > 0)
    }

    /// Persist a record and its loaded associations
    ///
    /// Order of writes:
    /// 1. belongs_to targets (the owner's foreign key is set from them)
    /// 2. the owner row, inserted when new, updated when changed
    /// 3. has_one / has_many children, with their foreign key set to the owner
    /// 4. replaced has_one records, whose foreign key is cleared
    /// 5. belongs_to targets marked for destruction
    ///
    /// Children marked for destruction are deleted and dropped from the
    /// loaded association. Run inside a transaction; a failure part way
    /// leaves partial writes that only a rollback undoes.
    pub fn save_graph(conn: &Connection, record: &mut Record) -> Result<()> {
        let schema = record.schema().clone();
        let mut doomed: Vec<(String, RecordId)> = Vec::new();

        for assoc in schema.associations() {
            let Cardinality::BelongsTo { foreign_key } = &assoc.cardinality else {
                continue;
            };
            let fk_value = match record.related_mut(&assoc.name) {
                Some(Related::One(Some(target))) if target.is_marked_for_destruction() => {
                    if let Some(id) = target.id() {
                        doomed.push((assoc.target_kind.clone(), id.clone()));
                    }
                    None
                }
                Some(Related::One(Some(target))) => {
                    Self::save_graph(conn, target)?;
                    Some(target.id().map(|id| Value::String(id.to_string())))
                }
                _ => continue,
            };
            match fk_value {
                Some(value) => {
                    record.write_foreign_key(foreign_key, value.unwrap_or(Value::Null));
                }
                None => {
                    record.write_foreign_key(foreign_key, Value::Null);
                    record.set_related(assoc.name.clone(), Related::One(None));
                }
            }
        }

        if record.is_new_record() {
            Self::insert(conn, record)?;
        } else if record.is_changed() {
            Self::update(conn, record)?;
        }

        let owner_id = record
            .id()
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null);

        for assoc in schema.associations() {
            let foreign_key = match &assoc.cardinality {
                Cardinality::BelongsTo { .. } => continue,
                Cardinality::HasOne { foreign_key } | Cardinality::HasMany { foreign_key } => {
                    foreign_key
                }
            };
            match record.related_mut(&assoc.name) {
                Some(Related::One(slot)) => {
                    let destroy = slot.as_ref().is_some_and(|c| c.is_marked_for_destruction());
                    if destroy {
                        if let Some(child) = slot.take() {
                            Self::destroy_child(conn, &child)?;
                        }
                    } else if let Some(child) = slot.as_deref_mut() {
                        Self::save_child(conn, child, foreign_key, &owner_id)?;
                    }
                }
                Some(Related::Many(children)) => {
                    for child in children.iter_mut() {
                        if child.is_marked_for_destruction() {
                            Self::destroy_child(conn, child)?;
                        } else {
                            Self::save_child(conn, child, foreign_key, &owner_id)?;
                        }
                    }
                    children.retain(|c| !c.is_marked_for_destruction());
                }
                None => {}
            }
        }

        for (name, mut old) in record.take_detached() {
            if let Some(assoc) = schema.association(&name) {
                old.write_foreign_key(assoc.cardinality.foreign_key(), Value::Null);
                Self::update(conn, &mut old)?;
            }
        }

        for (kind, id) in doomed {
            Self::delete(conn, &kind, &id)?;
        }

        record.clear_changes();
        Ok(())
    }

    fn save_child(
        conn: &Connection,
        child: &mut Record,
        foreign_key: &str,
        owner_id: &Value,
    ) -> Result<()> {
        child.write_foreign_key(foreign_key, owner_id.clone());
        if child.is_new_record() || child.is_changed() || !child.associations().is_empty() {
            Self::save_graph(conn, child)?;
        }
        Ok(())
    }

    fn destroy_child(conn: &Connection, child: &Record) -> Result<()> {
        if let Some(id) = child.id() {
            Self::delete(conn, child.kind(), id)?;
        }
        Ok(())
    }
}

fn encode_attributes(record: &Record) -> Result<String> {
    let stored: AttributeMap = record
        .attributes()
        .iter()
        .filter(|(name, _)| name.as_str() != ID_ATTRIBUTE)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    serde_json::to_string(&stored).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("encode_record")
            .with_message(e.to_string())
    })
}

fn decode_row(
    registry: &Arc<SchemaRegistry>,
    kind: &str,
    id: String,
    attributes: &str,
) -> Result<Record> {
    let stored: AttributeMap =
        serde_json::from_str(attributes).map_err(|e| corrupt_json("decode_record", &id, e))?;
    let record = Record::hydrate(registry.clone(), kind, RecordId::from_string(id), &stored)?;
    Ok(record)
}
