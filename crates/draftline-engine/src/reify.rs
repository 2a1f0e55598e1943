//! Reconstruct an owner from a snapshot
//!
//! The owner is loaded fresh from storage and the snapshot's object is laid
//! over it. Keys the current schema no longer declares are dropped without
//! complaint; restoring through `VersionManager` is the path that rejects
//! them.

#![allow(clippy::result_large_err)]

use draftline_core::registry::{OwnerSchema, DESTROY_MARKER, ID_ATTRIBUTE};
use draftline_core::{AttributeMap, DraftlineError, Record, Result, Snapshot};
use draftline_store::{Database, RecordRepo};
use serde_json::Value;

/// Fresh, distinct in-memory owner carrying the snapshot's attributes
///
/// ## Errors
///
/// - `RecordNotFound`: the owner row no longer exists
/// - `UnknownKind`: the owner kind is not registered
/// - `RecordNotFound` / `InvalidNestedAttributes`: a nested entry names a
///   related record the owner no longer has, or has the wrong shape
pub fn reify(db: &Database, snapshot: &Snapshot) -> Result<Record> {
    let owner = &snapshot.owner;
    let mut record = RecordRepo::find(db.connection(), db.registry(), &owner.kind, &owner.id)?
        .ok_or_else(|| DraftlineError::RecordNotFound {
            owner: owner.clone(),
        })?;
    let schema = record.schema().clone();

    let versioned = schema.versioned_attribute_names();
    let own: AttributeMap = snapshot
        .object
        .iter()
        .filter(|(key, _)| versioned.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    record.assign_attributes(&own)?;

    for name in schema.versioned_nested_attribute_names() {
        let Some(assoc) = schema.nested_association(name) else {
            continue;
        };
        let key = assoc.nested_key();
        let Some(payload) = snapshot.object.get(&key).filter(|v| is_present(v)) else {
            continue;
        };
        let target = db.registry().schema(&assoc.target_kind)?;
        let mut nested = AttributeMap::new();
        let restricted = if assoc.cardinality.is_singular() {
            restrict(payload, &target)
        } else {
            restrict_each(payload, &target)
        };
        nested.insert(key, restricted);
        record.assign_attributes(&nested)?;
    }

    tracing::debug!(owner = %owner, snapshot_id = %snapshot.id, "snapshot reified");
    Ok(record)
}

/// Null, empty maps and empty lists carry nothing to apply
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Keep only keys the related schema still declares
fn restrict(payload: &Value, target: &OwnerSchema) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| {
                    k.as_str() == ID_ATTRIBUTE
                        || k.as_str() == DESTROY_MARKER
                        || target.has_attribute(k)
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// `restrict` applied to every element of a list or index-keyed map
fn restrict_each(payload: &Value, target: &OwnerSchema) -> Value {
    match payload {
        Value::Array(items) => Value::Array(items.iter().map(|i| restrict(i, target)).collect()),
        Value::Object(indexed) => Value::Object(
            indexed
                .iter()
                .map(|(k, v)| (k.clone(), restrict(v, target)))
                .collect(),
        ),
        other => other.clone(),
    }
}
