//! In-memory nested association assignment
//!
//! Applies a `<name>_attributes` payload to a record's loaded association.
//! Nothing is written here; the store reconciles the resulting graph when
//! the record is saved.
//!
//! - singular: a map whose `id` matches the loaded record updates it; a map
//!   without an id builds a replacement; a foreign id is not found
//! - plural: each element is upserted by `id`, elements without an id are
//!   appended, and a truthy `_destroy` marks the matched record for removal

use serde_json::Value;

use crate::errors::{DraftlineError, Result};
use crate::model::{AttributeMap, Record, Related};
use crate::registry::{AssociationDef, Cardinality, DESTROY_MARKER, ID_ATTRIBUTE};
use draftline_core_types::{OwnerKey, RecordId};

/// Apply one nested payload to `record`
///
/// # Errors
/// - `InvalidNestedAttributes` when the payload has the wrong shape
/// - `RecordNotFound` when an `id` does not match a loaded related record
pub fn assign_nested(record: &mut Record, assoc: &AssociationDef, value: &Value) -> Result<()> {
    if assoc.cardinality.is_singular() {
        match value {
            Value::Null => Ok(()),
            Value::Object(attrs) => assign_one(record, assoc, attrs),
            _ => Err(invalid(assoc, "expected a map")),
        }
    } else {
        let elements: Vec<&AttributeMap> = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_object().ok_or_else(|| invalid(assoc, "expected a list of maps")))
                .collect::<Result<_>>()?,
            // index-keyed form: { "0": {...}, "1": {...} }
            Value::Object(indexed) => indexed
                .values()
                .map(|item| item.as_object().ok_or_else(|| invalid(assoc, "expected a map of maps")))
                .collect::<Result<_>>()?,
            _ => return Err(invalid(assoc, "expected a list")),
        };
        assign_many(record, assoc, &elements)
    }
}

fn assign_one(record: &mut Record, assoc: &AssociationDef, attrs: &AttributeMap) -> Result<()> {
    let registry = record.registry.clone();
    let wanted = identity_of(attrs);
    let destroy = has_destroy_flag(attrs);

    let slot = record
        .associations
        .entry(assoc.name.clone())
        .or_insert(Related::One(None));
    let Related::One(current) = slot else {
        return Err(invalid(assoc, "association is not singular"));
    };

    match wanted {
        Some(id) => {
            let existing = current
                .as_deref_mut()
                .filter(|r| r.id.as_ref() == Some(&id))
                .ok_or_else(|| not_found(assoc, id.clone()))?;
            if destroy {
                existing.mark_for_destruction();
            } else {
                existing.assign_attributes(&strip_control_keys(attrs))?;
            }
            Ok(())
        }
        None if destroy => Ok(()),
        None => {
            let built = Record::build(registry, &assoc.target_kind, &strip_control_keys(attrs))?;
            let replaced = current.replace(Box::new(built));
            if let (Cardinality::HasOne { .. }, Some(old)) = (&assoc.cardinality, replaced) {
                if old.is_persisted() {
                    record.detached.push((assoc.name.clone(), *old));
                }
            }
            Ok(())
        }
    }
}

fn assign_many(record: &mut Record, assoc: &AssociationDef, elements: &[&AttributeMap]) -> Result<()> {
    let registry = record.registry.clone();
    let slot = record
        .associations
        .entry(assoc.name.clone())
        .or_insert_with(|| Related::Many(Vec::new()));
    let Related::Many(current) = slot else {
        return Err(invalid(assoc, "association is not plural"));
    };

    for attrs in elements {
        let destroy = has_destroy_flag(attrs);
        match identity_of(attrs) {
            Some(id) => {
                let existing = current
                    .iter_mut()
                    .find(|r| r.id.as_ref() == Some(&id))
                    .ok_or_else(|| not_found(assoc, id.clone()))?;
                if destroy {
                    existing.mark_for_destruction();
                } else {
                    existing.assign_attributes(&strip_control_keys(attrs))?;
                }
            }
            None if destroy => {}
            None => {
                let built =
                    Record::build(registry.clone(), &assoc.target_kind, &strip_control_keys(attrs))?;
                current.push(built);
            }
        }
    }
    Ok(())
}

/// Non-blank `id` carried by a nested map
fn identity_of(attrs: &AttributeMap) -> Option<RecordId> {
    match attrs.get(ID_ATTRIBUTE) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(RecordId::from_string(s.clone())),
        Some(Value::Number(n)) => Some(RecordId::from_string(n.to_string())),
        _ => None,
    }
}

/// Boolean-ish truth of `_destroy`: true, 1, "1", "true", "t", "on"
pub fn has_destroy_flag(attrs: &AttributeMap) -> bool {
    match attrs.get(DESTROY_MARKER) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "t" | "on"),
        _ => false,
    }
}

fn strip_control_keys(attrs: &AttributeMap) -> AttributeMap {
    attrs
        .iter()
        .filter(|(k, _)| k.as_str() != ID_ATTRIBUTE && k.as_str() != DESTROY_MARKER)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn invalid(assoc: &AssociationDef, reason: &str) -> DraftlineError {
    DraftlineError::InvalidNestedAttributes {
        association: assoc.name.clone(),
        reason: reason.to_string(),
    }
}

fn not_found(assoc: &AssociationDef, id: RecordId) -> DraftlineError {
    DraftlineError::RecordNotFound {
        owner: OwnerKey::new(assoc.target_kind.clone(), id),
    }
}
