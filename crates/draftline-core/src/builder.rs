//! Attribute snapshot builder
//!
//! Computes the map captured in a snapshot: a record's own versioned
//! attributes plus one level of nested association attributes.

use serde_json::Value;

use crate::model::{AttributeMap, Record, Related};
use crate::registry::DESTROY_MARKER;

/// Versioned attribute names of `record` mapped to their current values
pub fn self_attributes(record: &Record) -> AttributeMap {
    record
        .schema()
        .versioned_attribute_names()
        .into_iter()
        .map(|name| {
            let value = record.get(name).cloned().unwrap_or(Value::Null);
            (name.to_string(), value)
        })
        .collect()
}

/// One `<name>_attributes` entry per nested association with content
///
/// Singular associations with nothing related and empty plural
/// associations are omitted. Records marked for destruction carry
/// `"_destroy": true` so a later commit removes them.
pub fn nested_attributes(record: &Record) -> AttributeMap {
    let schema = record.schema();
    let mut out = AttributeMap::new();

    for name in schema.versioned_nested_attribute_names() {
        let Some(assoc) = schema.association(name) else {
            continue;
        };
        match record.related(name) {
            Some(Related::One(Some(related))) => {
                out.insert(assoc.nested_key(), Value::Object(captured(related)));
            }
            Some(Related::Many(related)) if !related.is_empty() => {
                let items = related
                    .iter()
                    .map(|r| Value::Object(captured(r)))
                    .collect();
                out.insert(assoc.nested_key(), Value::Array(items));
            }
            _ => {}
        }
    }

    out
}

/// `self_attributes ∪ nested_attributes`; the key sets are disjoint
pub fn versioned_attributes(record: &Record) -> AttributeMap {
    let mut map = self_attributes(record);
    map.extend(nested_attributes(record));
    map
}

fn captured(related: &Record) -> AttributeMap {
    let mut map = self_attributes(related);
    if related.is_marked_for_destruction() {
        map.insert(DESTROY_MARKER.to_string(), Value::Bool(true));
    }
    map
}
