use serde_json::Value;

use crate::model::{Record, Related, ValidationError};
use crate::registry::Validation;

pub const BLANK: &str = "can't be blank";

/// Validate a record and the related records it would save
///
/// Checks run in this order:
/// 1. Declared type of every non-null attribute
/// 2. Presence validations declared on the schema
/// 3. The same checks on loaded related records that are new or changed
///    (records marked for destruction are skipped); their errors are
///    reported as `<association>.<attribute>`
///
/// # Returns
/// Every error found, in check order. Empty means valid.
pub fn validate_record(record: &Record) -> Vec<ValidationError> {
    let mut errors = own_errors(record);

    for (name, related) in record.associations() {
        let candidates: Vec<&Record> = match related {
            Related::One(Some(r)) => vec![r.as_ref()],
            Related::One(None) => Vec::new(),
            Related::Many(rs) => rs.iter().collect(),
        };
        for child in candidates {
            if child.is_marked_for_destruction() {
                continue;
            }
            if !(child.is_new_record() || child.is_changed()) {
                continue;
            }
            errors.extend(own_errors(child).into_iter().map(|e| {
                ValidationError::new(format!("{}.{}", name, e.attribute), e.message)
            }));
        }
    }

    errors
}

fn own_errors(record: &Record) -> Vec<ValidationError> {
    let schema = record.schema();
    let mut errors = Vec::new();

    for (name, value) in record.attributes() {
        if let Some(ty) = schema.attribute_type(name) {
            if !ty.accepts(value) {
                errors.push(ValidationError::new(
                    name.clone(),
                    format!("is not a valid {}", ty.as_str()),
                ));
            }
        }
    }

    for validation in schema.validations() {
        match validation {
            Validation::Presence(attr) => {
                if is_blank(record.get(attr)) {
                    errors.push(ValidationError::new(attr.clone(), BLANK));
                }
            }
        }
    }

    errors
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AttributeType, OwnerSchema, SchemaRegistry};
    use draftline_core_types::RecordId;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> Arc<SchemaRegistry> {
        SchemaRegistry::builder()
            .register(
                OwnerSchema::new("user")
                    .attribute("name", AttributeType::String)
                    .validates_presence_of("name"),
            )
            .register(
                OwnerSchema::new("post")
                    .attribute("title", AttributeType::String)
                    .attribute("rating", AttributeType::Integer)
                    .attribute("user_id", AttributeType::Reference)
                    .belongs_to("author", "user", "user_id")
                    .nested("author")
                    .validates_presence_of("title"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_blank_string_fails_presence() {
        let mut post = Record::new(registry(), "post").unwrap();
        post.set("title", json!("   ")).unwrap();
        let errors = validate_record(&post);
        assert_eq!(errors, vec![ValidationError::new("title", BLANK)]);
    }

    #[test]
    fn test_type_mismatch_reported() {
        let mut post = Record::new(registry(), "post").unwrap();
        post.set("title", json!("So Post")).unwrap();
        post.set("rating", json!("five")).unwrap();
        let errors = validate_record(&post);
        assert_eq!(
            errors,
            vec![ValidationError::new("rating", "is not a valid integer")]
        );
    }

    #[test]
    fn test_new_related_record_errors_are_prefixed() {
        let mut post = Record::new(registry(), "post").unwrap();
        post.set("title", json!("So Post")).unwrap();
        let author = Record::new(post.registry().clone(), "user").unwrap();
        post.set_related("author", Related::One(Some(Box::new(author))));

        let errors = validate_record(&post);
        assert_eq!(errors, vec![ValidationError::new("author.name", BLANK)]);
    }

    #[test]
    fn test_unchanged_persisted_related_record_is_skipped() {
        let reg = registry();
        let mut post = Record::new(reg.clone(), "post").unwrap();
        post.set("title", json!("So Post")).unwrap();
        let author = Record::hydrate(
            reg,
            "user",
            RecordId::from_string("u-1".to_string()),
            &serde_json::Map::new(),
        )
        .unwrap();
        post.set_related("author", Related::One(Some(Box::new(author))));

        assert!(validate_record(&post).is_empty());
    }
}
