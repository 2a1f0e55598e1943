//! Schema compatibility diagnostics for historical snapshots

use crate::model::AttributeMap;
use crate::registry::OwnerSchema;

/// Keys of `object` absent from the schema's current full attribute set,
/// in the order they appear in `object`
pub fn incompatible_attributes(schema: &OwnerSchema, object: &AttributeMap) -> Vec<String> {
    let current = schema.full_attribute_names();
    object
        .keys()
        .filter(|key| !current.iter().any(|name| name == *key))
        .cloned()
        .collect()
}

/// English list: "", "a", "a and b", "a, b, and c"
pub fn to_sentence(words: &[String]) -> String {
    match words {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}
