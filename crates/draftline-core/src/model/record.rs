use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use draftline_core_types::{OwnerKey, RecordId};
use serde_json::Value;

use super::AttributeMap;
use crate::errors::{DraftlineError, Result};
use crate::nested;
use crate::registry::{Cardinality, OwnerSchema, SchemaRegistry, ID_ATTRIBUTE, NESTED_SUFFIX};
use crate::rules;

/// Loaded state of one association
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// belongs_to / has_one; `None` when nothing is associated
    One(Option<Box<Record>>),
    /// has_many, in load order
    Many(Vec<Record>),
}

/// One failed validation on a record or one of its related records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Attribute name; `<association>.<attribute>` for related records
    pub attribute: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// `author.first_name` + "can't be blank" -> "Author first name can't be blank"
    pub fn full_message(&self) -> String {
        let label = self.attribute.replace(['.', '_'], " ");
        let mut chars = label.chars();
        let label = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{} {}", label, self.message)
    }
}

/// In-memory domain record of a registered kind
///
/// Attributes are held in schema order; every declared attribute is present
/// (null until assigned). Only nested associations are ever loaded.
#[derive(Clone)]
pub struct Record {
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) schema: Arc<OwnerSchema>,
    pub(crate) id: Option<RecordId>,
    pub(crate) attributes: AttributeMap,
    pub(crate) associations: BTreeMap<String, Related>,
    pub(crate) errors: Vec<ValidationError>,
    pub(crate) changed: BTreeSet<String>,
    pub(crate) marked_for_destruction: bool,
    pub(crate) detached: Vec<(String, Record)>,
}

impl Record {
    /// Blank, unpersisted record of `kind`
    ///
    /// # Errors
    /// Returns `UnknownKind` if `kind` is not registered.
    pub fn new(registry: Arc<SchemaRegistry>, kind: &str) -> Result<Self> {
        let schema = registry.schema(kind)?;
        let attributes = schema
            .attribute_names()
            .into_iter()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        Ok(Self {
            registry,
            schema,
            id: None,
            attributes,
            associations: BTreeMap::new(),
            errors: Vec::new(),
            changed: BTreeSet::new(),
            marked_for_destruction: false,
            detached: Vec::new(),
        })
    }

    /// Rebuild a persisted record from stored attributes
    ///
    /// Stored keys that the schema no longer declares are dropped.
    pub fn hydrate(
        registry: Arc<SchemaRegistry>,
        kind: &str,
        id: RecordId,
        stored: &AttributeMap,
    ) -> Result<Self> {
        let mut record = Self::new(registry, kind)?;
        for (name, slot) in record.attributes.iter_mut() {
            if name == ID_ATTRIBUTE {
                continue;
            }
            if let Some(value) = stored.get(name) {
                *slot = value.clone();
            }
        }
        record.set_identity(id);
        Ok(record)
    }

    /// Build a record and assign `attrs`
    pub fn build(registry: Arc<SchemaRegistry>, kind: &str, attrs: &AttributeMap) -> Result<Self> {
        let mut record = Self::new(registry, kind)?;
        record.assign_attributes(attrs)?;
        Ok(record)
    }

    pub fn kind(&self) -> &str {
        self.schema.kind()
    }

    pub fn schema(&self) -> &Arc<OwnerSchema> {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    /// Polymorphic key of a persisted record
    pub fn owner_key(&self) -> Option<OwnerKey> {
        self.id
            .as_ref()
            .map(|id| OwnerKey::new(self.kind(), id.clone()))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Write one attribute in memory
    ///
    /// Writes to `id` are ignored; identity is assigned by the store.
    /// Changing a belongs_to foreign key unloads that association.
    ///
    /// # Errors
    /// Returns `UnknownAttribute` if the schema does not declare `name`.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if name == ID_ATTRIBUTE {
            return Ok(());
        }
        let slot = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| DraftlineError::UnknownAttribute {
                kind: self.schema.kind().to_string(),
                attribute: name.to_string(),
            })?;
        if *slot == value {
            return Ok(());
        }
        *slot = value;
        self.changed.insert(name.to_string());

        let stale: Vec<String> = self
            .schema
            .associations()
            .iter()
            .filter(|a| matches!(&a.cardinality, Cardinality::BelongsTo { foreign_key } if foreign_key == name))
            .map(|a| a.name.clone())
            .collect();
        for assoc in stale {
            self.associations.remove(&assoc);
        }
        Ok(())
    }

    /// Assign a flat attribute map, routing `<name>_attributes` keys to
    /// nested assignment
    ///
    /// # Errors
    /// - `UnknownAttribute` for keys the schema does not declare
    /// - `UnknownAssociation` for nested keys naming no nested association
    /// - `InvalidNestedAttributes` / `RecordNotFound` from nested assignment
    pub fn assign_attributes(&mut self, attrs: &AttributeMap) -> Result<()> {
        for (key, value) in attrs {
            if key == ID_ATTRIBUTE {
                continue;
            }
            if self.attributes.contains_key(key) {
                self.set(key, value.clone())?;
                continue;
            }
            match key.strip_suffix(NESTED_SUFFIX) {
                Some(name) => {
                    let assoc = self
                        .schema
                        .nested_association(name)
                        .cloned()
                        .ok_or_else(|| DraftlineError::UnknownAssociation {
                            kind: self.schema.kind().to_string(),
                            association: name.to_string(),
                        })?;
                    nested::assign_nested(self, &assoc, value)?;
                }
                None => {
                    return Err(DraftlineError::UnknownAttribute {
                        kind: self.schema.kind().to_string(),
                        attribute: key.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    // ----- associations -----

    pub fn associations(&self) -> &BTreeMap<String, Related> {
        &self.associations
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.associations.get(name)
    }

    /// Loaded singular related record, if any
    pub fn related_one(&self, name: &str) -> Option<&Record> {
        match self.associations.get(name) {
            Some(Related::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// Loaded plural related records; empty when not loaded
    pub fn related_many(&self, name: &str) -> &[Record] {
        match self.associations.get(name) {
            Some(Related::Many(records)) => records,
            _ => &[],
        }
    }

    pub fn related_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.associations.get_mut(name)
    }

    /// Install a loaded association (used by the store when hydrating)
    pub fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.associations.insert(name.into(), related);
    }

    // ----- validation -----

    /// Run validations, replacing any previous errors
    pub fn validate(&mut self) -> bool {
        self.errors = rules::validate_record(self);
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(ValidationError::full_message).collect()
    }

    // ----- dirty tracking and store hooks -----

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn changed_attributes(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    pub fn mark_for_destruction(&mut self) {
        self.marked_for_destruction = true;
    }

    pub fn is_marked_for_destruction(&self) -> bool {
        self.marked_for_destruction
    }

    /// Previously associated has_one records replaced by nested assignment,
    /// keyed by association name
    pub fn take_detached(&mut self) -> Vec<(String, Record)> {
        std::mem::take(&mut self.detached)
    }

    /// Store hook: force an attribute without dirty tracking
    pub fn write_raw(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.attributes.get_mut(name) {
            *slot = value;
        }
    }

    /// Store hook: set a foreign key while keeping the loaded association.
    /// Returns whether the value changed.
    pub fn write_foreign_key(&mut self, name: &str, value: Value) -> bool {
        match self.attributes.get_mut(name) {
            Some(slot) if *slot != value => {
                *slot = value;
                self.changed.insert(name.to_string());
                true
            }
            _ => false,
        }
    }

    /// Store hook: record the identity assigned on insert
    pub fn set_identity(&mut self, id: RecordId) {
        self.attributes
            .insert(ID_ATTRIBUTE.to_string(), Value::String(id.to_string()));
        self.id = Some(id);
    }

    pub fn clear_changes(&mut self) {
        self.changed.clear();
    }

    /// Human label: the display attribute when declared and present,
    /// otherwise `kind:id` (or the bare kind for a new record)
    pub fn display(&self) -> String {
        let shown = self
            .schema
            .display_attribute()
            .and_then(|attr| self.attributes.get(attr))
            .and_then(|value| match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });
        match (shown, self.owner_key()) {
            (Some(shown), _) => shown,
            (None, Some(key)) => key.to_string(),
            (None, None) => self.kind().to_string(),
        }
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("kind", &self.kind())
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("associations", &self.associations)
            .field("errors", &self.errors)
            .field("marked_for_destruction", &self.marked_for_destruction)
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.id == other.id
            && self.attributes == other.attributes
            && self.associations == other.associations
            && self.marked_for_destruction == other.marked_for_destruction
    }
}
