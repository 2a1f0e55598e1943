//! Owner schema registry
//!
//! Every record kind that participates in versioning is declared once as an
//! `OwnerSchema` and registered here. The built registry is immutable and is
//! shared as `Arc<SchemaRegistry>` by records, the store and the engine.

pub mod schema;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::VersioningConfig;
use crate::errors::{DraftlineError, Result};

pub use schema::{
    AssociationDef, AttributeDef, AttributeType, Cardinality, OwnerSchema, Validation,
    CREATED_AT, DESTROY_MARKER, ID_ATTRIBUTE, NESTED_SUFFIX, UPDATED_AT,
};

/// Bookkeeping attributes never captured in snapshots
pub const DEFAULT_BLACKLIST: [&str; 3] = ["created_at", "updated_at", "published"];

/// Read-only mapping from kind tag to schema
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<OwnerSchema>>,
    blacklist: Vec<String>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Look up the schema for a kind tag
    ///
    /// # Errors
    /// Returns `UnknownKind` if the kind was never registered.
    pub fn schema(&self, kind: &str) -> Result<Arc<OwnerSchema>> {
        self.schemas
            .get(kind)
            .cloned()
            .ok_or_else(|| DraftlineError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.schemas.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }
}

/// Collects schemas and validates their cross references on `build`
#[derive(Debug)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<OwnerSchema>,
    blacklist: Vec<String>,
}

impl Default for SchemaRegistryBuilder {
    fn default() -> Self {
        Self {
            schemas: Vec::new(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SchemaRegistryBuilder {
    /// Replace the blacklist with the one from configuration
    pub fn with_config(mut self, config: &VersioningConfig) -> Self {
        self.blacklist = config.blacklisted_attributes.clone();
        self
    }

    pub fn blacklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn register(mut self, schema: OwnerSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Freeze the registry
    ///
    /// # Errors
    /// - `DuplicateKind` when a kind is registered twice
    /// - `UnknownKind` when an association targets an unregistered kind
    /// - `UnknownAttribute` when a foreign key, validation or display
    ///   attribute is not declared on the schema that must carry it
    /// - `UnknownAssociation` when a nested name is not a declared association
    pub fn build(self) -> Result<Arc<SchemaRegistry>> {
        let mut schemas: BTreeMap<String, OwnerSchema> = BTreeMap::new();
        for mut schema in self.schemas {
            let kind = schema.kind().to_string();
            if schemas.contains_key(&kind) {
                return Err(DraftlineError::DuplicateKind { kind });
            }
            check_declarations(&schema)?;
            schema.blacklist = self.blacklist.clone();
            schemas.insert(kind, schema);
        }

        for schema in schemas.values() {
            for assoc in schema.associations() {
                let target = schemas.get(&assoc.target_kind).ok_or_else(|| {
                    DraftlineError::UnknownKind {
                        kind: assoc.target_kind.clone(),
                    }
                })?;
                // The foreign key lives on the owner for belongs_to, on the
                // target otherwise
                let (carrier, fk) = match &assoc.cardinality {
                    Cardinality::BelongsTo { foreign_key } => (schema, foreign_key),
                    Cardinality::HasOne { foreign_key } | Cardinality::HasMany { foreign_key } => {
                        (target, foreign_key)
                    }
                };
                if carrier.attribute_type(fk) != Some(AttributeType::Reference) {
                    return Err(DraftlineError::UnknownAttribute {
                        kind: carrier.kind().to_string(),
                        attribute: fk.clone(),
                    });
                }
            }
        }

        Ok(Arc::new(SchemaRegistry {
            schemas: schemas
                .into_iter()
                .map(|(kind, schema)| (kind, Arc::new(schema)))
                .collect(),
            blacklist: self.blacklist,
        }))
    }
}

fn check_declarations(schema: &OwnerSchema) -> Result<()> {
    let kind = schema.kind();
    let mut seen: Vec<&str> = Vec::new();
    for def in schema.declared_attributes() {
        let name = def.name.as_str();
        let reserved = name == ID_ATTRIBUTE
            || name.ends_with(NESTED_SUFFIX)
            || (schema.has_timestamps() && (name == CREATED_AT || name == UPDATED_AT));
        if reserved || seen.contains(&name) {
            return Err(DraftlineError::Config {
                message: format!("attribute '{}' cannot be declared on {}", name, kind),
            });
        }
        seen.push(name);
    }

    for nested in schema.versioned_nested_attribute_names() {
        if schema.association(nested).is_none() {
            return Err(DraftlineError::UnknownAssociation {
                kind: kind.to_string(),
                association: nested.clone(),
            });
        }
    }

    for validation in schema.validations() {
        let Validation::Presence(attr) = validation;
        if !schema.has_attribute(attr) {
            return Err(DraftlineError::UnknownAttribute {
                kind: kind.to_string(),
                attribute: attr.clone(),
            });
        }
    }

    if let Some(attr) = schema.display_attribute() {
        if !schema.has_attribute(attr) {
            return Err(DraftlineError::UnknownAttribute {
                kind: kind.to_string(),
                attribute: attr.to_string(),
            });
        }
    }

    Ok(())
}
