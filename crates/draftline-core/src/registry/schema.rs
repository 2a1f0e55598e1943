use serde_json::Value;

/// Identity attribute present on every record
pub const ID_ATTRIBUTE: &str = "id";
/// Timestamp attributes added by `OwnerSchema::timestamps`
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
/// Suffix reserved for nested association keys (`author_attributes`)
pub const NESTED_SUFFIX: &str = "_attributes";
/// Marker requesting destruction of a related record in nested attributes
pub const DESTROY_MARKER: &str = "_destroy";

/// Declared type of a record attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    /// Identifier of another record (foreign keys and `id`)
    Reference,
    /// RFC3339 timestamp string
    Timestamp,
    /// Arbitrary JSON value
    Json,
}

impl AttributeType {
    /// Whether `value` is acceptable for this type. Null is always accepted;
    /// presence is a separate validation.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (AttributeType::String | AttributeType::Text, Value::String(_)) => true,
            (AttributeType::Reference, Value::String(_)) => true,
            (AttributeType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (AttributeType::Float, Value::Number(_)) => true,
            (AttributeType::Boolean, Value::Bool(_)) => true,
            (AttributeType::Timestamp, Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }
            (AttributeType::Json, _) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Text => "text",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Boolean => "boolean",
            AttributeType::Reference => "reference",
            AttributeType::Timestamp => "timestamp",
            AttributeType::Json => "json",
        }
    }
}

/// One declared attribute: name and type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    pub ty: AttributeType,
}

/// How a related record is linked to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    /// Foreign key lives on the owner
    BelongsTo { foreign_key: String },
    /// Foreign key lives on the single related record
    HasOne { foreign_key: String },
    /// Foreign key lives on each related record
    HasMany { foreign_key: String },
}

impl Cardinality {
    pub fn is_singular(&self) -> bool {
        !matches!(self, Cardinality::HasMany { .. })
    }

    pub fn foreign_key(&self) -> &str {
        match self {
            Cardinality::BelongsTo { foreign_key }
            | Cardinality::HasOne { foreign_key }
            | Cardinality::HasMany { foreign_key } => foreign_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDef {
    pub name: String,
    pub target_kind: String,
    pub cardinality: Cardinality,
}

impl AssociationDef {
    /// Key under which this association's attributes are captured
    pub fn nested_key(&self) -> String {
        format!("{}{}", self.name, NESTED_SUFFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Attribute must be non-null and, for strings, not blank
    Presence(String),
}

/// Statically declared shape of one record kind
///
/// Schemas are built once, registered with a `SchemaRegistry`, and never
/// mutated afterwards. The registry stamps its attribute blacklist onto each
/// schema at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSchema {
    kind: String,
    attributes: Vec<AttributeDef>,
    timestamps: bool,
    associations: Vec<AssociationDef>,
    nested: Vec<String>,
    validations: Vec<Validation>,
    display_attribute: Option<String>,
    pub(crate) blacklist: Vec<String>,
}

impl OwnerSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
            timestamps: false,
            associations: Vec::new(),
            nested: Vec::new(),
            validations: Vec::new(),
            display_attribute: None,
            blacklist: Vec::new(),
        }
    }

    // ----- declaration -----

    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            ty,
        });
        self
    }

    /// Adds `created_at` and `updated_at`, maintained by the store
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        target_kind: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associations.push(AssociationDef {
            name: name.into(),
            target_kind: target_kind.into(),
            cardinality: Cardinality::BelongsTo {
                foreign_key: foreign_key.into(),
            },
        });
        self
    }

    pub fn has_one(
        mut self,
        name: impl Into<String>,
        target_kind: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associations.push(AssociationDef {
            name: name.into(),
            target_kind: target_kind.into(),
            cardinality: Cardinality::HasOne {
                foreign_key: foreign_key.into(),
            },
        });
        self
    }

    pub fn has_many(
        mut self,
        name: impl Into<String>,
        target_kind: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associations.push(AssociationDef {
            name: name.into(),
            target_kind: target_kind.into(),
            cardinality: Cardinality::HasMany {
                foreign_key: foreign_key.into(),
            },
        });
        self
    }

    /// Marks a declared association as eligible for snapshot capture and
    /// nested assignment
    pub fn nested(mut self, association: impl Into<String>) -> Self {
        self.nested.push(association.into());
        self
    }

    pub fn validates_presence_of(mut self, attribute: impl Into<String>) -> Self {
        self.validations.push(Validation::Presence(attribute.into()));
        self
    }

    /// Attribute used when the record is rendered for humans
    pub fn display_with(mut self, attribute: impl Into<String>) -> Self {
        self.display_attribute = Some(attribute.into());
        self
    }

    // ----- introspection -----

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Every attribute name in declaration order: `id`, declared attributes,
    /// then timestamps
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.attributes.len() + 3);
        names.push(ID_ATTRIBUTE);
        names.extend(self.attributes.iter().map(|a| a.name.as_str()));
        if self.timestamps {
            names.push(CREATED_AT);
            names.push(UPDATED_AT);
        }
        names
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_type(name).is_some()
    }

    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        if name == ID_ATTRIBUTE {
            return Some(AttributeType::Reference);
        }
        if self.timestamps && (name == CREATED_AT || name == UPDATED_AT) {
            return Some(AttributeType::Timestamp);
        }
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.ty)
    }

    /// Declared attributes excluding `id` and timestamps
    pub fn declared_attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    /// Attribute names captured in snapshots (all names minus the blacklist)
    pub fn versioned_attribute_names(&self) -> Vec<&str> {
        self.attribute_names()
            .into_iter()
            .filter(|name| !self.blacklist.iter().any(|b| b == name))
            .collect()
    }

    pub fn versioned_nested_attribute_names(&self) -> &[String] {
        &self.nested
    }

    /// The current full attribute set: every attribute name, blacklisted
    /// ones included, plus one `<name>_attributes` key per nested association
    pub fn full_attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .attribute_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        names.extend(self.nested.iter().map(|n| format!("{}{}", n, NESTED_SUFFIX)));
        names
    }

    pub fn associations(&self) -> &[AssociationDef] {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Association eligible for nested assignment
    pub fn nested_association(&self, name: &str) -> Option<&AssociationDef> {
        if self.nested.iter().any(|n| n == name) {
            self.association(name)
        } else {
            None
        }
    }

    /// Resolves a `<name>_attributes` key to its nested association
    pub fn nested_association_for_key(&self, key: &str) -> Option<&AssociationDef> {
        key.strip_suffix(NESTED_SUFFIX)
            .and_then(|name| self.nested_association(name))
    }

    pub fn validations(&self) -> &[Validation] {
        &self.validations
    }

    pub fn display_attribute(&self) -> Option<&str> {
        self.display_attribute.as_deref()
    }

    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }
}
