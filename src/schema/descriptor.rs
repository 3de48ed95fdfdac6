//! Entity descriptors and the schema registry.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, SchemaError};
use crate::expr::{FieldExpr, FieldRef};

use super::Value;

/// Column identifiers the executor collaborators can bind to.
static COLUMN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid column pattern"));

/// The semantic type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl SemanticType {
    pub fn is_numeric(self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::Float)
    }

    /// Whether an operand of type `other` may be compared against a field
    /// of this type. Exact match, plus Int literals against Float fields
    /// (integer literals are the common way to write float bounds).
    pub fn accepts(self, other: SemanticType) -> bool {
        self == other || (self == SemanticType::Float && other == SemanticType::Integer)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
        };
        write!(f, "{name}")
    }
}

/// One field of an entity: logical name, semantic type, column binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub column: String,
    pub nullable: bool,
}

impl FieldDescriptor {
    /// Check a candidate value against this field's type and nullability.
    pub fn check_value(&self, value: &Value) -> Result<(), ProjectionError> {
        match value.semantic_type() {
            None if self.nullable => Ok(()),
            None => Err(ProjectionError::UnexpectedNull(self.name.clone())),
            Some(actual) if self.semantic_type.accepts(actual) => Ok(()),
            Some(actual) => Err(ProjectionError::ValueType {
                column: self.name.clone(),
                expected: self.semantic_type,
                actual,
            }),
        }
    }

    /// The field reference this descriptor describes, qualified by entity.
    pub fn to_ref(&self, entity: &str) -> FieldRef {
        FieldRef {
            entity: entity.into(),
            field: self.name.clone(),
            column: self.column.clone(),
            semantic_type: self.semantic_type,
            nullable: self.nullable,
        }
    }
}

/// Startup-time description of one entity type.
///
/// Immutable once constructed; one instance per entity type. Field order is
/// the declaration order and defines the positional layout of entity
/// projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Start building a descriptor for entity `name` stored in `table`.
    pub fn builder(name: &str, table: &str) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by logical name.
    pub fn field(&self, name: &str) -> Result<&FieldDescriptor, SchemaError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SchemaError::UnknownField {
                entity: self.name.clone(),
                field: name.into(),
            })
    }

    /// Typed field handle for use in expressions - the no-codegen analogue
    /// of a generated static accessor.
    pub fn field_ref(&self, name: &str) -> Result<FieldExpr, SchemaError> {
        let field = self.field(name)?;
        Ok(FieldExpr::new(&self.name, field))
    }
}

/// Accumulates field declarations and validates them into an
/// [`EntityDescriptor`].
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until build() is called"]
pub struct EntityDescriptorBuilder {
    name: String,
    table: String,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptorBuilder {
    /// Declare a non-nullable field.
    pub fn field(self, name: &str, semantic_type: SemanticType, column: &str) -> Self {
        self.push(name, semantic_type, column, false)
    }

    /// Declare a nullable field.
    pub fn nullable_field(self, name: &str, semantic_type: SemanticType, column: &str) -> Self {
        self.push(name, semantic_type, column, true)
    }

    fn push(mut self, name: &str, semantic_type: SemanticType, column: &str, nullable: bool) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            semantic_type,
            column: column.into(),
            nullable,
        });
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> Result<EntityDescriptor, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::EmptyEntity(self.name));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if !COLUMN_PATTERN.is_match(&field.column) {
                return Err(SchemaError::InvalidColumn {
                    entity: self.name,
                    field: field.name.clone(),
                    column: field.column.clone(),
                });
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    entity: self.name,
                    field: field.name.clone(),
                });
            }
            if self.fields[..i].iter().any(|f| f.column == field.column) {
                return Err(SchemaError::DuplicateColumn {
                    entity: self.name,
                    column: field.column.clone(),
                });
            }
        }
        Ok(EntityDescriptor {
            name: self.name,
            table: self.table,
            fields: self.fields,
        })
    }
}

/// Registry of all entity descriptors, built once at startup.
///
/// Lookup is pure and cached by construction: `describe` returns the same
/// structurally-identical descriptor on every call.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    entities: HashMap<String, EntityDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Registering the same entity name twice is a
    /// startup error.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<(), SchemaError> {
        if self.entities.contains_key(descriptor.name()) {
            return Err(SchemaError::DuplicateEntity(descriptor.name().into()));
        }
        self.entities.insert(descriptor.name().into(), descriptor);
        Ok(())
    }

    /// Look up the descriptor for an entity type.
    pub fn describe(&self, entity: &str) -> Result<&EntityDescriptor, SchemaError> {
        self.entities
            .get(entity)
            .ok_or_else(|| SchemaError::UnknownEntity(entity.into()))
    }
}
