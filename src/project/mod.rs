//! Projection mapper - typed column values into target shapes.
//!
//! Maps one executor tuple at a time into a [`Row`] whose columns carry the
//! target shape's field names, then (optionally) into a caller type via
//! [`FromRow`]. Pure, no I/O: every failure is a [`ProjectionError`]
//! attributable to a binding, never to the store.

use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::query::ProjectionBinding;
use crate::schema::{EntityDescriptor, SemanticType, Value};

/// One materialized result row: ordered (name, value) pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value by column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Value by position.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, v)| v)
    }

    /// Value by column name, failing if the column is absent.
    pub fn require(&self, name: &str) -> Result<&Value, ProjectionError> {
        self.get(name)
            .ok_or_else(|| ProjectionError::MissingColumn(name.into()))
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, ProjectionError> {
        match self.require(name)? {
            Value::Int(n) => Ok(*n),
            other => Err(self.value_type_error(name, SemanticType::Integer, other)),
        }
    }

    /// Float accessor; integer values widen.
    pub fn get_f64(&self, name: &str) -> Result<f64, ProjectionError> {
        match self.require(name)? {
            Value::Float(f) => Ok(*f),
            Value::Int(n) => Ok(*n as f64),
            other => Err(self.value_type_error(name, SemanticType::Float, other)),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<String, ProjectionError> {
        match self.require(name)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(self.value_type_error(name, SemanticType::Text, other)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ProjectionError> {
        match self.require(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.value_type_error(name, SemanticType::Boolean, other)),
        }
    }

    /// Nullable text accessor.
    pub fn opt_text(&self, name: &str) -> Result<Option<String>, ProjectionError> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(self.value_type_error(name, SemanticType::Text, other)),
        }
    }

    fn value_type_error(
        &self,
        name: &str,
        expected: SemanticType,
        actual: &Value,
    ) -> ProjectionError {
        match actual.semantic_type() {
            Some(actual) => ProjectionError::ValueType {
                column: name.into(),
                expected,
                actual,
            },
            None => ProjectionError::UnexpectedNull(name.into()),
        }
    }
}

/// Construct `Self` from a projected [`Row`].
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, ProjectionError>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self, ProjectionError> {
        Ok(row.clone())
    }
}

/// A declared DTO shape: a named target with an ordered field list, for
/// projections whose shape differs from any single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtoShape {
    name: String,
    fields: Vec<String>,
}

impl DtoShape {
    pub fn new(name: &str, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Resolve an alias to exactly one target field: exact match first,
    /// then case-insensitive. Zero or several matches are mapping errors.
    fn resolve(&self, alias: &str) -> Result<&str, ProjectionError> {
        if let Some(field) = self.fields.iter().find(|f| *f == alias) {
            return Ok(field);
        }
        let matches: Vec<&String> = self
            .fields
            .iter()
            .filter(|f| f.eq_ignore_ascii_case(alias))
            .collect();
        match matches.as_slice() {
            [field] => Ok(field),
            [] => Err(ProjectionError::UnknownTarget {
                shape: self.name.clone(),
                alias: alias.into(),
            }),
            _ => Err(ProjectionError::AmbiguousTarget {
                shape: self.name.clone(),
                alias: alias.into(),
                matches: matches.into_iter().cloned().collect(),
            }),
        }
    }
}

/// Map one entity tuple (values in descriptor field order) into a row keyed
/// by field names, type-checked against the descriptor.
pub fn project_entity(
    descriptor: &EntityDescriptor,
    values: Vec<Value>,
) -> Result<Row, ProjectionError> {
    let fields = descriptor.fields();
    if values.len() != fields.len() {
        return Err(ProjectionError::Arity {
            expected: fields.len(),
            actual: values.len(),
        });
    }
    let mut columns = Vec::with_capacity(fields.len());
    for (field, value) in fields.iter().zip(values) {
        match value.semantic_type() {
            None => {
                if !field.nullable {
                    return Err(ProjectionError::UnexpectedNull(field.name.clone()));
                }
            }
            Some(actual) => {
                if !field.semantic_type.accepts(actual) {
                    return Err(ProjectionError::ValueType {
                        column: field.name.clone(),
                        expected: field.semantic_type,
                        actual,
                    });
                }
            }
        }
        columns.push((field.name.clone(), value));
    }
    Ok(Row::new(columns))
}

/// Map one expression tuple into a row labeled per binding (alias, or the
/// derived label).
pub fn project_expressions(
    bindings: &[ProjectionBinding],
    values: Vec<Value>,
) -> Result<Row, ProjectionError> {
    if values.len() != bindings.len() {
        return Err(ProjectionError::Arity {
            expected: bindings.len(),
            actual: values.len(),
        });
    }
    let columns = bindings
        .iter()
        .enumerate()
        .zip(values)
        .map(|((i, binding), value)| (binding.label(i), value))
        .collect();
    Ok(Row::new(columns))
}

/// Map one expression tuple into a declared DTO shape.
///
/// Aliased bindings resolve by name; unaliased ones bind positionally.
/// Unbound shape fields are filled with NULL.
pub fn project_dto(
    shape: &DtoShape,
    bindings: &[ProjectionBinding],
    values: Vec<Value>,
) -> Result<Row, ProjectionError> {
    if values.len() != bindings.len() {
        return Err(ProjectionError::Arity {
            expected: bindings.len(),
            actual: values.len(),
        });
    }
    if bindings.len() > shape.fields().len() {
        return Err(ProjectionError::BindingOverflow {
            shape: shape.name().into(),
            fields: shape.fields().len(),
            bindings: bindings.len(),
        });
    }
    let mut columns: Vec<(String, Value)> = shape
        .fields()
        .iter()
        .map(|f| (f.clone(), Value::Null))
        .collect();
    for ((position, binding), value) in bindings.iter().enumerate().zip(values) {
        let target: &str = match &binding.alias {
            Some(alias) => shape.resolve(alias)?,
            None => &shape.fields()[position],
        };
        let slot = columns
            .iter_mut()
            .find(|(name, _)| name == target)
            .expect("resolved target exists in shape");
        slot.1 = value;
    }
    Ok(Row::new(columns))
}
