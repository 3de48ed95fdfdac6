//! Unified error types for query construction and execution.
//!
//! Each stage of the pipeline has its own error type so that a failure is
//! attributable to the stage that produced it: schema derivation fails with
//! [`SchemaError`], expression construction with [`TypeMismatchError`],
//! freezing a builder with [`InvalidQueryError`], row mapping with
//! [`ProjectionError`], and execution with [`CardinalityError`] or
//! [`ExecutionError`]. Construction-time errors never reach the execution
//! boundary, and executor failures are never reported as construction
//! errors. All errors propagate to the immediate caller; nothing retries.

use thiserror::Error;

use crate::schema::SemanticType;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while deriving or consulting the entity metamodel.
///
/// These are fatal startup errors: a descriptor that fails to build is a
/// programming mistake, not a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Referenced an entity that was never registered.
    #[error("unknown entity: '{0}'")]
    UnknownEntity(String),

    /// Referenced a field that doesn't exist on an entity.
    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    /// Two fields with the same name were declared on one entity.
    #[error("duplicate field '{field}' on entity '{entity}'")]
    DuplicateField { entity: String, field: String },

    /// A declared field has no resolvable column binding.
    #[error("field '{field}' on entity '{entity}' has invalid column binding '{column}'")]
    InvalidColumn {
        entity: String,
        field: String,
        column: String,
    },

    /// Two fields bind to the same column.
    #[error("column '{column}' bound twice on entity '{entity}'")]
    DuplicateColumn { entity: String, column: String },

    /// An entity with no fields cannot be queried.
    #[error("entity '{0}' declares no fields")]
    EmptyEntity(String),

    /// The same entity name was registered twice.
    #[error("entity '{0}' registered twice")]
    DuplicateEntity(String),
}

/// Expression operand type disagreement, raised at construction time.
///
/// Recoverable by the caller fixing the offending factory call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeMismatchError {
    /// A literal operand doesn't match the field's semantic type.
    #[error("field '{field}' is {expected}, operand is {actual}")]
    Operand {
        field: String,
        expected: SemanticType,
        actual: SemanticType,
    },

    /// Two fields compared against each other have different types.
    #[error("cannot compare '{left}' ({left_type}) with '{right}' ({right_type})")]
    Fields {
        left: String,
        left_type: SemanticType,
        right: String,
        right_type: SemanticType,
    },

    /// NULL passed where a comparison operand is required.
    #[error("comparison against NULL on field '{field}'; use is_null() instead")]
    NullOperand { field: String },

    /// A string operator applied to a non-text field.
    #[error("'{op}' requires a text field, '{field}' is {actual}")]
    NotText {
        op: &'static str,
        field: String,
        actual: SemanticType,
    },

    /// A numeric aggregate applied to a non-numeric field.
    #[error("'{func}' requires a numeric field, '{field}' is {actual}")]
    NotNumeric {
        func: &'static str,
        field: String,
        actual: SemanticType,
    },
}

/// Structurally illegal query specification, raised when the builder is
/// frozen with `build()`, never at call time, since clauses may be supplied
/// in any order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidQueryError {
    /// `build()` called before any `from()`.
    #[error("query has no source entity")]
    NoSource,

    /// A field reference targets an entity that is not a query source.
    #[error("field '{entity}.{field}' does not belong to any query source")]
    FieldOutOfScope { entity: String, field: String },

    /// HAVING without GROUP BY.
    #[error("HAVING requires a GROUP BY clause")]
    HavingWithoutGroupBy,

    /// HAVING referenced a field that is neither grouped nor aggregated.
    #[error("HAVING references ungrouped field '{0}'")]
    UngroupedHavingField(String),

    /// A grouped query projects a bare field that is not in GROUP BY.
    #[error("field '{0}' must be in GROUP BY or wrapped in an aggregate")]
    UngroupedField(String),

    /// Two projection bindings target the same alias.
    #[error("duplicate projection alias '{0}'")]
    DuplicateAlias(String),

    /// Scalar execution requires a single-expression projection.
    #[error("scalar query must project exactly one expression, found {0}")]
    NotScalar(usize),

    /// Page arithmetic is undefined for an empty page.
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// A projection binding could not be applied to a row, raised at map time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// An alias resolved to no target field.
    #[error("alias '{alias}' matches no field of '{shape}'")]
    UnknownTarget { shape: String, alias: String },

    /// An alias resolved to more than one target field.
    #[error("alias '{alias}' is ambiguous on '{shape}': matches {matches:?}")]
    AmbiguousTarget {
        shape: String,
        alias: String,
        matches: Vec<String>,
    },

    /// More source expressions than target fields (positional binding).
    #[error("'{shape}' has {fields} fields but {bindings} bindings were supplied")]
    BindingOverflow {
        shape: String,
        fields: usize,
        bindings: usize,
    },

    /// A row was missing an expected column.
    #[error("row has no column '{0}'")]
    MissingColumn(String),

    /// A column value disagrees with the declared field type.
    #[error("column '{column}' is {expected}, row value is {actual}")]
    ValueType {
        column: String,
        expected: SemanticType,
        actual: SemanticType,
    },

    /// NULL in a column declared non-nullable.
    #[error("column '{0}' is not nullable but the row value is NULL")]
    UnexpectedNull(String),

    /// The executor produced a tuple of unexpected width.
    #[error("expected {expected} values per row, got {actual}")]
    Arity { expected: usize, actual: usize },
}

/// A scalar query returned something other than exactly one row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardinalityError {
    #[error("scalar query returned no rows")]
    NoRows,

    #[error("scalar query returned more than one row")]
    MultipleRows,
}

/// Opaque failure from the delegated relational executor.
///
/// Carries a rendered form of the originating query for diagnostics; the
/// failure is surfaced immediately and never silently swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("execution failed: {message} (query: {query})")]
pub struct ExecutionError {
    pub message: String,
    pub query: String,
}

impl ExecutionError {
    /// Wrap an executor failure with the query it was executing.
    pub fn new(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            query: query.into(),
        }
    }
}

/// Any error the engine can surface, for callers that funnel the whole
/// pipeline through one `?`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error(transparent)]
    InvalidQuery(#[from] InvalidQueryError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Cardinality(#[from] CardinalityError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
