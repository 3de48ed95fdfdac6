//! # Quarry
//!
//! A typed query-construction and execution engine for relational data.
//!
//! ## Architecture
//!
//! Quarry replaces string-assembled queries with typed value trees:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Entity Metamodel (descriptors)                │
//! │  (entities, fields, semantic types, column bindings)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [typed field handles]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Expression Tree (predicates)                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │              QuerySpec (frozen, validated)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [delegated executor]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Raw value tuples                            │
//! │              + Projection Mapper (rows, DTOs)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Type constraints are enforced at expression construction, structural
//! legality at `build()`, so every [`query::QuerySpec`] that exists is
//! executable. Execution is delegated through [`exec::RelationalExecutor`];
//! [`exec::MemoryStore`] is the bundled reference implementation.

pub mod error;
pub mod exec;
pub mod expr;
pub mod project;
pub mod query;
pub mod schema;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::error::{
        CardinalityError, ExecutionError, InvalidQueryError, ProjectionError, QueryError,
        QueryResult, SchemaError, TypeMismatchError,
    };
    pub use crate::exec::{Engine, MemoryStore, PageResult, RelationalExecutor, Rows};
    pub use crate::expr::{always_true, count_star, fold_and, Expr, FieldExpr};
    pub use crate::project::{DtoShape, FromRow, Row};
    pub use crate::query::{Projection, ProjectionBinding, QueryBuilder, QuerySpec, SortDir};
    pub use crate::schema::{
        EntityDescriptor, FieldDescriptor, SchemaRegistry, SemanticType, Value,
    };
}

// Also export at crate root for convenience
pub use error::{QueryError, QueryResult};
pub use exec::{Engine, MemoryStore, PageResult, RelationalExecutor};
pub use expr::{fold_and, Expr, FieldExpr};
pub use project::{DtoShape, FromRow, Row};
pub use query::{QueryBuilder, QuerySpec, SortDir};
pub use schema::{EntityDescriptor, SchemaRegistry, SemanticType, Value};
