//! Query construction - fluent accumulation frozen into immutable specs.
//!
//! [`QueryBuilder`] accumulates select/from/filter/group/order/window state
//! through a fluent API and freezes it into a [`QuerySpec`] with
//! [`QueryBuilder::build`]. Structural validation happens at freeze time,
//! never at call time, so clauses may be supplied in any order. A frozen
//! spec is immutable and safe to share across threads; the builder remains
//! reusable and later `build()` calls reflect further mutation.

mod builder;
mod spec;

pub use builder::QueryBuilder;
pub use spec::{OrderByField, Projection, ProjectionBinding, QuerySpec, SortDir};
