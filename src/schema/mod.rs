//! Entity metamodel - startup-time schema descriptions.
//!
//! Instead of generating per-entity accessor types at compile time, the
//! schema is a declarative mapping table built once at process start: an
//! [`EntityDescriptor`] per entity type,
//! from which typed field handles ([`crate::expr::FieldExpr`]) are obtained.
//! Descriptors are immutable after construction and freely shared across
//! threads; invalid bindings fail with [`SchemaError`] at build time, never
//! at query time.

mod descriptor;
mod value;

pub use descriptor::{
    EntityDescriptor, EntityDescriptorBuilder, FieldDescriptor, SchemaRegistry, SemanticType,
};
pub use value::Value;
