//! Query builder - accumulate clauses, freeze into a [`QuerySpec`].

use super::spec::{OrderByField, Projection, ProjectionBinding, QuerySpec, SortDir};
use crate::error::InvalidQueryError;
use crate::expr::{Expr, FieldExpr, FieldRef};
use crate::project::DtoShape;
use crate::schema::EntityDescriptor;

/// Mutable accumulator for query clauses.
///
/// One builder is owned by one logical request at a time; it is plain owned
/// data with no interior mutability, so sharing requires external
/// synchronization - prefer one fresh builder per request. `build()` takes
/// `&self`: the builder stays usable, and every call freezes the state
/// accumulated so far into an independent [`QuerySpec`].
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until build() is called"]
pub struct QueryBuilder {
    sources: Vec<EntityDescriptor>,
    projection: Option<Projection>,
    predicate: Expr,
    group_by: Vec<FieldRef>,
    having: Option<Expr>,
    order_by: Vec<OrderByField>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl QueryBuilder {
    /// Start a query over one source entity.
    pub fn from(source: &EntityDescriptor) -> Self {
        Self {
            sources: vec![source.clone()],
            projection: None,
            predicate: Expr::True,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Start a query over several sources (cross product, correlated via
    /// `filter`).
    pub fn from_all<'a>(sources: impl IntoIterator<Item = &'a EntityDescriptor>) -> Self {
        let mut builder = Self {
            sources: Vec::new(),
            projection: None,
            predicate: Expr::True,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        };
        builder.sources.extend(sources.into_iter().cloned());
        builder
    }

    /// Register an additional source.
    pub fn also_from(mut self, source: &EntityDescriptor) -> Self {
        self.sources.push(source.clone());
        self
    }

    /// Set the projection to a list of expressions. If `select` is never
    /// called the query projects the full first source entity.
    pub fn select(mut self, exprs: Vec<impl Into<ProjectionBinding>>) -> Self {
        let bindings: Vec<ProjectionBinding> = exprs.into_iter().map(Into::into).collect();
        if !bindings.is_empty() {
            self.projection = Some(Projection::Expressions(bindings));
        }
        self
    }

    /// Project the full entity (useful after `from_all` to pick which one).
    pub fn select_entity(mut self, source: &EntityDescriptor) -> Self {
        self.projection = Some(Projection::Entity(source.name().into()));
        self
    }

    /// Project into a declared DTO shape via expression bindings.
    pub fn select_into(
        mut self,
        shape: DtoShape,
        bindings: Vec<impl Into<ProjectionBinding>>,
    ) -> Self {
        self.projection = Some(Projection::Dto {
            shape,
            bindings: bindings.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a filter predicate, ANDed with any previously supplied ones.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = if self.predicate.is_match_all() {
            predicate
        } else {
            std::mem::replace(&mut self.predicate, Expr::True).and(predicate)
        };
        self
    }

    /// Add several filter predicates at once (all ANDed).
    pub fn filter_all(mut self, predicates: impl IntoIterator<Item = Expr>) -> Self {
        for predicate in predicates {
            self = self.filter(predicate);
        }
        self
    }

    /// Append an ordering criterion. Multi-key, left-to-right precedence.
    pub fn order_by(mut self, field: &FieldExpr, dir: SortDir) -> Self {
        self.order_by.push(OrderByField {
            field: field.field_ref().clone(),
            dir,
        });
        self
    }

    /// Append a grouping field.
    pub fn group_by(mut self, field: &FieldExpr) -> Self {
        self.group_by.push(field.field_ref().clone());
        self
    }

    /// Set the HAVING predicate (conjoined if called repeatedly). Legality
    /// against `group_by` is checked at `build()`, not here, since the
    /// clauses may arrive in any order.
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Skip the first `n` rows.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Return at most `n` rows. `limit(0)` means "no rows", not unbounded.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Freeze the accumulated state into an immutable [`QuerySpec`].
    ///
    /// All structural checks happen here: a spec that builds is legal to
    /// execute. The builder remains reusable afterward.
    pub fn build(&self) -> Result<QuerySpec, InvalidQueryError> {
        let projection = match &self.projection {
            Some(projection) => projection.clone(),
            None => {
                let first = self.sources.first().ok_or(InvalidQueryError::NoSource)?;
                Projection::Entity(first.name().into())
            }
        };
        let spec = QuerySpec {
            sources: self.sources.clone(),
            projection,
            predicate: self.predicate.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by: self.order_by.clone(),
            offset: self.offset,
            limit: self.limit,
        };
        spec.validate()?;
        Ok(spec)
    }
}
