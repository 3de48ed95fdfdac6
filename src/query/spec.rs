//! Immutable query specifications.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidQueryError;
use crate::expr::{count_star, Expr, FieldExpr, FieldRef};
use crate::project::DtoShape;
use crate::schema::EntityDescriptor;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// One ordering criterion. Multi-key ordering is stable with left-to-right
/// precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByField {
    pub field: FieldRef,
    pub dir: SortDir,
}

/// A projection item: source expression with an optional target alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use = "builders have no effect until used"]
pub struct ProjectionBinding {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl ProjectionBinding {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The output column label: the alias if given, the field name for bare
    /// field references, `func_field` for aggregates, positional otherwise.
    pub fn label(&self, position: usize) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expr::Field(field) => field.field.clone(),
            Expr::Aggregate {
                func,
                arg: Some(arg),
                ..
            } => match arg.as_ref() {
                Expr::Field(field) => {
                    format!("{}_{}", func.name().to_lowercase(), field.field)
                }
                _ => format!("c{position}"),
            },
            Expr::Aggregate { func, arg: None, .. } => func.name().to_lowercase(),
            _ => format!("c{position}"),
        }
    }
}

impl From<Expr> for ProjectionBinding {
    fn from(expr: Expr) -> Self {
        ProjectionBinding::new(expr)
    }
}

impl From<&FieldExpr> for ProjectionBinding {
    fn from(field: &FieldExpr) -> Self {
        ProjectionBinding::new(field.expr())
    }
}

/// The target shape a query's rows are mapped into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// The full entity named here (one of the sources).
    Entity(String),

    /// A list of projected expressions (scalars, aggregates, tuples).
    Expressions(Vec<ProjectionBinding>),

    /// A declared DTO shape fed by expression bindings.
    Dto {
        shape: DtoShape,
        bindings: Vec<ProjectionBinding>,
    },
}

impl Projection {
    pub fn bindings(&self) -> Option<&[ProjectionBinding]> {
        match self {
            Projection::Entity(_) => None,
            Projection::Expressions(bindings) | Projection::Dto { bindings, .. } => Some(bindings),
        }
    }
}

/// An immutable, fully-specified query ready for execution.
///
/// Sources embed their full descriptors, so a spec is self-contained: an
/// executor needs nothing beyond the spec to run it. Never mutated after
/// being handed to the execution facade; re-running a query re-derives a
/// fresh spec from the builder's retained state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub sources: Vec<EntityDescriptor>,
    pub projection: Projection,
    /// Root predicate; [`Expr::True`] means "match all".
    pub predicate: Expr,
    pub group_by: Vec<FieldRef>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByField>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl QuerySpec {
    /// Number of values per result tuple.
    pub fn projection_width(&self) -> usize {
        match &self.projection {
            Projection::Entity(name) => self
                .source(name)
                .map(|desc| desc.fields().len())
                .unwrap_or(0),
            Projection::Expressions(bindings) | Projection::Dto { bindings, .. } => bindings.len(),
        }
    }

    /// The source descriptor with the given entity name.
    pub fn source(&self, entity: &str) -> Option<&EntityDescriptor> {
        self.sources.iter().find(|d| d.name() == entity)
    }

    /// Whether results are aggregate rows (grouped, or aggregate-projected).
    pub fn is_aggregate(&self) -> bool {
        if !self.group_by.is_empty() {
            return true;
        }
        self.projection
            .bindings()
            .is_some_and(|bindings| bindings.iter().any(|b| b.expr.contains_aggregate()))
    }

    /// The row-count variant used by paged execution of plain specs: same
    /// sources and predicate, no grouping, ordering or window, projection
    /// replaced with `COUNT(*)`.
    ///
    /// Not meaningful for grouped specs, where one result row is a group:
    /// `COUNT(*)` over the underlying rows would overcount. Paged execution
    /// counts those by iterating [`QuerySpec::unwindowed`] instead.
    pub fn count_variant(&self) -> QuerySpec {
        QuerySpec {
            sources: self.sources.clone(),
            projection: Projection::Expressions(vec![ProjectionBinding::new(count_star())]),
            predicate: self.predicate.clone(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// A copy of this spec with ordering and window bounds removed. Yields
    /// every result row of the query, one per group for grouped specs.
    pub fn unwindowed(&self) -> QuerySpec {
        QuerySpec {
            order_by: Vec::new(),
            offset: None,
            limit: None,
            ..self.clone()
        }
    }

    /// A copy of this spec with the given window applied, replacing any
    /// bounds already present.
    pub fn with_window(&self, offset: u64, limit: u64) -> QuerySpec {
        QuerySpec {
            offset: Some(offset),
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Diagnostic JSON rendering of the frozen spec.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Freeze-time structural validation. Called by the builder; a spec
    /// that exists has passed it.
    pub(crate) fn validate(&self) -> Result<(), InvalidQueryError> {
        if self.sources.is_empty() {
            return Err(InvalidQueryError::NoSource);
        }

        let scope: HashSet<&str> = self.sources.iter().map(|d| d.name()).collect();
        let check_scope = |expr: &Expr| -> Result<(), InvalidQueryError> {
            let mut out_of_scope = None;
            expr.walk_fields(&mut |field, _| {
                if !scope.contains(field.entity.as_str()) && out_of_scope.is_none() {
                    out_of_scope = Some(field.clone());
                }
            });
            match out_of_scope {
                Some(field) => Err(InvalidQueryError::FieldOutOfScope {
                    entity: field.entity,
                    field: field.field,
                }),
                None => Ok(()),
            }
        };

        check_scope(&self.predicate)?;
        if let Some(bindings) = self.projection.bindings() {
            for binding in bindings {
                check_scope(&binding.expr)?;
            }
        }
        if let Projection::Entity(name) = &self.projection {
            if !scope.contains(name.as_str()) {
                return Err(InvalidQueryError::FieldOutOfScope {
                    entity: name.clone(),
                    field: "*".into(),
                });
            }
        }
        for order in &self.order_by {
            if !scope.contains(order.field.entity.as_str()) {
                return Err(InvalidQueryError::FieldOutOfScope {
                    entity: order.field.entity.clone(),
                    field: order.field.field.clone(),
                });
            }
        }
        for group in &self.group_by {
            if !scope.contains(group.entity.as_str()) {
                return Err(InvalidQueryError::FieldOutOfScope {
                    entity: group.entity.clone(),
                    field: group.field.clone(),
                });
            }
        }

        if let Some(having) = &self.having {
            if self.group_by.is_empty() {
                return Err(InvalidQueryError::HavingWithoutGroupBy);
            }
            check_scope(having)?;
            let mut ungrouped = None;
            having.walk_fields(&mut |field, in_aggregate| {
                if !in_aggregate && !self.group_by.contains(field) && ungrouped.is_none() {
                    ungrouped = Some(field.qualified());
                }
            });
            if let Some(field) = ungrouped {
                return Err(InvalidQueryError::UngroupedHavingField(field));
            }
        }

        // Grouped or aggregate-projecting queries may not project or order
        // by bare ungrouped fields.
        if self.is_aggregate() {
            for order in &self.order_by {
                if !self.group_by.contains(&order.field) {
                    return Err(InvalidQueryError::UngroupedField(order.field.qualified()));
                }
            }
            if let Some(bindings) = self.projection.bindings() {
                for binding in bindings {
                    let mut ungrouped = None;
                    binding.expr.walk_fields(&mut |field, in_aggregate| {
                        if !in_aggregate && !self.group_by.contains(field) && ungrouped.is_none() {
                            ungrouped = Some(field.qualified());
                        }
                    });
                    if let Some(field) = ungrouped {
                        return Err(InvalidQueryError::UngroupedField(field));
                    }
                }
            } else if let Projection::Entity(name) = &self.projection {
                // A full-entity projection is only groupable if every field
                // is part of the key, which grouped queries never want.
                if let Some(desc) = self.source(name) {
                    for field in desc.fields() {
                        let grouped = self
                            .group_by
                            .iter()
                            .any(|g| g.entity == *name && g.field == field.name);
                        if !grouped {
                            return Err(InvalidQueryError::UngroupedField(format!(
                                "{name}.{}",
                                field.name
                            )));
                        }
                    }
                }
            }
        }

        if let Some(bindings) = self.projection.bindings() {
            let mut seen = HashSet::new();
            for binding in bindings {
                if let Some(alias) = &binding.alias {
                    if !seen.insert(alias.as_str()) {
                        return Err(InvalidQueryError::DuplicateAlias(alias.clone()));
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for QuerySpec {
    /// Single-line pseudo-SQL rendering for diagnostics and snapshots.
    /// This is not dialect SQL; translation is the executor's concern.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        match &self.projection {
            Projection::Entity(name) => write!(f, "{name}.*")?,
            Projection::Expressions(bindings) | Projection::Dto { bindings, .. } => {
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", binding.expr)?;
                    if let Some(alias) = &binding.alias {
                        write!(f, " AS {alias}")?;
                    }
                }
            }
        }
        write!(f, " FROM ")?;
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} AS {}", source.table(), source.name())?;
        }
        if !self.predicate.is_match_all() {
            write!(f, " WHERE {}", self.predicate)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            for (i, group) in self.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", group.qualified())?;
            }
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {having}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let dir = match order.dir {
                    SortDir::Asc => "ASC",
                    SortDir::Desc => "DESC",
                };
                write!(f, "{} {dir}", order.field.qualified())?;
            }
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
