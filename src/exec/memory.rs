//! In-memory reference store.
//!
//! A [`MemoryStore`] keeps rows per table name and evaluates frozen specs
//! directly: cross product over sources, predicate filter, then either the
//! grouped-aggregate path or the sort-and-window path, projecting raw value
//! tuples at the end. It exists for tests and for embedding without an
//! external database; it does no planning and keeps no indexes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::error::{ExecutionError, QueryResult};
use crate::expr::Expr;
use crate::query::{Projection, QuerySpec, SortDir};
use crate::schema::{EntityDescriptor, Value};

use super::eval::{Ctx, Evaluator, Scope, StoredRow};
use super::{RelationalExecutor, TupleStream};

/// Row storage keyed by table name, each row keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<StoredRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one row into the entity's table, validated against the
    /// descriptor: every named field must exist, every value must fit the
    /// field's declared type, and omitted fields must be nullable.
    pub fn insert<'a>(
        &mut self,
        descriptor: &EntityDescriptor,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> QueryResult<()> {
        let mut by_column = StoredRow::new();
        for (name, value) in values {
            let field = descriptor.field(name)?;
            field.check_value(&value)?;
            by_column.insert(field.column.clone(), value);
        }
        for field in descriptor.fields() {
            if !by_column.contains_key(&field.column) {
                field.check_value(&Value::Null)?;
                by_column.insert(field.column.clone(), Value::Null);
            }
        }
        self.tables
            .entry(descriptor.table().into())
            .or_default()
            .push(by_column);
        Ok(())
    }

    /// Number of stored rows for a table. Unknown tables are empty.
    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }

    fn rows_for(&self, descriptor: &EntityDescriptor) -> &[StoredRow] {
        self.tables
            .get(descriptor.table())
            .map_or(&[], Vec::as_slice)
    }

    /// Evaluate a spec to its full list of result tuples.
    ///
    /// Materialized eagerly; the reference store trades laziness for
    /// simplicity, and subquery evaluation re-enters here.
    pub(super) fn run(&self, spec: &QuerySpec) -> Result<Vec<Vec<Value>>, ExecutionError> {
        let eval = Evaluator::new(self, spec.to_string());

        // Cross product over the sources, then the predicate filter.
        let mut scopes = vec![Scope::new(Vec::new())];
        for source in &spec.sources {
            let rows = self.rows_for(source);
            let mut next = Vec::with_capacity(scopes.len() * rows.len());
            for scope in &scopes {
                for row in rows {
                    next.push(scope.extended(source.name(), row));
                }
            }
            scopes = next;
        }
        let mut matched = Vec::new();
        for scope in scopes {
            if eval.matches(&spec.predicate, &Ctx::Row(&scope))? {
                matched.push(scope);
            }
        }

        if spec.is_aggregate() {
            self.run_grouped(spec, &eval, matched)
        } else {
            self.run_plain(spec, &eval, matched)
        }
    }

    fn run_plain(
        &self,
        spec: &QuerySpec,
        eval: &Evaluator<'_>,
        mut scopes: Vec<Scope<'_>>,
    ) -> Result<Vec<Vec<Value>>, ExecutionError> {
        if !spec.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(scopes.len());
            for scope in scopes {
                let mut key = Vec::with_capacity(spec.order_by.len());
                for order in &spec.order_by {
                    key.push(eval.eval(&Expr::Field(order.field.clone()), &Ctx::Row(&scope))?);
                }
                keyed.push((key, scope));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &spec.order_by));
            scopes = keyed.into_iter().map(|(_, scope)| scope).collect();
        }

        let mut tuples = Vec::new();
        for scope in window(scopes, spec.offset, spec.limit) {
            tuples.push(self.project_tuple(spec, eval, &Ctx::Row(&scope))?);
        }
        Ok(tuples)
    }

    fn run_grouped(
        &self,
        spec: &QuerySpec,
        eval: &Evaluator<'_>,
        scopes: Vec<Scope<'_>>,
    ) -> Result<Vec<Vec<Value>>, ExecutionError> {
        // An aggregate query without GROUP BY is one group over everything,
        // including the empty input (COUNT over no rows is 0, not no rows).
        let mut groups: Vec<Vec<Scope<'_>>> = if spec.group_by.is_empty() {
            vec![scopes]
        } else {
            let mut by_key: BTreeMap<GroupKey, Vec<Scope<'_>>> = BTreeMap::new();
            for scope in scopes {
                let mut key = Vec::with_capacity(spec.group_by.len());
                for field in &spec.group_by {
                    key.push(eval.eval(&Expr::Field(field.clone()), &Ctx::Row(&scope))?);
                }
                by_key.entry(GroupKey(key)).or_default().push(scope);
            }
            // BTreeMap iteration gives deterministic ascending key order.
            by_key.into_values().collect()
        };

        if let Some(having) = &spec.having {
            let mut kept = Vec::with_capacity(groups.len());
            for group in groups {
                if eval.matches(having, &Ctx::Group(&group))? {
                    kept.push(group);
                }
            }
            groups = kept;
        }

        if !spec.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(groups.len());
            for group in groups {
                let mut key = Vec::with_capacity(spec.order_by.len());
                for order in &spec.order_by {
                    key.push(eval.eval(&Expr::Field(order.field.clone()), &Ctx::Group(&group))?);
                }
                keyed.push((key, group));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &spec.order_by));
            groups = keyed.into_iter().map(|(_, group)| group).collect();
        }

        let mut tuples = Vec::new();
        for group in window(groups, spec.offset, spec.limit) {
            tuples.push(self.project_tuple(spec, eval, &Ctx::Group(&group))?);
        }
        Ok(tuples)
    }

    fn project_tuple(
        &self,
        spec: &QuerySpec,
        eval: &Evaluator<'_>,
        ctx: &Ctx<'_, '_>,
    ) -> Result<Vec<Value>, ExecutionError> {
        match &spec.projection {
            Projection::Entity(name) => {
                let descriptor = spec.source(name).ok_or_else(|| {
                    ExecutionError::new(
                        format!("projected entity '{name}' is not a source"),
                        spec.to_string(),
                    )
                })?;
                let mut tuple = Vec::with_capacity(descriptor.fields().len());
                for field in descriptor.fields() {
                    let field_ref = field.to_ref(descriptor.name());
                    tuple.push(eval.eval(&Expr::Field(field_ref), ctx)?);
                }
                Ok(tuple)
            }
            Projection::Expressions(bindings) | Projection::Dto { bindings, .. } => {
                let mut tuple = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    tuple.push(eval.eval(&binding.expr, ctx)?);
                }
                Ok(tuple)
            }
        }
    }
}

impl RelationalExecutor for MemoryStore {
    fn execute<'a>(&'a self, spec: &QuerySpec) -> Result<TupleStream<'a>, ExecutionError> {
        let tuples = self.run(spec)?;
        Ok(Box::new(tuples.into_iter().map(Ok)))
    }
}

/// Grouping key with a total order (NULL first, numerics cross-compared).
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            match a.cmp_sql(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[crate::query::OrderByField]) -> Ordering {
    for ((a, b), order) in a.iter().zip(b).zip(order_by) {
        let ord = a.cmp_sql(b);
        let ord = match order.dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Apply OFFSET/LIMIT to a materialized sequence. `limit` of zero keeps
/// nothing.
fn window<T>(items: Vec<T>, offset: Option<u64>, limit: Option<u64>) -> Vec<T> {
    let skip = usize::try_from(offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = limit
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(take).collect()
}
