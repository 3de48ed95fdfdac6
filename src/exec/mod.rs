//! Execution & pagination facade.
//!
//! The engine core never speaks a wire protocol: a frozen [`QuerySpec`] is
//! handed to a [`RelationalExecutor`] collaborator, which owns statement
//! compilation and result-set iteration and yields raw value tuples. The
//! [`Engine`] facade materializes those tuples one row at a time through
//! the projection mapper, and layers scalar and paged execution on top.
//!
//! Execution is a blocking call for the duration of the round trip. There
//! are no implicit retries and no caching: a failed execution surfaces
//! immediately, and repeated calls always re-run against the store.

mod eval;
mod memory;

pub use memory::MemoryStore;

use crate::error::{CardinalityError, ExecutionError, InvalidQueryError, QueryError, QueryResult};
use crate::project::{project_dto, project_entity, project_expressions, FromRow, Row};
use crate::query::{Projection, QuerySpec};
use crate::schema::Value;

/// A lazy, finite, non-restartable stream of raw result tuples.
pub type TupleStream<'a> = Box<dyn Iterator<Item = Result<Vec<Value>, ExecutionError>> + 'a>;

/// The delegated relational executor collaborator.
///
/// Implementations own connection acquisition, statement compilation and
/// result-set iteration; the engine owns everything before (spec
/// construction) and after (projection mapping). Failures must be reported
/// as [`ExecutionError`] - never swallowed, never retried.
pub trait RelationalExecutor {
    /// Submit a spec and return its result tuples, one tuple per row, each
    /// as wide as the spec's projection.
    fn execute<'a>(&'a self, spec: &QuerySpec) -> Result<TupleStream<'a>, ExecutionError>;
}

/// Lazy sequence of projected rows. Re-iterating requires re-execution.
pub struct Rows<'a> {
    tuples: TupleStream<'a>,
    spec: QuerySpec,
}

impl Iterator for Rows<'_> {
    type Item = QueryResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let tuple = match self.tuples.next()? {
            Ok(tuple) => tuple,
            Err(e) => return Some(Err(e.into())),
        };
        Some(self.project(tuple))
    }
}

impl Rows<'_> {
    fn project(&self, tuple: Vec<Value>) -> QueryResult<Row> {
        let row = match &self.spec.projection {
            Projection::Entity(name) => {
                let descriptor = self.spec.source(name).ok_or_else(|| {
                    ExecutionError::new(
                        format!("projected entity '{name}' is not a source"),
                        self.spec.to_string(),
                    )
                })?;
                project_entity(descriptor, tuple)?
            }
            Projection::Expressions(bindings) => project_expressions(bindings, tuple)?,
            Projection::Dto { shape, bindings } => project_dto(shape, bindings, tuple)?,
        };
        Ok(row)
    }
}

/// Paginated result envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// Authoritative total, derived from an unpaginated count query.
    pub total_count: u64,
    pub page_index: u64,
    pub page_size: u64,
}

impl<T> PageResult<T> {
    /// Number of pages: `ceil(total_count / page_size)`.
    pub fn page_count(&self) -> u64 {
        self.total_count.div_ceil(self.page_size)
    }
}

/// Execution facade over a relational executor.
pub struct Engine<'e> {
    executor: &'e dyn RelationalExecutor,
}

impl<'e> Engine<'e> {
    pub fn new(executor: &'e dyn RelationalExecutor) -> Self {
        Self { executor }
    }

    /// Execute a spec, returning a lazy sequence of projected rows.
    ///
    /// The sequence is finite and not restartable; iterate it again by
    /// calling `rows` again (which re-executes).
    pub fn rows(&self, spec: &QuerySpec) -> QueryResult<Rows<'e>> {
        let tuples = self.executor.execute(spec)?;
        Ok(Rows {
            tuples,
            spec: spec.clone(),
        })
    }

    /// Execute and materialize every row into `T`.
    pub fn fetch<T: FromRow>(&self, spec: &QuerySpec) -> QueryResult<Vec<T>> {
        self.rows(spec)?
            .map(|row| row.and_then(|r| T::from_row(&r).map_err(QueryError::from)))
            .collect()
    }

    /// Execute and materialize at most one row, `None` when nothing
    /// matched. More than one row is a [`CardinalityError`].
    pub fn fetch_one<T: FromRow>(&self, spec: &QuerySpec) -> QueryResult<Option<T>> {
        let mut rows = self.rows(spec)?;
        let Some(first) = rows.next().transpose()? else {
            return Ok(None);
        };
        if rows.next().is_some() {
            return Err(CardinalityError::MultipleRows.into());
        }
        Ok(Some(T::from_row(&first)?))
    }

    /// Execute a single-aggregate spec and return its one value.
    ///
    /// Fails with [`CardinalityError`] when the executor returns zero or
    /// more than one row, and with [`InvalidQueryError`] when the spec does
    /// not project exactly one expression.
    pub fn scalar(&self, spec: &QuerySpec) -> QueryResult<Value> {
        let width = match spec.projection.bindings() {
            Some(bindings) => bindings.len(),
            None => spec.projection_width(),
        };
        if width != 1 {
            return Err(InvalidQueryError::NotScalar(width).into());
        }
        let mut tuples = self.executor.execute(spec)?;
        let first = match tuples.next() {
            None => return Err(CardinalityError::NoRows.into()),
            Some(tuple) => tuple?,
        };
        if tuples.next().is_some() {
            return Err(CardinalityError::MultipleRows.into());
        }
        first
            .into_iter()
            .next()
            .ok_or_else(|| CardinalityError::NoRows.into())
    }

    /// Execute one page of a spec.
    ///
    /// Issues two independent sub-queries: a count of the spec's result
    /// rows for the authoritative `total_count` (the spec's
    /// [`QuerySpec::count_variant`], or for grouped specs an iteration of
    /// its [`QuerySpec::unwindowed`] variant, since there one result row is
    /// a group), then the spec itself with `offset = page_index * page_size`
    /// and `limit = page_size` (replacing any window already on the spec).
    /// No transactional consistency is guaranteed between the two - a
    /// concurrent writer can change the store in between. Callers that
    /// need a consistent pair must wrap both in an external transaction
    /// boundary at the executor level.
    pub fn page<T: FromRow>(
        &self,
        spec: &QuerySpec,
        page_index: u64,
        page_size: u64,
    ) -> QueryResult<PageResult<T>> {
        if page_size == 0 {
            return Err(InvalidQueryError::ZeroPageSize.into());
        }
        let total_count = if spec.is_aggregate() {
            let mut count: u64 = 0;
            for tuple in self.executor.execute(&spec.unwindowed())? {
                tuple?;
                count += 1;
            }
            count
        } else {
            match self.scalar(&spec.count_variant()) {
                Ok(Value::Int(n)) => u64::try_from(n).unwrap_or(0),
                Ok(other) => {
                    return Err(ExecutionError::new(
                        format!("count query returned non-integer value {other}"),
                        spec.to_string(),
                    )
                    .into())
                }
                Err(e) => return Err(e),
            }
        };
        let window = spec.with_window(page_index.saturating_mul(page_size), page_size);
        let items = self.fetch(&window)?;
        Ok(PageResult {
            items,
            total_count,
            page_index,
            page_size,
        })
    }
}
