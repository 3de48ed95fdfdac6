//! Expression evaluation over in-memory rows.
//!
//! Used by [`super::MemoryStore`] only. Comparison semantics follow SQL:
//! a comparison with NULL is unknown and filters the row out, while
//! `IS NULL` observes NULL directly. Boolean context treats anything but
//! `TRUE` as non-matching.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;

use crate::error::ExecutionError;
use crate::expr::{AggregateFunc, BinaryOp, Expr, FieldRef};
use crate::schema::Value;

use super::memory::MemoryStore;

/// One stored row, keyed by column name.
pub(super) type StoredRow = HashMap<String, Value>;

/// A (possibly joined) row in scope: one stored row per source entity.
#[derive(Debug, Clone)]
pub(super) struct Scope<'a> {
    parts: Vec<(&'a str, &'a StoredRow)>,
}

impl<'a> Scope<'a> {
    pub(super) fn new(parts: Vec<(&'a str, &'a StoredRow)>) -> Self {
        Self { parts }
    }

    /// This scope with one more entity's row joined in.
    pub(super) fn extended(&self, entity: &'a str, row: &'a StoredRow) -> Self {
        let mut parts = self.parts.clone();
        parts.push((entity, row));
        Self { parts }
    }

    /// Resolve a field reference to its value. Fields of entities outside
    /// the scope are a construction bug and surface as an error upstream.
    pub(super) fn get(&self, field: &FieldRef) -> Option<Value> {
        self.parts
            .iter()
            .find(|(entity, _)| *entity == field.entity)
            .map(|(_, row)| row.get(&field.column).cloned().unwrap_or(Value::Null))
    }
}

/// Evaluation context: a single row, or a group of rows for aggregates.
pub(super) enum Ctx<'a, 'b> {
    Row(&'b Scope<'a>),
    /// Grouped context; bare field references resolve through the first
    /// row (legal references are grouped fields, constant per group).
    Group(&'b [Scope<'a>]),
}

impl<'a, 'b> Ctx<'a, 'b> {
    fn field(&self, field: &FieldRef) -> Option<Value> {
        match self {
            Ctx::Row(scope) => scope.get(field),
            Ctx::Group(scopes) => scopes.first().and_then(|scope| scope.get(field)),
        }
    }
}

/// Straight-line expression evaluator. No planning, no optimization - the
/// store is a reference collaborator, not a database.
pub(super) struct Evaluator<'s> {
    store: &'s MemoryStore,
    query: String,
}

impl<'s> Evaluator<'s> {
    pub(super) fn new(store: &'s MemoryStore, query: String) -> Self {
        Self { store, query }
    }

    fn fail(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::new(message, self.query.clone())
    }

    /// Evaluate a predicate to a match decision.
    pub(super) fn matches(&self, expr: &Expr, ctx: &Ctx<'_, '_>) -> Result<bool, ExecutionError> {
        Ok(matches!(self.eval(expr, ctx)?, Value::Bool(true)))
    }

    pub(super) fn eval(&self, expr: &Expr, ctx: &Ctx<'_, '_>) -> Result<Value, ExecutionError> {
        match expr {
            Expr::True => Ok(Value::Bool(true)),

            Expr::Field(field) => ctx
                .field(field)
                .ok_or_else(|| self.fail(format!("field '{}' not in scope", field.qualified()))),

            Expr::Literal(value) => Ok(value.clone()),

            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right, ctx),

            Expr::Not(inner) => {
                let matched = self.matches(inner, ctx)?;
                Ok(Value::Bool(!matched))
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expr, ctx)?;
                let low = self.eval(low, ctx)?;
                let high = self.eval(high, ctx)?;
                if value.is_null() || low.is_null() || high.is_null() {
                    return Ok(Value::Bool(false));
                }
                let inside = value.cmp_sql(&low) != Ordering::Less
                    && value.cmp_sql(&high) != Ordering::Greater;
                Ok(Value::Bool(inside != *negated))
            }

            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let needle = self.eval(expr, ctx)?;
                if needle.is_null() {
                    return Ok(Value::Bool(false));
                }
                let mut found = false;
                for candidate in values {
                    let candidate = self.eval(candidate, ctx)?;
                    if !candidate.is_null() && needle.cmp_sql(&candidate) == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found != *negated))
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let needle = self.eval(expr, ctx)?;
                if needle.is_null() {
                    return Ok(Value::Bool(false));
                }
                let mut found = false;
                for tuple in self.store.run(subquery)? {
                    let Some(candidate) = tuple.first() else {
                        continue;
                    };
                    if !candidate.is_null() && needle.cmp_sql(candidate) == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found != *negated))
            }

            Expr::IsNull { expr, negated } => {
                let value = self.eval(expr, ctx)?;
                Ok(Value::Bool(value.is_null() != *negated))
            }

            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => match ctx {
                Ctx::Group(scopes) => self.eval_aggregate(*func, arg.as_deref(), *distinct, scopes),
                Ctx::Row(_) => Err(self.fail("aggregate evaluated outside a grouped context")),
            },

            Expr::Subquery(spec) => {
                let mut tuples = self.store.run(spec)?.into_iter();
                let first = match tuples.next() {
                    // SQL semantics: an empty scalar subquery is NULL.
                    None => return Ok(Value::Null),
                    Some(tuple) => tuple,
                };
                if tuples.next().is_some() {
                    return Err(self.fail("scalar subquery returned more than one row"));
                }
                first
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.fail("scalar subquery returned an empty tuple"))
            }
        }
    }

    fn eval_binary(
        &self,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
        ctx: &Ctx<'_, '_>,
    ) -> Result<Value, ExecutionError> {
        match op {
            BinaryOp::And => {
                let matched = self.matches(left, ctx)? && self.matches(right, ctx)?;
                return Ok(Value::Bool(matched));
            }
            BinaryOp::Or => {
                let matched = self.matches(left, ctx)? || self.matches(right, ctx)?;
                return Ok(Value::Bool(matched));
            }
            _ => {}
        }

        let lhs = self.eval(left, ctx)?;
        let rhs = self.eval(right, ctx)?;

        match op {
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt
            | BinaryOp::Gte => {
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Bool(false));
                }
                let ord = lhs.cmp_sql(&rhs);
                let matched = match op {
                    BinaryOp::Eq => ord == Ordering::Equal,
                    BinaryOp::Ne => ord != Ordering::Equal,
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Lte => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    BinaryOp::Gte => ord != Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(Value::Bool(matched))
            }

            BinaryOp::Like => {
                let (Value::Text(text), Value::Text(pattern)) = (&lhs, &rhs) else {
                    if lhs.is_null() || rhs.is_null() {
                        return Ok(Value::Bool(false));
                    }
                    return Err(self.fail("LIKE requires text operands"));
                };
                let regex = like_to_regex(pattern)
                    .map_err(|e| self.fail(format!("invalid LIKE pattern '{pattern}': {e}")))?;
                Ok(Value::Bool(regex.is_match(text)))
            }

            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                self.eval_arithmetic(op, &lhs, &rhs)
            }

            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_arithmetic(
        &self,
        op: BinaryOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, ExecutionError> {
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            return match op {
                BinaryOp::Add => Ok(Value::Int(a.wrapping_add(*b))),
                BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(*b))),
                BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(*b))),
                BinaryOp::Div => {
                    if *b == 0 {
                        Err(self.fail("division by zero"))
                    } else {
                        Ok(Value::Int(a / b))
                    }
                }
                _ => unreachable!(),
            };
        }
        let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
            return Err(self.fail(format!("arithmetic on non-numeric values {lhs} and {rhs}")));
        };
        match op {
            BinaryOp::Add => Ok(Value::Float(a + b)),
            BinaryOp::Sub => Ok(Value::Float(a - b)),
            BinaryOp::Mul => Ok(Value::Float(a * b)),
            BinaryOp::Div => {
                if b == 0.0 {
                    Err(self.fail("division by zero"))
                } else {
                    Ok(Value::Float(a / b))
                }
            }
            _ => unreachable!(),
        }
    }

    fn eval_aggregate(
        &self,
        func: AggregateFunc,
        arg: Option<&Expr>,
        distinct: bool,
        scopes: &[Scope<'_>],
    ) -> Result<Value, ExecutionError> {
        let Some(arg) = arg else {
            // COUNT(*)
            return Ok(Value::Int(scopes.len() as i64));
        };

        let mut values = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let value = self.eval(arg, &Ctx::Row(scope))?;
            if !value.is_null() {
                values.push(value);
            }
        }
        if distinct {
            values.sort_by(Value::cmp_sql);
            values.dedup_by(|a, b| a.cmp_sql(b) == Ordering::Equal);
        }

        match func {
            AggregateFunc::Count => Ok(Value::Int(values.len() as i64)),
            AggregateFunc::Sum => {
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                if values.iter().all(|v| matches!(v, Value::Int(_))) {
                    let sum = values.iter().filter_map(Value::as_i64).sum::<i64>();
                    Ok(Value::Int(sum))
                } else {
                    let sum = values.iter().filter_map(Value::as_f64).sum::<f64>();
                    Ok(Value::Float(sum))
                }
            }
            AggregateFunc::Avg => {
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                let sum = values.iter().filter_map(Value::as_f64).sum::<f64>();
                Ok(Value::Float(sum / values.len() as f64))
            }
            AggregateFunc::Min => Ok(values
                .iter()
                .min_by(|a, b| a.cmp_sql(b))
                .cloned()
                .unwrap_or(Value::Null)),
            AggregateFunc::Max => Ok(values
                .iter()
                .max_by(|a, b| a.cmp_sql(b))
                .cloned()
                .unwrap_or(Value::Null)),
        }
    }
}

/// Translate a SQL LIKE pattern to an anchored regex: `%` matches any run,
/// `_` any single character, everything else literally.
fn like_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 4);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated)
}
