//! Typed field handles - fallible expression factories.
//!
//! A [`FieldExpr`] is obtained from an entity descriptor and carries the
//! field's semantic type, so every comparison factory can check its
//! operands at construction time. A violation is a [`TypeMismatchError`]
//! returned from the factory call - it never reaches the executor.

use super::{AggregateFunc, BinaryOp, Expr, FieldRef};
use crate::error::TypeMismatchError;
use crate::query::QuerySpec;
use crate::schema::{FieldDescriptor, SemanticType, Value};

/// A typed handle to one entity field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExpr {
    field: FieldRef,
}

impl FieldExpr {
    pub(crate) fn new(entity: &str, field: &FieldDescriptor) -> Self {
        Self {
            field: FieldRef {
                entity: entity.into(),
                field: field.name.clone(),
                column: field.column.clone(),
                semantic_type: field.semantic_type,
                nullable: field.nullable,
            },
        }
    }

    pub fn field_ref(&self) -> &FieldRef {
        &self.field
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.field.semantic_type
    }

    /// This field as a bare expression (for projections and grouping).
    pub fn expr(&self) -> Expr {
        Expr::Field(self.field.clone())
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    pub fn eq(&self, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        self.compare(BinaryOp::Eq, value)
    }

    /// field <> value. A NULL field value matches neither `eq` nor `ne`;
    /// only `eq(v).not()` matches NULL rows.
    pub fn ne(&self, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        self.compare(BinaryOp::Ne, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        self.compare(BinaryOp::Gt, value)
    }

    pub fn gte(&self, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        self.compare(BinaryOp::Gte, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        self.compare(BinaryOp::Lt, value)
    }

    pub fn lte(&self, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        self.compare(BinaryOp::Lte, value)
    }

    fn compare(&self, op: BinaryOp, value: impl Into<Value>) -> Result<Expr, TypeMismatchError> {
        let value = self.check_operand(value.into())?;
        Ok(Expr::Binary {
            left: Box::new(self.expr()),
            op,
            right: Box::new(Expr::Literal(value)),
        })
    }

    /// low <= field <= high. Both bounds must match the field's type.
    pub fn between(
        &self,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Result<Expr, TypeMismatchError> {
        let low = self.check_operand(low.into())?;
        let high = self.check_operand(high.into())?;
        Ok(Expr::Between {
            expr: Box::new(self.expr()),
            low: Box::new(Expr::Literal(low)),
            high: Box::new(Expr::Literal(high)),
            negated: false,
        })
    }

    /// Correlate this field with a field of another entity (join predicate).
    pub fn eq_field(&self, other: &FieldExpr) -> Result<Expr, TypeMismatchError> {
        let left = self.semantic_type();
        let right = other.semantic_type();
        if !left.accepts(right) && !right.accepts(left) {
            return Err(TypeMismatchError::Fields {
                left: self.field.qualified(),
                left_type: left,
                right: other.field.qualified(),
                right_type: right,
            });
        }
        Ok(Expr::Binary {
            left: Box::new(self.expr()),
            op: BinaryOp::Eq,
            right: Box::new(other.expr()),
        })
    }

    // =========================================================================
    // String matching
    // =========================================================================

    /// SQL LIKE with `%`/`_` wildcards. Text fields only.
    pub fn like(&self, pattern: &str) -> Result<Expr, TypeMismatchError> {
        self.check_text("like")?;
        Ok(Expr::Binary {
            left: Box::new(self.expr()),
            op: BinaryOp::Like,
            right: Box::new(Expr::Literal(Value::Text(pattern.into()))),
        })
    }

    /// Substring match - LIKE `%needle%`.
    pub fn contains(&self, needle: &str) -> Result<Expr, TypeMismatchError> {
        self.check_text("contains")?;
        self.like(&format!("%{needle}%"))
    }

    /// Prefix match - LIKE `prefix%`.
    pub fn starts_with(&self, prefix: &str) -> Result<Expr, TypeMismatchError> {
        self.check_text("starts_with")?;
        self.like(&format!("{prefix}%"))
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// field IN (values...). Every value must match the field's type.
    pub fn in_values(
        &self,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<Expr, TypeMismatchError> {
        let values = values
            .into_iter()
            .map(|v| self.check_operand(v.into()).map(Expr::Literal))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::InList {
            expr: Box::new(self.expr()),
            values,
            negated: false,
        })
    }

    /// field IN (subquery). The subquery's column type is the executor's
    /// concern; only the shape is fixed here.
    pub fn in_subquery(&self, subquery: QuerySpec) -> Expr {
        Expr::InSubquery {
            expr: Box::new(self.expr()),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    /// field = (scalar subquery).
    pub fn eq_subquery(&self, subquery: QuerySpec) -> Expr {
        self.compare_subquery(BinaryOp::Eq, subquery)
    }

    /// field > (scalar subquery).
    pub fn gt_subquery(&self, subquery: QuerySpec) -> Expr {
        self.compare_subquery(BinaryOp::Gt, subquery)
    }

    /// field < (scalar subquery).
    pub fn lt_subquery(&self, subquery: QuerySpec) -> Expr {
        self.compare_subquery(BinaryOp::Lt, subquery)
    }

    fn compare_subquery(&self, op: BinaryOp, subquery: QuerySpec) -> Expr {
        Expr::Binary {
            left: Box::new(self.expr()),
            op,
            right: Box::new(Expr::Subquery(Box::new(subquery))),
        }
    }

    // =========================================================================
    // NULL tests
    // =========================================================================

    pub fn is_null(&self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.expr()),
            negated: false,
        }
    }

    pub fn is_not_null(&self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.expr()),
            negated: true,
        }
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// COUNT(field) - counts non-NULL values.
    pub fn count(&self) -> Expr {
        self.aggregate(AggregateFunc::Count, false)
    }

    /// COUNT(DISTINCT field).
    pub fn count_distinct(&self) -> Expr {
        self.aggregate(AggregateFunc::Count, true)
    }

    /// SUM(field). Numeric fields only.
    pub fn sum(&self) -> Result<Expr, TypeMismatchError> {
        self.numeric_aggregate(AggregateFunc::Sum, "sum")
    }

    /// AVG(field). Numeric fields only.
    pub fn avg(&self) -> Result<Expr, TypeMismatchError> {
        self.numeric_aggregate(AggregateFunc::Avg, "avg")
    }

    /// MIN(field).
    pub fn min(&self) -> Expr {
        self.aggregate(AggregateFunc::Min, false)
    }

    /// MAX(field).
    pub fn max(&self) -> Expr {
        self.aggregate(AggregateFunc::Max, false)
    }

    fn aggregate(&self, func: AggregateFunc, distinct: bool) -> Expr {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(self.expr())),
            distinct,
        }
    }

    fn numeric_aggregate(
        &self,
        func: AggregateFunc,
        name: &'static str,
    ) -> Result<Expr, TypeMismatchError> {
        if !self.semantic_type().is_numeric() {
            return Err(TypeMismatchError::NotNumeric {
                func: name,
                field: self.field.qualified(),
                actual: self.semantic_type(),
            });
        }
        Ok(self.aggregate(func, false))
    }

    // =========================================================================
    // Operand checks
    // =========================================================================

    fn check_operand(&self, value: Value) -> Result<Value, TypeMismatchError> {
        let Some(actual) = value.semantic_type() else {
            return Err(TypeMismatchError::NullOperand {
                field: self.field.qualified(),
            });
        };
        if !self.semantic_type().accepts(actual) {
            return Err(TypeMismatchError::Operand {
                field: self.field.qualified(),
                expected: self.semantic_type(),
                actual,
            });
        }
        Ok(value)
    }

    fn check_text(&self, op: &'static str) -> Result<(), TypeMismatchError> {
        if self.semantic_type() != SemanticType::Text {
            return Err(TypeMismatchError::NotText {
                op,
                field: self.field.qualified(),
                actual: self.semantic_type(),
            });
        }
        Ok(())
    }
}
