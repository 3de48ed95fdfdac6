//! Expression AST - the typed predicate and value algebra.
//!
//! Expressions are pure value trees: every node owns its children
//! exclusively and two expressions are equal when they are structurally
//! equal. Construction is the only place type constraints are enforced
//! (see [`FieldExpr`]); evaluation happens inside the delegated executor,
//! so the tree only describes structure.
//!
//! # Dynamic composition
//!
//! Predicates assembled from optional filter values start from the neutral
//! identity [`always_true`] and fold each present filter with AND:
//!
//! ```
//! use quarry::expr::fold_and;
//! # use quarry::schema::{EntityDescriptor, SemanticType};
//! # let user = EntityDescriptor::builder("user", "t_user")
//! #     .field("age", SemanticType::Integer, "t_age")
//! #     .build().unwrap();
//! let age_filter: Option<i64> = None;
//! let predicate = fold_and([
//!     age_filter.map(|a| user.field_ref("age").unwrap().eq(a).unwrap()),
//! ]);
//! assert!(predicate.is_match_all());
//! ```
//!
//! Applying filters in any order yields a structurally different but
//! semantically equivalent tree; folding zero filters yields `Expr::True`.

mod field;

use serde::{Deserialize, Serialize};

pub use field::FieldExpr;

use crate::query::QuerySpec;
use crate::schema::{SemanticType, Value};

/// A resolved reference to one entity field.
///
/// Can only be obtained through an [`crate::schema::EntityDescriptor`], so a
/// field reference to an undeclared field is unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub entity: String,
    pub field: String,
    pub column: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
}

impl FieldRef {
    /// Qualified `entity.field` name for diagnostics.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.entity, self.field)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // String
    Like,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Like => "LIKE",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

/// A typed expression node.
///
/// Every variant must be handled by the executor's evaluator - the compiler
/// enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Neutral identity predicate ("match all"). The starting point for
    /// dynamically folded filter chains.
    True,

    /// Reference to an entity field.
    Field(FieldRef),

    /// Literal value.
    Literal(Value),

    /// Binary operation: left op right.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Logical negation.
    Not(Box<Expr>),

    /// expr BETWEEN low AND high.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// expr IN (values...).
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// expr IN (subquery).
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<QuerySpec>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL.
    IsNull { expr: Box<Expr>, negated: bool },

    /// Aggregate function over an argument; `None` means `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },

    /// Scalar subquery: (SELECT ...) usable as a comparison operand.
    Subquery(Box<QuerySpec>),
}

impl Expr {
    /// Conjoin two predicates.
    pub fn and(self, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op: BinaryOp::And,
            right: Box::new(other),
        }
    }

    /// Disjoin two predicates.
    pub fn or(self, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op: BinaryOp::Or,
            right: Box::new(other),
        }
    }

    /// Negate a predicate.
    ///
    /// Negation is two-valued over the match decision: a row the inner
    /// predicate does not match (including one it skipped because a compared
    /// value was NULL) is matched by the negation. So `eq(v).not()` matches
    /// NULL rows while [`FieldExpr::ne`] excludes them; use `ne` when NULL
    /// should stay filtered out.
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Compare this expression against a literal value. Unchecked: typed
    /// construction goes through [`FieldExpr`]; this exists for operands
    /// with no field to check against, aggregates above all.
    pub fn eq_value(self, value: impl Into<Value>) -> Expr {
        self.compare_value(BinaryOp::Eq, value)
    }

    pub fn ne_value(self, value: impl Into<Value>) -> Expr {
        self.compare_value(BinaryOp::Ne, value)
    }

    pub fn gt_value(self, value: impl Into<Value>) -> Expr {
        self.compare_value(BinaryOp::Gt, value)
    }

    pub fn gte_value(self, value: impl Into<Value>) -> Expr {
        self.compare_value(BinaryOp::Gte, value)
    }

    pub fn lt_value(self, value: impl Into<Value>) -> Expr {
        self.compare_value(BinaryOp::Lt, value)
    }

    pub fn lte_value(self, value: impl Into<Value>) -> Expr {
        self.compare_value(BinaryOp::Lte, value)
    }

    fn compare_value(self, op: BinaryOp, value: impl Into<Value>) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(Expr::Literal(value.into())),
        }
    }

    /// Whether this predicate is the neutral "match all" identity.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Expr::True)
    }

    /// Whether any node of this tree (outside subqueries) is an aggregate.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Not(inner) => inner.contains_aggregate(),
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::InList { expr, values, .. } => {
                expr.contains_aggregate() || values.iter().any(Expr::contains_aggregate)
            }
            Expr::InSubquery { expr, .. } => expr.contains_aggregate(),
            Expr::IsNull { expr, .. } => expr.contains_aggregate(),
            _ => false,
        }
    }

    /// Visit every field reference in this tree, with a flag telling
    /// whether the reference sits inside an aggregate. Subquery bodies are
    /// not visited - they are validated against their own sources.
    pub fn walk_fields<'a>(&'a self, visit: &mut impl FnMut(&'a FieldRef, bool)) {
        self.walk_fields_inner(visit, false);
    }

    fn walk_fields_inner<'a>(
        &'a self,
        visit: &mut impl FnMut(&'a FieldRef, bool),
        in_aggregate: bool,
    ) {
        match self {
            Expr::Field(field) => visit(field, in_aggregate),
            Expr::Binary { left, right, .. } => {
                left.walk_fields_inner(visit, in_aggregate);
                right.walk_fields_inner(visit, in_aggregate);
            }
            Expr::Not(inner) => inner.walk_fields_inner(visit, in_aggregate),
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.walk_fields_inner(visit, in_aggregate);
                low.walk_fields_inner(visit, in_aggregate);
                high.walk_fields_inner(visit, in_aggregate);
            }
            Expr::InList { expr, values, .. } => {
                expr.walk_fields_inner(visit, in_aggregate);
                for value in values {
                    value.walk_fields_inner(visit, in_aggregate);
                }
            }
            Expr::InSubquery { expr, .. } => expr.walk_fields_inner(visit, in_aggregate),
            Expr::IsNull { expr, .. } => expr.walk_fields_inner(visit, in_aggregate),
            Expr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.walk_fields_inner(visit, true);
                }
            }
            Expr::True | Expr::Literal(_) | Expr::Subquery(_) => {}
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::True => write!(f, "TRUE"),
            Expr::Field(field) => write!(f, "{}", field.qualified()),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Binary { left, op, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expr::Not(inner) => write!(f, "NOT ({inner})"),
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({expr} {not}BETWEEN {low} AND {high})")
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let list = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({expr} {not}IN ({list}))")
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({expr} {not}IN ({subquery}))")
            }
            Expr::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "({expr} IS{not} NULL)")
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                let prefix = if *distinct { "DISTINCT " } else { "" };
                match arg {
                    Some(arg) => write!(f, "{}({prefix}{arg})", func.name()),
                    None => write!(f, "{}(*)", func.name()),
                }
            }
            Expr::Subquery(spec) => write!(f, "({spec})"),
        }
    }
}

/// The neutral identity predicate: matches every row.
pub fn always_true() -> Expr {
    Expr::True
}

/// COUNT(*).
pub fn count_star() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
        distinct: false,
    }
}

/// Fold optional filters into one conjunction, skipping absent ones.
///
/// Zero present filters yield [`Expr::True`]. The fold is associative and
/// commutative with respect to the selected row set: reordering the inputs
/// changes the tree shape, never the results.
pub fn fold_and(filters: impl IntoIterator<Item = Option<Expr>>) -> Expr {
    filters
        .into_iter()
        .flatten()
        .reduce(Expr::and)
        .unwrap_or(Expr::True)
}
