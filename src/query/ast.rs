//! Query abstract syntax tree
//!
//! The SQL subset the dispatcher evaluates directly over the
//! planning/cursor contract:
//!
//! ```text
//! SELECT col [, col2 | AGG(col) ...] | *
//! FROM table
//! [WHERE col op value [AND ...]]
//! [ORDER BY col [ASC|DESC]]
//! [LIMIT n [OFFSET m]]
//! ```
//!
//! `BETWEEN a AND b` desugars in the parser to two inclusive
//! predicates, so the AST only knows simple comparisons. Positional `?`
//! placeholders are numbered left to right.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A parsed SELECT statement ready for planning
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Projected columns (or aggregates)
    pub columns: Vec<SelectColumn>,
    /// Target table (may be a quoted `"Table@source"` variant)
    pub table: String,
    /// AND-joined WHERE conjuncts
    pub predicates: Vec<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Number of `?` placeholders
    pub param_count: usize,
}

impl SelectStatement {
    /// Whether any projected column is an aggregate
    pub fn is_aggregate(&self) -> bool {
        self.columns
            .iter()
            .any(|c| matches!(c, SelectColumn::Aggregate { .. }))
    }
}

/// One projected column
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// `*`: declared columns followed by the synthetic ones
    Star,
    /// A declared or synthetic column by name
    Column(String),
    /// `AGG(col)`; `column` is `None` for `COUNT(*)`
    Aggregate {
        func: AggregateFunc,
        column: Option<String>,
    },
}

impl SelectColumn {
    /// Column header for result output
    pub fn display_name(&self) -> String {
        match self {
            SelectColumn::Star => "*".to_string(),
            SelectColumn::Column(name) => name.clone(),
            SelectColumn::Aggregate { func, column } => match column {
                Some(col) => format!("{}({})", func, col),
                None => format!("{}(*)", func),
            },
        }
    }
}

/// Aggregate functions available without GROUP BY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl std::fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "COUNT"),
            Self::Sum => write!(f, "SUM"),
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
            Self::Avg => write!(f, "AVG"),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Evaluate against an `Ordering` from `compare_values`
    pub fn matches(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Lt => ordering == Less,
            Self::Le => ordering != Greater,
            Self::Gt => ordering == Greater,
            Self::Ge => ordering != Less,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
        }
    }
}

/// A literal or positional placeholder on the right-hand side
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// Zero-based placeholder slot
    Param(usize),
}

impl Operand {
    /// Resolve to a concrete value against the bound parameters.
    /// Placeholder slots are validated before execution, so the index
    /// is in range here.
    pub fn resolve(&self, params: &[Value]) -> Value {
        match self {
            Operand::Literal(v) => v.clone(),
            Operand::Param(slot) => params[*slot].clone(),
        }
    }
}

/// One WHERE conjunct: `column op operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub operand: Operand,
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}
