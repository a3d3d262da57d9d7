//! Access-path planning
//!
//! Given the WHERE conjuncts on one table, choose how the cursor reads
//! rows:
//!
//! - `IndexEq` — an equality on an indexed column, cost ≈ log N
//! - `IndexRange` — bounds on an indexed column, cost ∝ result size
//! - `Scan` — walk the tag's record list, cost ∝ record count
//!
//! Tie-breaks: Eq beats Range beats Scan; among equal kinds the column
//! declared earlier wins. Conjuncts the chosen path does not fully
//! consume stay behind as residual row filters — in particular
//! exclusive range bounds are fetched inclusively and re-checked
//! residually, and parameter type mismatches at bind time degrade the
//! whole plan to a scan (handled by the executor).

use crate::catalog::Table;
use crate::query::ast::{CompareOp, Operand, Predicate};

/// An inclusive-or-exclusive range endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    pub key: Operand,
    pub inclusive: bool,
}

/// How the cursor will read rows
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    IndexEq {
        column: String,
        key: Operand,
    },
    IndexRange {
        column: String,
        lo: Option<RangeBound>,
        hi: Option<RangeBound>,
    },
    Scan,
}

/// Plan kind, for introspection and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    IndexEq,
    IndexRange,
    Scan,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexEq => write!(f, "eq"),
            Self::IndexRange => write!(f, "range"),
            Self::Scan => write!(f, "scan"),
        }
    }
}

/// A chosen access path plus the residual row filters
#[derive(Debug, Clone)]
pub struct Plan {
    pub path: AccessPath,
    pub residual: Vec<Predicate>,
    pub estimated_cost: f64,
}

impl Plan {
    pub fn kind(&self) -> PlanKind {
        match self.path {
            AccessPath::IndexEq { .. } => PlanKind::IndexEq,
            AccessPath::IndexRange { .. } => PlanKind::IndexRange,
            AccessPath::Scan => PlanKind::Scan,
        }
    }

    /// A plan that scans and re-checks every conjunct
    pub fn full_scan(predicates: &[Predicate], table_rows: u64) -> Plan {
        Plan {
            path: AccessPath::Scan,
            residual: predicates.to_vec(),
            estimated_cost: table_rows as f64,
        }
    }
}

/// Choose the access path for `table` under the given conjuncts.
/// `table_rows` is the current record count, used for cost estimates.
pub fn choose(table: &Table, predicates: &[Predicate], table_rows: u64) -> Plan {
    // Eq wins outright; earlier-declared indexed column first
    for column in table.indexed_columns() {
        let eq = predicates
            .iter()
            .position(|p| &p.column == column && p.op == CompareOp::Eq);
        if let Some(chosen) = eq {
            let mut residual = predicates.to_vec();
            let predicate = residual.remove(chosen);
            return Plan {
                path: AccessPath::IndexEq {
                    column: column.clone(),
                    key: predicate.operand,
                },
                residual,
                estimated_cost: (table_rows.max(2) as f64).log2(),
            };
        }
    }

    // Then a range on the earliest indexed column with any bound
    for column in table.indexed_columns() {
        let lo = predicates
            .iter()
            .position(|p| &p.column == column && matches!(p.op, CompareOp::Gt | CompareOp::Ge));
        let hi = predicates
            .iter()
            .position(|p| &p.column == column && matches!(p.op, CompareOp::Lt | CompareOp::Le));
        if lo.is_none() && hi.is_none() {
            continue;
        }

        let mut consumed = Vec::new();
        let lo_bound = lo.map(|i| {
            let p = &predicates[i];
            let inclusive = p.op == CompareOp::Ge;
            if inclusive {
                consumed.push(i);
            }
            RangeBound {
                key: p.operand.clone(),
                inclusive,
            }
        });
        let hi_bound = hi.map(|i| {
            let p = &predicates[i];
            let inclusive = p.op == CompareOp::Le;
            if inclusive {
                consumed.push(i);
            }
            RangeBound {
                key: p.operand.clone(),
                inclusive,
            }
        });

        let residual: Vec<Predicate> = predicates
            .iter()
            .enumerate()
            .filter(|(i, _)| !consumed.contains(i))
            .map(|(_, p)| p.clone())
            .collect();

        return Plan {
            path: AccessPath::IndexRange {
                column: column.clone(),
                lo: lo_bound,
                hi: hi_bound,
            },
            residual,
            estimated_cost: (table_rows as f64) / 4.0,
        };
    }

    Plan::full_scan(predicates, table_rows)
}
