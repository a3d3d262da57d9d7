//! SQL query engine
//!
//! A small SQL front-end evaluated directly over the engine's
//! planning/cursor contract:
//!
//! - **ast**: statement types
//! - **parser**: SQL subset → AST
//! - **plan**: access-path selection (index Eq / index Range / scan)
//! - **cursor**: lazy row iteration with residual filtering
//! - **executor**: parameter binding, aggregation, result shaping
//! - **error**: error types
//!
//! # Supported syntax
//!
//! ```text
//! SELECT col [, ...] | * | COUNT(*) | SUM(col) | MIN | MAX | AVG
//! FROM table
//! [WHERE col op value [AND ...]]
//! [ORDER BY col [ASC|DESC]]
//! [LIMIT n [OFFSET m]]
//! ```
//!
//! Every table also exposes the synthetic columns `_source`, `_rowid`,
//! `_offset` and `_data`; `_rowid` equals the record sequence and is
//! stable across export/reload.

pub mod ast;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod parser;
pub mod plan;

pub use ast::{
    AggregateFunc, CompareOp, Operand, OrderBy, Predicate, SelectColumn, SelectStatement,
};
pub use cursor::{Cursor, SYNTHETIC_COLUMNS};
pub use error::{QueryError, QueryResult};
pub use executor::{explain, run_query, run_query_count, QueryOutput};
pub use parser::parse_query;
pub use plan::{AccessPath, Plan, PlanKind};
