//! Query executor
//!
//! Runs a parsed statement against the record store and catalog:
//!
//! ```text
//! SQL → Parse → Plan → Open cursor → Filter → Shape → Result
//! ```
//!
//! Planning picks an index path or a scan (`plan`); the cursor walks
//! rows lazily (`cursor`); this module binds parameters, degrades the
//! plan to a scan when a parameter cannot be coerced to the index key
//! type, and shapes the output: projection, aggregation, ORDER BY,
//! LIMIT/OFFSET.

use crate::catalog::{Catalog, Table};
use crate::index::IndexError;
use crate::query::ast::{AggregateFunc, SelectColumn, SelectStatement};
use crate::query::cursor::{
    is_synthetic, Cursor, ResolvedPredicate, Target, TargetIter, SYNTHETIC_COLUMNS,
};
use crate::query::error::{QueryError, QueryResult};
use crate::query::parser::parse_query;
use crate::query::plan::{self, AccessPath, Plan};
use crate::store::RecordStore;
use crate::value::{compare_values, Value};
use std::cmp::Ordering;

/// Materialised result of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    /// Column headers in projection order
    pub columns: Vec<String>,
    /// Rows in the `Value` model
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse and execute, materialising rows
pub fn run_query(
    store: &RecordStore,
    catalog: &Catalog,
    sql: &str,
    params: &[Value],
) -> QueryResult<QueryOutput> {
    let stmt = parse_query(sql)?;
    execute_statement(store, catalog, &stmt, params)
}

/// Parse and execute without materialising rows; returns the row count
/// the query would produce
pub fn run_query_count(
    store: &RecordStore,
    catalog: &Catalog,
    sql: &str,
    params: &[Value],
) -> QueryResult<u64> {
    let stmt = parse_query(sql)?;
    let table = lookup_table(catalog, &stmt.table)?;
    check_params(&stmt, params)?;
    for predicate in &stmt.predicates {
        validate_column(table, &predicate.column)?;
    }

    if stmt.is_aggregate() {
        // Aggregation without GROUP BY produces a single row
        return Ok(apply_window_count(1, stmt.offset, stmt.limit));
    }

    let rows_estimate = table_rows(store, catalog, &stmt.table);
    let chosen = plan::choose(table, &stmt.predicates, rows_estimate);
    let mut cursor = open_cursor(store, catalog, &stmt, &chosen, params, rows_estimate)?;

    // Ordering cannot change the count, so the window math lets us stop
    // at offset + limit rows
    let stop_at = stmt
        .limit
        .map(|limit| stmt.offset.unwrap_or(0).saturating_add(limit));

    let mut count = 0u64;
    while !cursor.eof() {
        count += 1;
        if stop_at.is_some_and(|stop| count >= stop) {
            break;
        }
        cursor.advance();
    }

    Ok(apply_window_count(count, stmt.offset, stmt.limit))
}

/// Parse and plan only; exposes which access path would run
pub fn explain(store: &RecordStore, catalog: &Catalog, sql: &str) -> QueryResult<Plan> {
    let stmt = parse_query(sql)?;
    let table = lookup_table(catalog, &stmt.table)?;
    let rows_estimate = table_rows(store, catalog, &stmt.table);
    Ok(plan::choose(table, &stmt.predicates, rows_estimate))
}

/// Execute an already-parsed statement
pub fn execute_statement(
    store: &RecordStore,
    catalog: &Catalog,
    stmt: &SelectStatement,
    params: &[Value],
) -> QueryResult<QueryOutput> {
    let table = lookup_table(catalog, &stmt.table)?;
    check_params(stmt, params)?;
    for predicate in &stmt.predicates {
        validate_column(table, &predicate.column)?;
    }

    let rows_estimate = table_rows(store, catalog, &stmt.table);
    let chosen = plan::choose(table, &stmt.predicates, rows_estimate);
    let mut cursor = open_cursor(store, catalog, stmt, &chosen, params, rows_estimate)?;

    if stmt.is_aggregate() {
        return aggregate_rows(table, stmt, &mut cursor);
    }

    let columns = expand_columns(table, &stmt.columns)?;
    if let Some(order) = &stmt.order_by {
        validate_column(table, &order.column)?;
    }

    let mut keyed: Vec<(Value, Vec<Value>)> = Vec::new();
    let stop_at = match (&stmt.order_by, stmt.limit) {
        // Without an ORDER BY the window is in cursor order, so the
        // iteration can stop early
        (None, Some(limit)) => Some(stmt.offset.unwrap_or(0).saturating_add(limit) as usize),
        _ => None,
    };

    while !cursor.eof() {
        let key = match &stmt.order_by {
            Some(order) => cursor.column(&order.column),
            None => Value::Null,
        };
        let row: Vec<Value> = columns.iter().map(|name| cursor.column(name)).collect();
        keyed.push((key, row));

        if stop_at.is_some_and(|stop| keyed.len() >= stop) {
            break;
        }
        cursor.advance();
    }

    if let Some(order) = &stmt.order_by {
        // Stable sort keeps cursor order among equal keys
        keyed.sort_by(|a, b| {
            let ordering = compare_values(&a.0, &b.0);
            if order.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let offset = stmt.offset.unwrap_or(0) as usize;
    let limit = stmt.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let rows: Vec<Vec<Value>> = keyed
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|(_, row)| row)
        .collect();

    Ok(QueryOutput { columns, rows })
}

// ==================== Plan binding ====================

fn lookup_table<'db>(catalog: &'db Catalog, name: &str) -> QueryResult<&'db Table> {
    catalog
        .table(name)
        .ok_or_else(|| QueryError::NoSuchTable(name.to_string()))
}

fn check_params(stmt: &SelectStatement, params: &[Value]) -> QueryResult<()> {
    if stmt.param_count != params.len() {
        return Err(QueryError::ParamCount {
            expected: stmt.param_count,
            got: params.len(),
        });
    }
    Ok(())
}

/// Record count across the table's scan targets
fn table_rows(store: &RecordStore, catalog: &Catalog, name: &str) -> u64 {
    catalog
        .scan_targets(name)
        .iter()
        .map(|(tag, _)| store.count_by_tag(*tag) as u64)
        .sum()
}

/// Open a cursor for the chosen plan. A parameter that cannot be
/// coerced to the index key type degrades the whole plan to a scan with
/// every conjunct re-checked residually; the mismatch never surfaces.
fn open_cursor<'db>(
    store: &'db RecordStore,
    catalog: &'db Catalog,
    stmt: &SelectStatement,
    chosen: &Plan,
    params: &[Value],
    rows_estimate: u64,
) -> QueryResult<Cursor<'db>> {
    match try_open(store, catalog, &stmt.table, chosen, params) {
        Err(QueryError::Index(IndexError::TypeMismatch { expected, got })) => {
            tracing::debug!(
                table = %stmt.table,
                %expected,
                %got,
                "bind coercion failed, degrading to scan"
            );
            let fallback = Plan::full_scan(&stmt.predicates, rows_estimate);
            try_open(store, catalog, &stmt.table, &fallback, params)
        }
        other => other,
    }
}

fn try_open<'db>(
    store: &'db RecordStore,
    catalog: &'db Catalog,
    table_name: &str,
    chosen: &Plan,
    params: &[Value],
) -> QueryResult<Cursor<'db>> {
    let residual: Vec<ResolvedPredicate> = chosen
        .residual
        .iter()
        .map(|p| ResolvedPredicate {
            column: p.column.clone(),
            op: p.op,
            value: p.operand.resolve(params),
        })
        .collect();

    let mut targets = Vec::new();
    for (tag, source) in catalog.scan_targets(table_name) {
        let table = catalog
            .table_by_tag(tag)
            .expect("scan target tag is registered");

        let iter = match &chosen.path {
            AccessPath::Scan => match store.slots_by_tag(tag) {
                Some(slots) => TargetIter::Slots(slots.iter()),
                None => TargetIter::Empty,
            },
            AccessPath::IndexEq { column, key } => {
                let index = table.index(column).expect("planner chose an indexed column");
                let key = key.resolve(params);
                TargetIter::Entries(index.search(&key)?.into_iter())
            }
            AccessPath::IndexRange { column, lo, hi } => {
                let index = table.index(column).expect("planner chose an indexed column");
                let entries = match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        index.range(&lo.key.resolve(params), &hi.key.resolve(params))?
                    }
                    (Some(lo), None) => index.range_from(&lo.key.resolve(params))?,
                    (None, Some(hi)) => index.range_to(&hi.key.resolve(params))?,
                    (None, None) => index.all()?,
                };
                TargetIter::Entries(entries.into_iter())
            }
        };

        targets.push(Target {
            table,
            source,
            iter,
        });
    }

    Ok(Cursor::open(store, targets, residual))
}

// ==================== Shaping ====================

fn validate_column(table: &Table, name: &str) -> QueryResult<()> {
    if table.column(name).is_some() || is_synthetic(name) {
        Ok(())
    } else {
        Err(QueryError::NoSuchColumn(name.to_string()))
    }
}

/// Expand the projection into concrete column names. `*` is the
/// declared columns followed by the synthetic ones.
fn expand_columns(table: &Table, select: &[SelectColumn]) -> QueryResult<Vec<String>> {
    let mut out = Vec::new();
    for column in select {
        match column {
            SelectColumn::Star => {
                out.extend(table.columns().iter().map(|c| c.name.clone()));
                out.extend(SYNTHETIC_COLUMNS.iter().map(|s| s.to_string()));
            }
            SelectColumn::Column(name) => {
                validate_column(table, name)?;
                out.push(name.clone());
            }
            SelectColumn::Aggregate { .. } => {
                return Err(QueryError::Unsupported(
                    "aggregates cannot be mixed with plain columns".into(),
                ));
            }
        }
    }
    Ok(out)
}

#[derive(Default)]
struct AggState {
    rows: u64,
    non_null: u64,
    sum: f64,
    numeric: u64,
    min: Option<Value>,
    max: Option<Value>,
}

impl AggState {
    fn observe(&mut self, value: Value) {
        if value.is_null() {
            return;
        }
        self.non_null += 1;
        if let Some(f) = value.as_f64() {
            self.sum += f;
            self.numeric += 1;
        }
        let replace_min = self
            .min
            .as_ref()
            .map(|m| compare_values(&value, m) == Ordering::Less)
            .unwrap_or(true);
        if replace_min {
            self.min = Some(value.clone());
        }
        let replace_max = self
            .max
            .as_ref()
            .map(|m| compare_values(&value, m) == Ordering::Greater)
            .unwrap_or(true);
        if replace_max {
            self.max = Some(value);
        }
    }

    fn finish(&self, func: AggregateFunc, counts_all_rows: bool) -> Value {
        match func {
            AggregateFunc::Count => {
                if counts_all_rows {
                    Value::I64(self.rows as i64)
                } else {
                    Value::I64(self.non_null as i64)
                }
            }
            AggregateFunc::Sum => {
                if self.numeric > 0 {
                    Value::F64(self.sum)
                } else {
                    Value::Null
                }
            }
            AggregateFunc::Avg => {
                if self.numeric > 0 {
                    Value::F64(self.sum / self.numeric as f64)
                } else {
                    Value::Null
                }
            }
            AggregateFunc::Min => self.min.clone().unwrap_or(Value::Null),
            AggregateFunc::Max => self.max.clone().unwrap_or(Value::Null),
        }
    }
}

fn aggregate_rows(
    table: &Table,
    stmt: &SelectStatement,
    cursor: &mut Cursor<'_>,
) -> QueryResult<QueryOutput> {
    let mut specs: Vec<(AggregateFunc, Option<String>)> = Vec::new();
    for column in &stmt.columns {
        match column {
            SelectColumn::Aggregate { func, column } => {
                if let Some(name) = column {
                    validate_column(table, name)?;
                }
                specs.push((*func, column.clone()));
            }
            _ => {
                return Err(QueryError::Unsupported(
                    "aggregates cannot be mixed with plain columns".into(),
                ));
            }
        }
    }

    let mut states: Vec<AggState> = specs.iter().map(|_| AggState::default()).collect();
    while !cursor.eof() {
        for ((_, column), state) in specs.iter().zip(states.iter_mut()) {
            state.rows += 1;
            if let Some(name) = column {
                state.observe(cursor.column(name));
            }
        }
        cursor.advance();
    }

    let row: Vec<Value> = specs
        .iter()
        .zip(states.iter())
        .map(|((func, column), state)| state.finish(*func, column.is_none()))
        .collect();
    let columns: Vec<String> = stmt.columns.iter().map(|c| c.display_name()).collect();

    // LIMIT/OFFSET applies after aggregation
    let offset = stmt.offset.unwrap_or(0) as usize;
    let limit = stmt.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let rows: Vec<Vec<Value>> = vec![row].into_iter().skip(offset).take(limit).collect();

    Ok(QueryOutput { columns, rows })
}

fn apply_window_count(count: u64, offset: Option<u64>, limit: Option<u64>) -> u64 {
    let after_offset = count.saturating_sub(offset.unwrap_or(0));
    match limit {
        Some(limit) => after_offset.min(limit),
        None => after_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, RecordExtractor, TableDef};
    use crate::query::plan::PlanKind;
    use crate::value::ValueType;
    use rusqlite::Connection;
    use std::rc::Rc;

    // Fixture wire format:
    //   [4 filler][4 tag][id i32 LE][age i32 LE][name_len u32 LE][name bytes]
    fn user_payload(id: i32, age: i32, name: &str) -> Vec<u8> {
        let mut p = vec![0u8; 4];
        p.extend_from_slice(b"USER");
        p.extend_from_slice(&id.to_le_bytes());
        p.extend_from_slice(&age.to_le_bytes());
        p.extend_from_slice(&(name.len() as u32).to_le_bytes());
        p.extend_from_slice(name.as_bytes());
        p
    }

    fn user_extractor() -> Rc<dyn RecordExtractor> {
        Rc::new(|payload: &[u8], field: &str| -> Value {
            match field {
                "id" => Value::I32(i32::from_le_bytes(payload[8..12].try_into().unwrap())),
                "age" => Value::I32(i32::from_le_bytes(payload[12..16].try_into().unwrap())),
                "name" => {
                    let len =
                        u32::from_le_bytes(payload[16..20].try_into().unwrap()) as usize;
                    Value::Str(String::from_utf8_lossy(&payload[20..20 + len]).into_owned())
                }
                _ => Value::Null,
            }
        })
    }

    struct Fixture {
        store: RecordStore,
        catalog: Catalog,
    }

    fn fixture() -> Fixture {
        let conn = Rc::new(Connection::open_in_memory().unwrap());
        let mut catalog = Catalog::new(conn);
        catalog
            .add_table(&TableDef {
                name: "User".into(),
                columns: vec![
                    Column::new("id", ValueType::Int32),
                    Column::new("age", ValueType::Int32),
                    Column::new("name", ValueType::String),
                ],
                indexed: vec!["id".into()],
            })
            .unwrap();
        catalog.bind_tag("USER", "User").unwrap();
        catalog.set_extractor("User", user_extractor()).unwrap();

        Fixture {
            store: RecordStore::new(1024, 1 << 24),
            catalog,
        }
    }

    impl Fixture {
        fn ingest(&mut self, payload: &[u8]) {
            let catalog = &mut self.catalog;
            self.store
                .ingest_one(payload, |r| {
                    catalog.route(r.tag, r.payload, r.sequence, r.offset)
                })
                .unwrap();
        }

        fn seed_users(&mut self, count: i32) {
            for i in 0..count {
                self.ingest(&user_payload(i, 20 + (i % 50), &format!("User{i}")));
            }
        }

        fn query(&self, sql: &str) -> QueryOutput {
            run_query(&self.store, &self.catalog, sql, &[]).unwrap()
        }
    }

    #[test]
    fn test_select_columns() {
        let mut fx = fixture();
        fx.ingest(&user_payload(1, 30, "Alice"));
        fx.ingest(&user_payload(2, 25, "Bob"));

        let out = fx.query("SELECT id, name FROM User");
        assert_eq!(out.columns, vec!["id", "name"]);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0], vec![Value::I32(1), Value::Str("Alice".into())]);
        assert_eq!(out.rows[1], vec![Value::I32(2), Value::Str("Bob".into())]);
    }

    #[test]
    fn test_select_star_includes_synthetic() {
        let mut fx = fixture();
        fx.ingest(&user_payload(1, 30, "Alice"));

        let out = fx.query("SELECT * FROM User");
        assert_eq!(
            out.columns,
            vec!["id", "age", "name", "_source", "_rowid", "_offset", "_data"]
        );
        let row = &out.rows[0];
        assert_eq!(row[3], Value::Str("".into()));
        assert_eq!(row[4], Value::I64(1));
        assert_eq!(row[5], Value::I64(0));
        assert_eq!(row[6], Value::Bytes(user_payload(1, 30, "Alice")));
    }

    #[test]
    fn test_indexed_point_lookup() {
        let mut fx = fixture();
        fx.seed_users(1000);

        let plan = explain(&fx.store, &fx.catalog, "SELECT name FROM User WHERE id = 500").unwrap();
        assert_eq!(plan.kind(), PlanKind::IndexEq);

        let out = fx.query("SELECT name FROM User WHERE id = 500");
        assert_eq!(out.rows, vec![vec![Value::Str("User500".into())]]);
    }

    #[test]
    fn test_params_bind_positionally() {
        let mut fx = fixture();
        fx.seed_users(10);

        let out = run_query(
            &fx.store,
            &fx.catalog,
            "SELECT name FROM User WHERE id = ?",
            &[Value::I64(3)],
        )
        .unwrap();
        assert_eq!(out.rows, vec![vec![Value::Str("User3".into())]]);

        let err = run_query(&fx.store, &fx.catalog, "SELECT * FROM User WHERE id = ?", &[])
            .unwrap_err();
        assert!(matches!(err, QueryError::ParamCount { expected: 1, got: 0 }));
    }

    #[test]
    fn test_type_mismatch_degrades_to_scan() {
        let mut fx = fixture();
        fx.seed_users(10);

        // 'User3' cannot bind to the integer id index; the plan falls
        // back to a scan and the predicate is re-checked residually
        let out = run_query(
            &fx.store,
            &fx.catalog,
            "SELECT name FROM User WHERE id = ?",
            &[Value::Str("3".into())],
        )
        .unwrap();
        assert!(out.rows.is_empty());
    }

    #[test]
    fn test_scan_with_residual_filter() {
        let mut fx = fixture();
        for (id, age) in [(1, 45), (2, 50), (3, 55), (4, 60), (5, 40)] {
            fx.ingest(&user_payload(id, age, &format!("U{id}")));
        }

        let plan = explain(
            &fx.store,
            &fx.catalog,
            "SELECT COUNT(*) FROM User WHERE age BETWEEN 45 AND 55",
        )
        .unwrap();
        assert_eq!(plan.kind(), PlanKind::Scan);

        let out = fx.query("SELECT COUNT(*) FROM User WHERE age BETWEEN 45 AND 55");
        assert_eq!(out.rows, vec![vec![Value::I64(3)]]);
    }

    #[test]
    fn test_range_on_indexed_column() {
        let mut fx = fixture();
        fx.seed_users(100);

        let plan = explain(
            &fx.store,
            &fx.catalog,
            "SELECT id FROM User WHERE id BETWEEN 10 AND 19",
        )
        .unwrap();
        assert_eq!(plan.kind(), PlanKind::IndexRange);

        let out = fx.query("SELECT id FROM User WHERE id BETWEEN 10 AND 19");
        assert_eq!(out.rows.len(), 10);
        // Index range comes back in key order
        assert_eq!(out.rows[0], vec![Value::I32(10)]);
        assert_eq!(out.rows[9], vec![Value::I32(19)]);
    }

    #[test]
    fn test_exclusive_range() {
        let mut fx = fixture();
        fx.seed_users(10);

        let out = fx.query("SELECT id FROM User WHERE id > 7");
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0], vec![Value::I32(8)]);
    }

    #[test]
    fn test_aggregates() {
        let mut fx = fixture();
        for (id, age) in [(1, 10), (2, 20), (3, 30)] {
            fx.ingest(&user_payload(id, age, &format!("U{id}")));
        }

        let out = fx.query("SELECT COUNT(*), SUM(age), MIN(age), MAX(age), AVG(age) FROM User");
        assert_eq!(
            out.columns,
            vec!["COUNT(*)", "SUM(age)", "MIN(age)", "MAX(age)", "AVG(age)"]
        );
        assert_eq!(
            out.rows,
            vec![vec![
                Value::I64(3),
                Value::F64(60.0),
                Value::I32(10),
                Value::I32(30),
                Value::F64(20.0),
            ]]
        );
    }

    #[test]
    fn test_aggregates_on_empty_table() {
        let fx = fixture();
        let out = fx.query("SELECT COUNT(*), SUM(age), MIN(age) FROM User");
        assert_eq!(
            out.rows,
            vec![vec![Value::I64(0), Value::Null, Value::Null]]
        );
    }

    #[test]
    fn test_order_by_limit_offset() {
        let mut fx = fixture();
        for (id, age) in [(1, 30), (2, 10), (3, 20), (4, 40)] {
            fx.ingest(&user_payload(id, age, &format!("U{id}")));
        }

        let out = fx.query("SELECT id FROM User ORDER BY age DESC LIMIT 2 OFFSET 1");
        assert_eq!(out.rows, vec![vec![Value::I32(1)], vec![Value::I32(3)]]);
    }

    #[test]
    fn test_limit_without_order_short_circuits() {
        let mut fx = fixture();
        fx.seed_users(100);

        let out = fx.query("SELECT id FROM User LIMIT 5");
        assert_eq!(out.rows.len(), 5);
        assert_eq!(out.rows[0], vec![Value::I32(0)]);
    }

    #[test]
    fn test_query_count_skips_materialisation() {
        let mut fx = fixture();
        fx.seed_users(50);

        let n = run_query_count(&fx.store, &fx.catalog, "SELECT * FROM User", &[]).unwrap();
        assert_eq!(n, 50);

        let n = run_query_count(
            &fx.store,
            &fx.catalog,
            "SELECT * FROM User WHERE id < 10 LIMIT 4",
            &[],
        )
        .unwrap();
        assert_eq!(n, 4);

        let n = run_query_count(
            &fx.store,
            &fx.catalog,
            "SELECT COUNT(*) FROM User",
            &[],
        )
        .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_errors() {
        let fx = fixture();
        assert!(matches!(
            run_query(&fx.store, &fx.catalog, "SELECT * FROM Missing", &[]),
            Err(QueryError::NoSuchTable(_))
        ));
        assert!(matches!(
            run_query(&fx.store, &fx.catalog, "SELECT nope FROM User", &[]),
            Err(QueryError::NoSuchColumn(_))
        ));
        assert!(matches!(
            run_query(&fx.store, &fx.catalog, "SELECT id, COUNT(*) FROM User", &[]),
            Err(QueryError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rowid_is_sequence() {
        let mut fx = fixture();
        fx.seed_users(3);
        let out = fx.query("SELECT _rowid FROM User ORDER BY _rowid");
        assert_eq!(
            out.rows,
            vec![
                vec![Value::I64(1)],
                vec![Value::I64(2)],
                vec![Value::I64(3)]
            ]
        );
    }
}
