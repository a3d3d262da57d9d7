//! Query cursors
//!
//! A cursor walks one logical table: either a list of index entries
//! (indexed plans) or the tag's record list (scans), across every scan
//! target of the table (a base table unifies its source variants).
//!
//! Column values are decoded lazily from the payload on read, through
//! the table's extractor; nothing is materialised until the executor
//! asks for a column. Residual predicates (the conjuncts the access
//! path did not consume) are evaluated here, so `next` only ever stops
//! on matching rows.
//!
//! Synthetic columns, available on every table:
//!
//! | name      | value                          |
//! |-----------|--------------------------------|
//! | `_source` | source qualifier (base: empty) |
//! | `_rowid`  | record sequence                |
//! | `_offset` | byte offset in the store       |
//! | `_data`   | the raw payload bytes          |

use crate::catalog::{ColumnSink, Table};
use crate::index::IndexEntry;
use crate::query::ast::CompareOp;
use crate::store::{RecordSlot, RecordStore};
use crate::value::{compare_values, Value};

/// The four synthetic columns, in projection order
pub const SYNTHETIC_COLUMNS: [&str; 4] = ["_source", "_rowid", "_offset", "_data"];

/// Whether a name refers to a synthetic column
pub fn is_synthetic(name: &str) -> bool {
    SYNTHETIC_COLUMNS.contains(&name)
}

/// A residual predicate with its operand resolved to a concrete value
#[derive(Debug, Clone)]
pub struct ResolvedPredicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Row source for one scan target
pub enum TargetIter<'db> {
    /// Index entries from an Eq or Range access path
    Entries(std::vec::IntoIter<IndexEntry>),
    /// The tag's record list (sequential scan)
    Slots(std::slice::Iter<'db, RecordSlot>),
    /// Tag has no records yet
    Empty,
}

impl<'db> TargetIter<'db> {
    fn next_location(&mut self) -> Option<(u64, u64)> {
        match self {
            TargetIter::Entries(entries) => entries.next().map(|e| (e.offset, e.sequence)),
            TargetIter::Slots(slots) => slots.next().map(|s| (s.offset, s.sequence)),
            TargetIter::Empty => None,
        }
    }
}

/// One scan target: a concrete table (base or source variant) plus its
/// row source
pub struct Target<'db> {
    pub table: &'db Table,
    pub source: String,
    pub iter: TargetIter<'db>,
}

struct CurrentRow<'db> {
    payload: &'db [u8],
    sequence: u64,
    offset: u64,
    target: usize,
}

/// Cursor over one logical table
pub struct Cursor<'db> {
    store: &'db RecordStore,
    targets: Vec<Target<'db>>,
    next_target: usize,
    residual: Vec<ResolvedPredicate>,
    current: Option<CurrentRow<'db>>,
}

impl<'db> Cursor<'db> {
    /// Open a cursor and position it on the first matching row
    pub fn open(
        store: &'db RecordStore,
        targets: Vec<Target<'db>>,
        residual: Vec<ResolvedPredicate>,
    ) -> Self {
        let mut cursor = Self {
            store,
            targets,
            next_target: 0,
            residual,
            current: None,
        };
        cursor.advance();
        cursor
    }

    /// Iterator exhausted
    pub fn eof(&self) -> bool {
        self.current.is_none()
    }

    /// Advance to the next matching row
    pub fn advance(&mut self) {
        self.current = None;

        while self.next_target < self.targets.len() {
            let target = &mut self.targets[self.next_target];
            let Some((offset, sequence)) = target.iter.next_location() else {
                self.next_target += 1;
                continue;
            };

            let payload = self
                .store
                .payload_at(offset)
                .expect("index entries point at live records");

            let row = CurrentRow {
                payload,
                sequence,
                offset,
                target: self.next_target,
            };

            if self.row_matches(&row) {
                self.current = Some(row);
                return;
            }
        }
    }

    fn row_matches(&self, row: &CurrentRow<'db>) -> bool {
        let target = &self.targets[row.target];
        self.residual.iter().all(|predicate| {
            let actual = column_value(
                target.table,
                &target.source,
                row.payload,
                row.sequence,
                row.offset,
                &predicate.column,
            );
            predicate.op.matches(compare_values(&actual, &predicate.value))
        })
    }

    /// The sequence of the current row (the stable rowid)
    pub fn rowid(&self) -> Option<u64> {
        self.current.as_ref().map(|row| row.sequence)
    }

    /// The current row's payload, zero-copy
    pub fn payload(&self) -> Option<&'db [u8]> {
        self.current.as_ref().map(|row| row.payload)
    }

    /// Decode a column of the current row (declared or synthetic)
    pub fn column(&self, name: &str) -> Value {
        let Some(row) = &self.current else {
            return Value::Null;
        };
        let target = &self.targets[row.target];
        column_value(
            target.table,
            &target.source,
            row.payload,
            row.sequence,
            row.offset,
            name,
        )
    }
}

/// Sink capturing a single column value from the extractor fast path
#[derive(Default)]
struct SingleValue {
    value: Option<Value>,
}

impl SingleValue {
    fn take(&mut self) -> Value {
        self.value.take().unwrap_or(Value::Null)
    }
}

impl ColumnSink for SingleValue {
    fn push_null(&mut self) {
        self.value = Some(Value::Null);
    }
    fn push_bool(&mut self, v: bool) {
        self.value = Some(Value::Bool(v));
    }
    fn push_i64(&mut self, v: i64) {
        self.value = Some(Value::I64(v));
    }
    fn push_f64(&mut self, v: f64) {
        self.value = Some(Value::F64(v));
    }
    fn push_str(&mut self, v: &str) {
        self.value = Some(Value::Str(v.to_owned()));
    }
    fn push_bytes(&mut self, v: &[u8]) {
        self.value = Some(Value::Bytes(v.to_owned()));
    }
}

/// Decode one column for a row: synthetic columns first, then the
/// extractor fast path, then single-field extraction. Tables without an
/// extractor yield null on every declared column.
pub fn column_value(
    table: &Table,
    source: &str,
    payload: &[u8],
    sequence: u64,
    offset: u64,
    name: &str,
) -> Value {
    match name {
        "_source" => Value::Str(source.to_string()),
        "_rowid" => Value::I64(sequence as i64),
        "_offset" => Value::I64(offset as i64),
        "_data" => Value::Bytes(payload.to_vec()),
        _ => {
            let Some(extractor) = table.extractor() else {
                return Value::Null;
            };
            if let Some(index) = table.column_index(name) {
                let mut sink = SingleValue::default();
                if extractor.write_column(payload, index, &mut sink) {
                    return sink.take();
                }
            }
            extractor.extract(payload, name)
        }
    }
}
