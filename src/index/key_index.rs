//! Key index - SQLite-backed B-tree over one indexed column
//!
//! Each index is a table `_idx_{table}_{column}` in the engine's shared
//! in-memory SQLite connection:
//!
//! ```sql
//! CREATE TABLE "_idx_User_id" (
//!     key INTEGER NOT NULL,       -- affinity from the declared key type
//!     data_offset INTEGER NOT NULL,
//!     data_length INTEGER NOT NULL,
//!     sequence INTEGER NOT NULL,
//!     PRIMARY KEY (key, sequence)
//! ) WITHOUT ROWID
//! ```
//!
//! The composite `(key, sequence)` primary key allows duplicate keys
//! (non-unique indexes, e.g. foreign keys) and stores entries in exactly
//! the order the contracts require: ascending key, ties by sequence
//! ascending. `search_first` therefore returns the lowest sequence for a
//! key without an ORDER BY.
//!
//! # Performance
//! - Insert: O(log n)
//! - Exact / first-match: O(log n)
//! - Range: O(log n + k)
//!
//! The int64 and string fast paths bind primitives directly and skip
//! both tagged-union dispatch and key re-extraction; they are the hot
//! path for keyed SQL lookups.

use crate::index::{IndexEntry, IndexError, IndexResult};
use crate::value::{Value, ValueType};
use rusqlite::{params, Connection, Row};
use std::rc::Rc;

/// A typed secondary index over one `(table, column)` pair
pub struct KeyIndex {
    conn: Rc<Connection>,
    index_table: String,
    key_type: ValueType,
    entry_count: u64,

    // Statement text built once; rusqlite's statement cache keeps the
    // compiled form alive across calls
    insert_sql: String,
    search_sql: String,
    search_first_sql: String,
    range_sql: String,
    range_from_sql: String,
    range_to_sql: String,
    all_sql: String,
    clear_sql: String,
}

impl KeyIndex {
    /// Create or open the index table for `(table, column)` with the
    /// given declared key type
    pub fn new(
        conn: Rc<Connection>,
        table: &str,
        column: &str,
        key_type: ValueType,
    ) -> IndexResult<Self> {
        let index_table = format!("_idx_{}_{}", table, column);

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (
                key {affinity} NOT NULL,
                data_offset INTEGER NOT NULL,
                data_length INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                PRIMARY KEY (key, sequence)
            ) WITHOUT ROWID",
            t = index_table,
            affinity = sqlite_affinity(key_type),
        ))?;

        let insert_sql = format!(
            "INSERT INTO \"{t}\" (key, data_offset, data_length, sequence) VALUES (?, ?, ?, ?)",
            t = index_table
        );
        let search_sql = format!(
            "SELECT key, data_offset, data_length, sequence FROM \"{t}\" WHERE key = ?",
            t = index_table
        );
        let search_first_sql = format!(
            "SELECT key, data_offset, data_length, sequence FROM \"{t}\" WHERE key = ? LIMIT 1",
            t = index_table
        );
        let range_sql = format!(
            "SELECT key, data_offset, data_length, sequence FROM \"{t}\"
             WHERE key >= ? AND key <= ? ORDER BY key, sequence",
            t = index_table
        );
        let range_from_sql = format!(
            "SELECT key, data_offset, data_length, sequence FROM \"{t}\"
             WHERE key >= ? ORDER BY key, sequence",
            t = index_table
        );
        let range_to_sql = format!(
            "SELECT key, data_offset, data_length, sequence FROM \"{t}\"
             WHERE key <= ? ORDER BY key, sequence",
            t = index_table
        );
        let all_sql = format!(
            "SELECT key, data_offset, data_length, sequence FROM \"{t}\" ORDER BY key, sequence",
            t = index_table
        );
        let clear_sql = format!("DELETE FROM \"{t}\"", t = index_table);

        Ok(Self {
            conn,
            index_table,
            key_type,
            entry_count: 0,
            insert_sql,
            search_sql,
            search_first_sql,
            range_sql,
            range_from_sql,
            range_to_sql,
            all_sql,
            clear_sql,
        })
    }

    /// The declared logical key type; routes inserts and coerces search
    /// arguments
    pub fn key_type(&self) -> ValueType {
        self.key_type
    }

    /// Name of the backing SQLite table
    pub fn index_table(&self) -> &str {
        &self.index_table
    }

    /// Entries currently in the index
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Add an entry. Duplicate keys are allowed; uniqueness is
    /// `(key, sequence)`.
    pub fn insert(
        &mut self,
        key: &Value,
        offset: u64,
        length: u32,
        sequence: u64,
    ) -> IndexResult<()> {
        let key = self.coerce_key(key)?;
        let mut stmt = self.conn.prepare_cached(&self.insert_sql)?;
        stmt.execute(params![
            key,
            offset as i64,
            length as i64,
            sequence as i64
        ])?;
        self.entry_count += 1;
        Ok(())
    }

    /// All entries whose key equals `key`
    pub fn search(&self, key: &Value) -> IndexResult<Vec<IndexEntry>> {
        let key = self.coerce_key(key)?;
        let mut stmt = self.conn.prepare_cached(&self.search_sql)?;
        let rows = stmt.query_map([key], |row| self.entry_from_row(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The lowest-sequence entry matching `key`, if any
    pub fn search_first(&self, key: &Value) -> IndexResult<Option<IndexEntry>> {
        let key = self.coerce_key(key)?;
        let mut stmt = self.conn.prepare_cached(&self.search_first_sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(self.entry_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Fast path: first match for an int64 key, no tagged-union dispatch.
    ///
    /// Returns `(offset, length, sequence)`.
    pub fn search_first_i64(&self, key: i64) -> IndexResult<Option<(u64, u32, u64)>> {
        let mut stmt = self.conn.prepare_cached(&self.search_first_sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(location_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Fast path: first match for a string key, no tagged-union dispatch
    pub fn search_first_str(&self, key: &str) -> IndexResult<Option<(u64, u32, u64)>> {
        let mut stmt = self.conn.prepare_cached(&self.search_first_sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(location_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// All entries with `lo <= key <= hi`, ascending key order, ties by
    /// sequence ascending
    pub fn range(&self, lo: &Value, hi: &Value) -> IndexResult<Vec<IndexEntry>> {
        let lo = self.coerce_key(lo)?;
        let hi = self.coerce_key(hi)?;
        let mut stmt = self.conn.prepare_cached(&self.range_sql)?;
        let rows = stmt.query_map(params![lo, hi], |row| self.entry_from_row(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All entries with `lo <= key`, ascending key order
    pub fn range_from(&self, lo: &Value) -> IndexResult<Vec<IndexEntry>> {
        let lo = self.coerce_key(lo)?;
        let mut stmt = self.conn.prepare_cached(&self.range_from_sql)?;
        let rows = stmt.query_map([lo], |row| self.entry_from_row(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All entries with `key <= hi`, ascending key order
    pub fn range_to(&self, hi: &Value) -> IndexResult<Vec<IndexEntry>> {
        let hi = self.coerce_key(hi)?;
        let mut stmt = self.conn.prepare_cached(&self.range_to_sql)?;
        let rows = stmt.query_map([hi], |row| self.entry_from_row(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Full contents in ascending key order, ties by sequence ascending
    pub fn all(&self) -> IndexResult<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare_cached(&self.all_sql)?;
        let rows = stmt.query_map([], |row| self.entry_from_row(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Drop all entries
    pub fn clear(&mut self) -> IndexResult<()> {
        self.conn.execute(&self.clear_sql, [])?;
        self.entry_count = 0;
        Ok(())
    }

    /// Coerce a key or bound parameter into the index's storage
    /// representation. Cross-kind coercion is rejected; the planner
    /// degrades to a scan on `TypeMismatch`.
    fn coerce_key(&self, key: &Value) -> IndexResult<rusqlite::types::Value> {
        use rusqlite::types::Value as Sql;

        let mismatch = || IndexError::TypeMismatch {
            expected: self.key_type,
            got: key.value_type(),
        };

        if self.key_type.is_integer() {
            return key.as_i64().map(Sql::Integer).ok_or_else(mismatch);
        }
        if self.key_type.is_float() {
            return key.as_f64().map(Sql::Real).ok_or_else(mismatch);
        }
        match self.key_type {
            ValueType::String => key
                .as_str()
                .map(|s| Sql::Text(s.to_owned()))
                .ok_or_else(mismatch),
            ValueType::Bytes => key
                .as_bytes()
                .map(|b| Sql::Blob(b.to_owned()))
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }

    /// Rebuild the original key from its storage representation, per the
    /// declared key type
    fn key_from_row(&self, row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
        Ok(match self.key_type {
            ValueType::Int8 => Value::I8(row.get::<_, i64>(idx)? as i8),
            ValueType::Int16 => Value::I16(row.get::<_, i64>(idx)? as i16),
            ValueType::Int32 => Value::I32(row.get::<_, i64>(idx)? as i32),
            ValueType::Int64 => Value::I64(row.get(idx)?),
            ValueType::UInt8 => Value::U8(row.get::<_, i64>(idx)? as u8),
            ValueType::UInt16 => Value::U16(row.get::<_, i64>(idx)? as u16),
            ValueType::UInt32 => Value::U32(row.get::<_, i64>(idx)? as u32),
            ValueType::UInt64 => Value::U64(row.get::<_, i64>(idx)? as u64),
            ValueType::Float32 => Value::F32(row.get::<_, f64>(idx)? as f32),
            ValueType::Float64 => Value::F64(row.get(idx)?),
            ValueType::String => Value::Str(row.get(idx)?),
            ValueType::Bool => Value::Bool(row.get::<_, i64>(idx)? != 0),
            ValueType::Bytes => Value::Bytes(row.get(idx)?),
            ValueType::Null => Value::Null,
        })
    }

    fn entry_from_row(&self, row: &Row<'_>) -> rusqlite::Result<IndexEntry> {
        Ok(IndexEntry {
            key: self.key_from_row(row, 0)?,
            offset: row.get::<_, i64>(1)? as u64,
            length: row.get::<_, i64>(2)? as u32,
            sequence: row.get::<_, i64>(3)? as u64,
        })
    }
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<(u64, u32, u64)> {
    Ok((
        row.get::<_, i64>(1)? as u64,
        row.get::<_, i64>(2)? as u32,
        row.get::<_, i64>(3)? as u64,
    ))
}

/// SQLite column affinity for a declared key type
fn sqlite_affinity(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Int8
        | ValueType::Int16
        | ValueType::Int32
        | ValueType::Int64
        | ValueType::UInt8
        | ValueType::UInt16
        | ValueType::UInt32
        | ValueType::UInt64
        | ValueType::Bool => "INTEGER",
        ValueType::Float32 | ValueType::Float64 => "REAL",
        ValueType::String => "TEXT",
        ValueType::Null | ValueType::Bytes => "BLOB",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Rc<Connection> {
        Rc::new(Connection::open_in_memory().unwrap())
    }

    fn int_index(conn: &Rc<Connection>) -> KeyIndex {
        KeyIndex::new(Rc::clone(conn), "User", "id", ValueType::Int32).unwrap()
    }

    #[test]
    fn test_insert_and_search() {
        let conn = test_conn();
        let mut idx = int_index(&conn);

        idx.insert(&Value::I32(5), 100, 32, 1).unwrap();
        idx.insert(&Value::I32(7), 140, 32, 2).unwrap();

        let hits = idx.search(&Value::I32(5)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, 100);
        assert_eq!(hits[0].length, 32);
        assert_eq!(hits[0].sequence, 1);
        assert_eq!(hits[0].key, Value::I32(5));

        assert!(idx.search(&Value::I32(6)).unwrap().is_empty());
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_duplicate_keys_all_returned() {
        let conn = test_conn();
        let mut idx = int_index(&conn);

        for seq in 1..=5u64 {
            idx.insert(&Value::I32(42), seq * 100, 10, seq).unwrap();
        }

        let hits = idx.search(&Value::I32(42)).unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_search_first_returns_lowest_sequence() {
        let conn = test_conn();
        let mut idx = int_index(&conn);

        // Inserted out of sequence order; the (key, sequence) primary
        // key still yields the lowest sequence first
        idx.insert(&Value::I32(9), 300, 10, 3).unwrap();
        idx.insert(&Value::I32(9), 100, 10, 1).unwrap();
        idx.insert(&Value::I32(9), 200, 10, 2).unwrap();

        let first = idx.search_first(&Value::I32(9)).unwrap().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.offset, 100);

        assert!(idx.search_first(&Value::I32(8)).unwrap().is_none());
    }

    #[test]
    fn test_fast_paths() {
        let conn = test_conn();
        let mut idx = int_index(&conn);
        idx.insert(&Value::I32(500), 4096, 64, 7).unwrap();

        let (offset, length, sequence) = idx.search_first_i64(500).unwrap().unwrap();
        assert_eq!((offset, length, sequence), (4096, 64, 7));
        assert!(idx.search_first_i64(501).unwrap().is_none());

        let mut sidx =
            KeyIndex::new(Rc::clone(&conn), "User", "email", ValueType::String).unwrap();
        sidx.insert(&Value::Str("a@x.com".into()), 10, 20, 1).unwrap();
        let (offset, ..) = sidx.search_first_str("a@x.com").unwrap().unwrap();
        assert_eq!(offset, 10);
        assert!(sidx.search_first_str("b@x.com").unwrap().is_none());
    }

    #[test]
    fn test_range_inclusive_with_sequence_ties() {
        let conn = test_conn();
        let mut idx = int_index(&conn);

        idx.insert(&Value::I32(1), 10, 1, 1).unwrap();
        idx.insert(&Value::I32(3), 30, 1, 4).unwrap();
        idx.insert(&Value::I32(3), 31, 1, 2).unwrap();
        idx.insert(&Value::I32(5), 50, 1, 3).unwrap();
        idx.insert(&Value::I32(9), 90, 1, 5).unwrap();

        let hits = idx.range(&Value::I32(3), &Value::I32(5)).unwrap();
        let keys: Vec<_> = hits.iter().map(|e| (e.key.clone(), e.sequence)).collect();
        assert_eq!(
            keys,
            vec![
                (Value::I32(3), 2),
                (Value::I32(3), 4),
                (Value::I32(5), 3),
            ]
        );
    }

    #[test]
    fn test_all_ordered_by_key() {
        let conn = test_conn();
        let mut idx = int_index(&conn);
        for (key, seq) in [(9, 1u64), (2, 2), (7, 3), (2, 4)] {
            idx.insert(&Value::I32(key), seq * 8, 4, seq).unwrap();
        }
        let all = idx.all().unwrap();
        let order: Vec<_> = all.iter().map(|e| (e.key.clone(), e.sequence)).collect();
        assert_eq!(
            order,
            vec![
                (Value::I32(2), 2),
                (Value::I32(2), 4),
                (Value::I32(7), 3),
                (Value::I32(9), 1),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let conn = test_conn();
        let mut idx = int_index(&conn);
        idx.insert(&Value::I32(1), 0, 1, 1).unwrap();
        assert_eq!(idx.len(), 1);

        idx.clear().unwrap();
        assert_eq!(idx.len(), 0);
        assert!(idx.search(&Value::I32(1)).unwrap().is_empty());
    }

    #[test]
    fn test_mixed_integer_widths_coerce() {
        let conn = test_conn();
        let mut idx = KeyIndex::new(Rc::clone(&conn), "T", "n", ValueType::Int64).unwrap();
        idx.insert(&Value::I32(44), 0, 1, 1).unwrap();
        idx.insert(&Value::U16(44), 8, 1, 2).unwrap();

        // Searching with any integer width finds both
        assert_eq!(idx.search(&Value::I64(44)).unwrap().len(), 2);
        assert_eq!(idx.search(&Value::U8(44)).unwrap().len(), 2);
    }

    #[test]
    fn test_type_mismatch() {
        let conn = test_conn();
        let mut idx = int_index(&conn);
        let err = idx.insert(&Value::Str("five".into()), 0, 1, 1).unwrap_err();
        assert!(matches!(err, IndexError::TypeMismatch { .. }));

        let err = idx.search(&Value::Str("five".into())).unwrap_err();
        assert!(matches!(err, IndexError::TypeMismatch { .. }));
    }

    #[test]
    fn test_string_index_round_trips_hostile_keys() {
        let conn = test_conn();
        let mut idx = KeyIndex::new(Rc::clone(&conn), "User", "name", ValueType::String).unwrap();

        let hostile = [
            "".to_string(),
            "a".repeat(1000),
            "quote'\"back\\slash".to_string(),
        ];
        for (i, key) in hostile.iter().enumerate() {
            idx.insert(&Value::Str(key.clone()), i as u64 * 16, 8, i as u64 + 1)
                .unwrap();
        }
        for key in &hostile {
            let hits = idx.search(&Value::Str(key.clone())).unwrap();
            assert_eq!(hits.len(), 1, "key {key:?}");
            assert_eq!(hits[0].key, Value::Str(key.clone()));
        }
    }

    #[test]
    fn test_blob_index() {
        let conn = test_conn();
        let mut idx = KeyIndex::new(Rc::clone(&conn), "T", "raw", ValueType::Bytes).unwrap();
        idx.insert(&Value::Bytes(vec![0, 1, 2]), 0, 3, 1).unwrap();

        let hits = idx.search(&Value::Bytes(vec![0, 1, 2])).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, Value::Bytes(vec![0, 1, 2]));
    }

    #[test]
    fn test_float_index_accepts_integers() {
        let conn = test_conn();
        let mut idx = KeyIndex::new(Rc::clone(&conn), "T", "score", ValueType::Float64).unwrap();
        idx.insert(&Value::F64(1.5), 0, 1, 1).unwrap();
        idx.insert(&Value::I32(2), 8, 1, 2).unwrap();

        let hits = idx.range(&Value::I32(1), &Value::I32(2)).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
