//! Secondary key indexes
//!
//! Typed key → record-location indexes, one per `(table, column)`.
//! Backed by an in-memory SQLite database shared by the whole engine:
//! SQLite's B-tree gives O(log n) exact and range lookups, and a
//! `(key, sequence)` WITHOUT ROWID table keeps duplicate keys ordered by
//! sequence for free.
//!
//! Index entries point back into the record store buffer as
//! `(offset, length, sequence)`; the primary copy of every record stays
//! in the store.

pub mod key_index;

pub use key_index::KeyIndex;

use crate::value::Value;
use thiserror::Error;

/// One index entry: a key plus the location of its record
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The indexed key, in the index's declared logical type
    pub key: Value,
    /// Byte offset of the record's length prefix in the store buffer
    pub offset: u64,
    /// Payload byte count
    pub length: u32,
    /// Record sequence
    pub sequence: u64,
}

/// Errors from the index layer
#[derive(Error, Debug)]
pub enum IndexError {
    /// A key or bound parameter cannot be coerced to the index's
    /// declared key type. Query planning treats this as "fall back to a
    /// scan"; it never surfaces through the SQL interface.
    #[error("cannot coerce {got} value to {expected} index key")]
    TypeMismatch {
        expected: crate::value::ValueType,
        got: crate::value::ValueType,
    },

    /// Underlying SQLite failure
    #[error("index storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
