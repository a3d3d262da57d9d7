//! # framesql
//!
//! An embedded analytical engine for streams of length-prefixed,
//! self-describing binary records. Records stay in their original wire
//! form in an append-only buffer; secondary structures (sequence maps,
//! per-tag record lists, typed key indexes) are derived during ingest,
//! so lookups and scans hand back pointers into the original bytes
//! instead of materialised rows.
//!
//! ## Features
//!
//! - **Streaming ingest**: `[u32 LE size][payload]` frames, routed by
//!   the 4-byte tag embedded at payload bytes 4..8, tolerant of
//!   arbitrary chunk boundaries
//! - **Typed secondary indexes**: SQLite-backed B-trees per indexed
//!   column, with exact, range and first-match fast paths
//! - **SQL front-end**: SELECT with WHERE, ORDER BY, LIMIT/OFFSET and
//!   aggregates, planned onto index lookups or tag scans
//! - **Zero-copy reads**: borrowed payload access bounded by the borrow
//!   checker (no ingest while a reader holds a pointer)
//! - **Export/rebuild**: the store's live prefix round-trips byte for
//!   byte through `load`
//!
//! ## Modules
//!
//! - [`store`]: append-only record store and stream framer
//! - [`index`]: typed key→location indexes
//! - [`catalog`]: tables, tag routing, extractors, multi-source variants
//! - [`schema`]: schema IDL parser
//! - [`query`]: SQL parser, planner, cursor, executor
//! - [`database`]: the composed engine facade
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use framesql::{Config, Database, Value};
//!
//! let schema = r#"
//!     table User {
//!         id: int (id);
//!         name: string;
//!     }
//! "#;
//!
//! let mut db = Database::from_schema(schema, Config::default().engine)?;
//! db.map_tag("USER", "User")?;
//! db.set_extractor("User", |payload: &[u8], field: &str| {
//!     // decode a field out of the payload
//!     # framesql::Value::Null
//! })?;
//!
//! db.ingest(&stream_bytes)?;
//! let out = db.query("SELECT name FROM User WHERE id = ?", &[Value::I64(7)])?;
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod index;
pub mod query;
pub mod schema;
pub mod store;
pub mod value;

// Re-export the common surface
pub use catalog::{Column, ColumnSink, RecordExtractor, TableDef};
pub use config::{Config, ConfigError, EngineConfig, LoggingConfig};
pub use database::{Database, DatabaseError, DatabaseResult, StoredRecord, TableStats};
pub use index::{IndexEntry, IndexError};
pub use query::{PlanKind, QueryError, QueryOutput};
pub use schema::{parse_schema, SchemaError};
pub use store::{IngestSummary, RecordStore, StoreError, Tag};
pub use value::{compare_values, Value, ValueType};
