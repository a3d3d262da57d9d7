//! Database facade
//!
//! Composes the engine's layers behind one handle:
//!
//! ```text
//! bytes → RecordStore (append, tag routing) → Catalog (index population)
//! SQL   → parser → planner → cursor → rows
//! ```
//!
//! A `Database` is a single-threaded value: one logical writer, readers
//! between ingests. Borrowing read surfaces (`find_raw_by_index`,
//! `iterate_all`) tie their borrows to `&self`, so the compiler rejects
//! an ingest while a borrowed payload is alive. The handle owns no
//! self-references and moves freely.
//!
//! # Example
//!
//! ```rust,ignore
//! use framesql::{Config, Database, Value};
//!
//! let mut db = Database::from_schema(schema_text, Config::default().engine)?;
//! db.map_tag("USER", "User")?;
//! db.set_extractor("User", my_extractor)?;
//!
//! db.ingest(&stream_bytes)?;
//!
//! let out = db.query("SELECT name FROM User WHERE id = ?", &[Value::I64(500)])?;
//! ```

use crate::catalog::{Catalog, CatalogError, RecordExtractor};
use crate::config::EngineConfig;
use crate::index::{IndexEntry, IndexError};
use crate::query::{self, Plan, QueryError, QueryOutput};
use crate::schema::{self, SchemaError};
use crate::store::{IngestSummary, RecordStore, StoreError, Tag};
use crate::value::Value;
use rusqlite::Connection;
use std::rc::Rc;
use thiserror::Error;

/// Umbrella error for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// A record copied out of the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub sequence: u64,
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Per-table statistics
#[derive(Debug, Clone)]
pub struct TableStats {
    pub table: String,
    pub tag: Option<String>,
    pub records: u64,
    pub indexes: Vec<String>,
    pub index_entries: u64,
}

/// The embedded engine: record store, catalog, indexes, SQL front-end
pub struct Database {
    store: RecordStore,
    catalog: Catalog,
}

impl Database {
    /// Build a database from a schema document
    pub fn from_schema(schema_text: &str, config: EngineConfig) -> DatabaseResult<Self> {
        let tables = schema::parse_schema(schema_text)?;

        let conn = Connection::open_in_memory().map_err(IndexError::from)?;
        conn.execute_batch(
            "PRAGMA temp_store = MEMORY;
             PRAGMA cache_size = 10000;",
        )
        .map_err(IndexError::from)?;

        let mut catalog = Catalog::new(Rc::new(conn));
        for def in &tables {
            catalog.add_table(def)?;
        }
        tracing::info!(tables = tables.len(), "database created from schema");

        Ok(Self {
            store: RecordStore::new(config.initial_buffer_capacity, config.max_frame_len),
            catalog,
        })
    }

    // ==================== Registration ====================

    /// Bind a 4-byte tag to a table (`--map TAG=Table`)
    pub fn map_tag(&mut self, tag: &str, table: &str) -> DatabaseResult<()> {
        self.catalog.bind_tag(tag, table)?;
        Ok(())
    }

    /// Register the payload extractor for a table
    pub fn set_extractor(
        &mut self,
        table: &str,
        extractor: impl RecordExtractor + 'static,
    ) -> DatabaseResult<()> {
        self.catalog.set_extractor(table, Rc::new(extractor))?;
        Ok(())
    }

    /// Register a source; every tag-bound table gains a
    /// `"Table@source"` variant. Register extractors first: bindings
    /// are copied at call time.
    pub fn register_source(&mut self, source: &str) -> DatabaseResult<()> {
        self.catalog.register_source(source)?;
        Ok(())
    }

    /// Registered source names
    pub fn sources(&self) -> &[String] {
        self.catalog.sources()
    }

    /// Logical table names, registration order
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    // ==================== Ingest ====================

    /// Consume complete frames from `bytes`, returning how much was
    /// consumed; the caller keeps the unconsumed residue for the next
    /// call
    pub fn ingest(&mut self, bytes: &[u8]) -> DatabaseResult<IngestSummary> {
        let catalog = &mut self.catalog;
        let summary = self
            .store
            .ingest(bytes, |r| catalog.route(r.tag, r.payload, r.sequence, r.offset))?;
        Ok(summary)
    }

    /// Append one payload (no length prefix); returns the sequence
    pub fn ingest_one(&mut self, payload: &[u8]) -> DatabaseResult<u64> {
        let catalog = &mut self.catalog;
        let sequence = self
            .store
            .ingest_one(payload, |r| catalog.route(r.tag, r.payload, r.sequence, r.offset))?;
        Ok(sequence)
    }

    /// Append one payload routed to the `source` variant of its table.
    /// Falls back to the embedded tag if the source variant is not
    /// registered.
    pub fn ingest_one_with_source(
        &mut self,
        payload: &[u8],
        source: &str,
    ) -> DatabaseResult<u64> {
        let override_tag = Tag::from_payload(payload)
            .map(|tag| tag.with_source(source))
            .filter(|tag| self.catalog.table_by_tag(*tag).is_some());
        if override_tag.is_none() {
            tracing::warn!(source, "no source variant registered for payload tag");
        }

        let catalog = &mut self.catalog;
        let sequence = self.store.ingest_one_tagged(payload, override_tag, |r| {
            catalog.route(r.tag, r.payload, r.sequence, r.offset)
        })?;
        Ok(sequence)
    }

    // ==================== Export / rebuild ====================

    /// The live prefix of the store buffer; feed it back through
    /// [`load`](Self::load) to reproduce the database
    pub fn export(&self) -> Vec<u8> {
        self.store.export()
    }

    /// Clear the store and indexes, then replay an exported stream
    /// through the ingest path
    pub fn load(&mut self, bytes: &[u8]) -> DatabaseResult<IngestSummary> {
        self.catalog.clear_indices()?;
        let catalog = &mut self.catalog;
        let summary = self
            .store
            .load(bytes, |r| catalog.route(r.tag, r.payload, r.sequence, r.offset))?;
        tracing::info!(
            records = summary.records,
            bytes = summary.bytes_consumed,
            "database rebuilt from stream"
        );
        Ok(summary)
    }

    // ==================== SQL surface ====================

    /// Execute a query, materialising rows into the `Value` model
    pub fn query(&self, sql: &str, params: &[Value]) -> DatabaseResult<QueryOutput> {
        Ok(query::run_query(&self.store, &self.catalog, sql, params)?)
    }

    /// Execute a query without materialising rows; returns the count
    pub fn query_count(&self, sql: &str, params: &[Value]) -> DatabaseResult<u64> {
        Ok(query::run_query_count(&self.store, &self.catalog, sql, params)?)
    }

    /// The plan the query would run with
    pub fn explain(&self, sql: &str) -> DatabaseResult<Plan> {
        Ok(query::explain(&self.store, &self.catalog, sql)?)
    }

    // ==================== Non-SQL fast paths ====================

    /// All index entries matching `key`. Unknown table/column or an
    /// uncoercible key return empty.
    pub fn find_by_index(&self, table: &str, column: &str, key: &Value) -> Vec<IndexEntry> {
        let Some(table) = self.catalog.table(table) else {
            return Vec::new();
        };
        let Some(index) = table.index(column) else {
            return Vec::new();
        };
        index.search(key).unwrap_or_default()
    }

    /// The lowest-sequence matching record, copied out
    pub fn find_one_by_index(
        &self,
        table: &str,
        column: &str,
        key: &Value,
    ) -> Option<StoredRecord> {
        let (payload, sequence) = self.find_raw_by_index(table, column, key)?;
        let offset = self.store.offset_of(sequence)?;
        Some(StoredRecord {
            sequence,
            offset,
            payload: payload.to_vec(),
        })
    }

    /// Zero-copy point lookup: the lowest-sequence matching record as a
    /// borrowed `(payload, sequence)`. Integer and string keys take the
    /// primitive fast path.
    pub fn find_raw_by_index(
        &self,
        table: &str,
        column: &str,
        key: &Value,
    ) -> Option<(&[u8], u64)> {
        let table = self.catalog.table(table)?;
        let index = table.index(column)?;

        let location = if index.key_type().is_integer() {
            match key.as_i64() {
                Some(k) => index.search_first_i64(k).ok()?,
                None => entry_location(index.search_first(key).ok()?),
            }
        } else if let Value::Str(k) = key {
            index.search_first_str(k).ok()?
        } else {
            entry_location(index.search_first(key).ok()?)
        }?;

        let (offset, _, sequence) = location;
        Some((self.store.payload_at(offset)?, sequence))
    }

    /// Full scan of a logical table (unified across sources), yielding
    /// borrowed `(payload, sequence, offset)`. The visitor returns
    /// `false` to stop.
    pub fn iterate_all<F>(&self, table: &str, mut visitor: F)
    where
        F: FnMut(&[u8], u64, u64) -> bool,
    {
        for (tag, _) in self.catalog.scan_targets(table) {
            let mut stopped = false;
            self.store.for_each_by_tag(tag, |r| {
                let go = visitor(r.payload, r.sequence, r.offset);
                stopped = !go;
                go
            });
            if stopped {
                return;
            }
        }
    }

    // ==================== Introspection ====================

    /// Total records in the store (including unregistered tags)
    pub fn record_count(&self) -> u64 {
        self.store.record_count()
    }

    /// Live bytes in the store buffer
    pub fn data_size(&self) -> u64 {
        self.store.data_size()
    }

    /// Per-table statistics, registration order
    pub fn stats(&self) -> Vec<TableStats> {
        self.catalog
            .table_names()
            .iter()
            .map(|name| {
                let table = self.catalog.table(name).expect("listed tables exist");
                TableStats {
                    table: name.clone(),
                    tag: table.tag().map(|t| t.to_string()),
                    records: table
                        .tag()
                        .map(|t| self.store.count_by_tag(t) as u64)
                        .unwrap_or(0),
                    indexes: table.indexed_columns().to_vec(),
                    index_entries: table.index_entries(),
                }
            })
            .collect()
    }
}

fn entry_location(entry: Option<IndexEntry>) -> Option<(u64, u32, u64)> {
    entry.map(|e| (e.offset, e.length, e.sequence))
}
