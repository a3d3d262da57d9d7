//! Table catalog
//!
//! Maps logical tables to the routing and indexing machinery:
//!
//! - `{table name → Table}` and the inverse `{tag → table name}`
//! - per-table secondary indexes, populated on the ingest callback
//! - multi-source variants (`"Table@source"`) and the unified view
//!
//! The catalog owns no record bytes. On each ingest callback it looks up
//! the table by tag, extracts the indexed columns and inserts them into
//! the column indexes with the record's `(offset, length, sequence)`;
//! the primary copy stays in the record store. Records whose tag has no
//! table binding are retained by the store but invisible to queries.

pub mod extractor;

pub use extractor::{ColumnSink, RecordExtractor};

use crate::index::{IndexError, KeyIndex};
use crate::store::Tag;
use crate::value::ValueType;
use rusqlite::Connection;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// A declared column: name plus logical type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ValueType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A table definition as produced by the schema analyser
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    /// Names of indexed columns, in declaration order
    pub indexed: Vec<String>,
}

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    #[error("tag {tag} is already bound to table {table}")]
    TagAlreadyBound { tag: String, table: String },

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// One logical table: schema, tag binding, extractor, indexes
pub struct Table {
    name: String,
    tag: Option<Tag>,
    columns: Vec<Column>,
    indexed: Vec<String>,
    indices: HashMap<String, KeyIndex>,
    extractor: Option<Rc<dyn RecordExtractor>>,
    /// Source qualifier for `"Base@source"` variants
    source: Option<String>,
    /// Base table name for variants
    base: Option<String>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Indexed column names in declaration order
    pub fn indexed_columns(&self) -> &[String] {
        &self.indexed
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.indices.contains_key(column)
    }

    pub fn index(&self, column: &str) -> Option<&KeyIndex> {
        self.indices.get(column)
    }

    pub fn extractor(&self) -> Option<&Rc<dyn RecordExtractor>> {
        self.extractor.as_ref()
    }

    /// Source qualifier, if this is a source variant
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Total index entries across this table's indexes
    pub fn index_entries(&self) -> u64 {
        self.indices.values().map(|i| i.len()).sum()
    }

    fn clear_indices(&mut self) -> CatalogResult<()> {
        for index in self.indices.values_mut() {
            index.clear()?;
        }
        Ok(())
    }
}

/// The table catalog
pub struct Catalog {
    conn: Rc<Connection>,
    tables: HashMap<String, Table>,
    tag_to_table: HashMap<Tag, String>,
    /// Registration order, for stable stats listings
    table_order: Vec<String>,
    sources: Vec<String>,
}

impl Catalog {
    pub fn new(conn: Rc<Connection>) -> Self {
        Self {
            conn,
            tables: HashMap::new(),
            tag_to_table: HashMap::new(),
            table_order: Vec::new(),
            sources: Vec::new(),
        }
    }

    // ==================== Registration ====================

    /// Add a table from its schema definition, creating one key index
    /// per indexed column
    pub fn add_table(&mut self, def: &TableDef) -> CatalogResult<()> {
        if self.tables.contains_key(&def.name) {
            return Err(CatalogError::DuplicateTable(def.name.clone()));
        }

        let table = self.build_table(&def.name, &def.columns, &def.indexed, None, None, None)?;
        self.table_order.push(def.name.clone());
        self.tables.insert(def.name.clone(), table);
        Ok(())
    }

    fn build_table(
        &self,
        name: &str,
        columns: &[Column],
        indexed: &[String],
        tag: Option<Tag>,
        extractor: Option<Rc<dyn RecordExtractor>>,
        source: Option<(&str, &str)>, // (source name, base table)
    ) -> CatalogResult<Table> {
        let mut indices = HashMap::new();
        for column_name in indexed {
            let ty = columns
                .iter()
                .find(|c| &c.name == column_name)
                .map(|c| c.ty)
                .unwrap_or(ValueType::Bytes);
            let index = KeyIndex::new(Rc::clone(&self.conn), name, column_name, ty)?;
            indices.insert(column_name.clone(), index);
        }

        Ok(Table {
            name: name.to_string(),
            tag,
            columns: columns.to_vec(),
            indexed: indexed.to_vec(),
            indices,
            extractor,
            source: source.map(|(s, _)| s.to_string()),
            base: source.map(|(_, b)| b.to_string()),
        })
    }

    /// Bind a 4-byte tag to a table so ingested records route to it
    pub fn bind_tag(&mut self, tag_name: &str, table: &str) -> CatalogResult<()> {
        let tag = Tag::from_name(tag_name);
        if let Some(owner) = self.tag_to_table.get(&tag) {
            if owner != table {
                return Err(CatalogError::TagAlreadyBound {
                    tag: tag.to_string(),
                    table: owner.clone(),
                });
            }
        }
        let entry = self
            .tables
            .get_mut(table)
            .ok_or_else(|| CatalogError::UnknownTable(table.to_string()))?;
        entry.tag = Some(tag);
        self.tag_to_table.insert(tag, table.to_string());
        tracing::debug!(tag = %tag, table, "tag bound");
        Ok(())
    }

    /// Register a payload extractor for a table
    pub fn set_extractor(
        &mut self,
        table: &str,
        extractor: Rc<dyn RecordExtractor>,
    ) -> CatalogResult<()> {
        let entry = self
            .tables
            .get_mut(table)
            .ok_or_else(|| CatalogError::UnknownTable(table.to_string()))?;
        entry.extractor = Some(extractor);
        Ok(())
    }

    /// Register a named source, cloning every tag-bound base table into
    /// a `"Table@source"` variant under a synthetic tag.
    ///
    /// Tag and extractor bindings are copied at call time; registering
    /// an extractor or tag on the base afterwards does not propagate.
    /// Register extractors before sources.
    pub fn register_source(&mut self, source: &str) -> CatalogResult<()> {
        if self.sources.iter().any(|s| s == source) {
            return Ok(());
        }

        let bases: Vec<String> = self
            .table_order
            .iter()
            .filter(|name| {
                let t = &self.tables[*name];
                t.source.is_none() && t.tag.is_some()
            })
            .cloned()
            .collect();

        for base_name in bases {
            let base = &self.tables[&base_name];
            let variant_name = format!("{}@{}", base_name, source);
            let synthetic = base.tag.unwrap().with_source(source);
            let columns = base.columns.clone();
            let indexed = base.indexed.clone();
            let extractor = base.extractor.clone();

            if let Some(owner) = self.tag_to_table.get(&synthetic) {
                return Err(CatalogError::TagAlreadyBound {
                    tag: synthetic.to_string(),
                    table: owner.clone(),
                });
            }

            let variant = self.build_table(
                &variant_name,
                &columns,
                &indexed,
                Some(synthetic),
                extractor,
                Some((source, &base_name)),
            )?;

            self.tag_to_table.insert(synthetic, variant_name.clone());
            self.table_order.push(variant_name.clone());
            self.tables.insert(variant_name, variant);
        }

        self.sources.push(source.to_string());
        tracing::info!(source, "source registered");
        Ok(())
    }

    /// Registered source names, in registration order
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    // ==================== Lookups ====================

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_by_tag(&self, tag: Tag) -> Option<&Table> {
        self.tables.get(self.tag_to_table.get(&tag)?)
    }

    /// The synthetic tag bound to `"table@source"`, if registered
    pub fn source_tag(&self, table: &str, source: &str) -> Option<Tag> {
        self.tables.get(&format!("{}@{}", table, source))?.tag
    }

    /// Table names in registration order
    pub fn table_names(&self) -> Vec<String> {
        self.table_order.clone()
    }

    /// Scan targets for a logical table name: the table's own tag plus,
    /// for a base table, every source variant's tag. Labels carry the
    /// source qualifier (empty for the base itself).
    pub fn scan_targets(&self, name: &str) -> Vec<(Tag, String)> {
        let Some(table) = self.tables.get(name) else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        if let Some(tag) = table.tag {
            targets.push((tag, table.source.clone().unwrap_or_default()));
        }
        if table.source.is_none() {
            for variant_name in &self.table_order {
                let variant = &self.tables[variant_name];
                if variant.base.as_deref() == Some(name) {
                    if let Some(tag) = variant.tag {
                        targets.push((tag, variant.source.clone().unwrap_or_default()));
                    }
                }
            }
        }
        targets
    }

    // ==================== Ingest routing ====================

    /// Ingest callback: populate the owning table's indexes for one
    /// appended record. Unregistered tags are silently skipped. Index
    /// failures are logged and never abort the ingest.
    pub fn route(&mut self, tag: Option<Tag>, payload: &[u8], sequence: u64, offset: u64) {
        let Some(tag) = tag else { return };
        let Some(name) = self.tag_to_table.get(&tag) else {
            return;
        };
        let table = self.tables.get_mut(name).expect("tag maps to known table");
        let Some(extractor) = table.extractor.clone() else {
            return;
        };

        for column_name in &table.indexed {
            let key = extractor.extract(payload, column_name);
            if key.is_null() {
                // Missing field: no index entry
                tracing::debug!(table = %table.name, column = %column_name, sequence, "null key skipped");
                continue;
            }
            let index = table
                .indices
                .get_mut(column_name)
                .expect("indexed column has an index");
            if let Err(e) = index.insert(&key, offset, payload.len() as u32, sequence) {
                tracing::warn!(
                    table = %table.name,
                    column = %column_name,
                    sequence,
                    error = %e,
                    "index insert failed"
                );
            }
        }
    }

    /// Clear every index in the catalog (rebuild prologue for `load`)
    pub fn clear_indices(&mut self) -> CatalogResult<()> {
        for table in self.tables.values_mut() {
            table.clear_indices()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn user_def() -> TableDef {
        TableDef {
            name: "User".into(),
            columns: vec![
                Column::new("id", ValueType::Int32),
                Column::new("name", ValueType::String),
            ],
            indexed: vec!["id".into()],
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(Rc::new(Connection::open_in_memory().unwrap()))
    }

    /// Fixture payload: [filler 4][tag 4][id i32 LE][name bytes]
    fn payload(id: i32, name: &str) -> Vec<u8> {
        let mut p = vec![0u8; 4];
        p.extend_from_slice(b"USER");
        p.extend_from_slice(&id.to_le_bytes());
        p.extend_from_slice(name.as_bytes());
        p
    }

    fn user_extractor() -> Rc<dyn RecordExtractor> {
        Rc::new(|payload: &[u8], field: &str| -> Value {
            match field {
                "id" => Value::I32(i32::from_le_bytes(payload[8..12].try_into().unwrap())),
                "name" => Value::Str(String::from_utf8_lossy(&payload[12..]).into_owned()),
                _ => Value::Null,
            }
        })
    }

    #[test]
    fn test_add_and_lookup() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();

        let table = cat.table("User").unwrap();
        assert_eq!(table.tag(), Some(Tag::from_name("USER")));
        assert!(table.is_indexed("id"));
        assert!(!table.is_indexed("name"));
        assert_eq!(cat.table_by_tag(Tag::from_name("USER")).unwrap().name(), "User");
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        assert!(matches!(
            cat.add_table(&user_def()),
            Err(CatalogError::DuplicateTable(_))
        ));
    }

    #[test]
    fn test_tag_conflict_rejected() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.add_table(&TableDef {
            name: "Other".into(),
            columns: vec![Column::new("id", ValueType::Int32)],
            indexed: vec![],
        })
        .unwrap();

        cat.bind_tag("USER", "User").unwrap();
        assert!(matches!(
            cat.bind_tag("USER", "Other"),
            Err(CatalogError::TagAlreadyBound { .. })
        ));
        // Re-binding the same pair is idempotent
        cat.bind_tag("USER", "User").unwrap();
    }

    #[test]
    fn test_route_populates_indices() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.set_extractor("User", user_extractor()).unwrap();

        let p = payload(42, "Alice");
        cat.route(Some(Tag::from_name("USER")), &p, 1, 0);

        let index = cat.table("User").unwrap().index("id").unwrap();
        let hits = index.search(&Value::I32(42)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sequence, 1);
        assert_eq!(hits[0].length, p.len() as u32);
    }

    #[test]
    fn test_route_unknown_tag_is_silent() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.route(Some(Tag::from_name("WHAT")), &payload(1, "x"), 1, 0);
        assert_eq!(cat.table("User").unwrap().index_entries(), 0);
    }

    #[test]
    fn test_route_without_extractor_is_silent() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.route(Some(Tag::from_name("USER")), &payload(1, "x"), 1, 0);
        assert_eq!(cat.table("User").unwrap().index_entries(), 0);
    }

    #[test]
    fn test_register_source_clones_bindings() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.set_extractor("User", user_extractor()).unwrap();

        cat.register_source("satellite-1").unwrap();
        cat.register_source("satellite-2").unwrap();
        assert_eq!(cat.sources(), &["satellite-1", "satellite-2"]);

        let variant = cat.table("User@satellite-1").unwrap();
        assert_eq!(variant.source(), Some("satellite-1"));
        assert!(variant.extractor().is_some());
        assert!(variant.is_indexed("id"));

        let tag = cat.source_tag("User", "satellite-1").unwrap();
        assert_eq!(cat.table_by_tag(tag).unwrap().name(), "User@satellite-1");
        assert_ne!(tag, Tag::from_name("USER"));

        // Routing under the synthetic tag populates the variant's index
        let p = payload(7, "SatUser");
        cat.route(Some(tag), &p, 1, 0);
        assert_eq!(cat.table("User@satellite-1").unwrap().index_entries(), 1);
        assert_eq!(cat.table("User").unwrap().index_entries(), 0);
    }

    #[test]
    fn test_scan_targets_unify_sources() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.set_extractor("User", user_extractor()).unwrap();
        cat.register_source("a").unwrap();
        cat.register_source("b").unwrap();

        let targets = cat.scan_targets("User");
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].1, "");
        assert_eq!(targets[1].1, "a");
        assert_eq!(targets[2].1, "b");

        // A variant queried directly scans only itself
        let targets = cat.scan_targets("User@a");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].1, "a");
    }

    #[test]
    fn test_register_source_idempotent() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.register_source("x").unwrap();
        cat.register_source("x").unwrap();
        assert_eq!(cat.sources().len(), 1);
    }

    #[test]
    fn test_null_keys_not_indexed() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.set_extractor(
            "User",
            Rc::new(|_: &[u8], _: &str| Value::Null) as Rc<dyn RecordExtractor>,
        )
        .unwrap();

        cat.route(Some(Tag::from_name("USER")), &payload(1, "x"), 1, 0);
        assert_eq!(cat.table("User").unwrap().index_entries(), 0);
    }

    #[test]
    fn test_clear_indices() {
        let mut cat = catalog();
        cat.add_table(&user_def()).unwrap();
        cat.bind_tag("USER", "User").unwrap();
        cat.set_extractor("User", user_extractor()).unwrap();
        cat.route(Some(Tag::from_name("USER")), &payload(1, "a"), 1, 0);
        assert_eq!(cat.table("User").unwrap().index_entries(), 1);

        cat.clear_indices().unwrap();
        assert_eq!(cat.table("User").unwrap().index_entries(), 0);
    }
}
