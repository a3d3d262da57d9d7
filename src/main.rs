//! framesql CLI
//!
//! Pipe size-prefixed records to stdin and query them with SQL:
//!
//! ```text
//! cat data.bin | framesql --schema app.idl --map USER=User \
//!     --query 'SELECT COUNT(*) FROM User'
//! ```
//!
//! Stream format: `[4-byte size LE][payload]...`, each payload carrying
//! its 4-byte tag at bytes 4..8. Stdin is read in configurable chunks;
//! partial frames are kept as residue and completed by the next chunk.
//!
//! Without registered extractors (a host-code concern) declared columns
//! read as NULL; counts, the synthetic columns (`_rowid`, `_offset`,
//! `_data`, `_source`) and export/load work regardless.

use clap::Parser;
use framesql::{Config, Database, QueryOutput, Value};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "framesql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Streaming record SQL engine - pipe size-prefixed records to stdin")]
struct Cli {
    /// Schema file (IDL format)
    #[arg(long)]
    schema: PathBuf,

    /// Map a 4-byte tag to a table (repeatable)
    #[arg(long = "map", value_name = "TAG=TABLE")]
    maps: Vec<String>,

    /// SQL query to run after ingesting
    #[arg(long)]
    query: Option<String>,

    /// Load an exported stream file before reading stdin
    #[arg(long)]
    load: Option<PathBuf>,

    /// Export storage to a file after ingesting
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print per-table statistics after ingesting
    #[arg(long)]
    stats: bool,

    /// Do not read records from stdin
    #[arg(long)]
    no_stdin: bool,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Config file (defaults: ./framesql.toml, then XDG config dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config);

    let schema_text = std::fs::read_to_string(&cli.schema)
        .map_err(|e| format!("cannot read schema file {:?}: {e}", cli.schema))?;
    let mut db = Database::from_schema(&schema_text, config.engine.clone())?;

    for mapping in &cli.maps {
        let (tag, table) = mapping
            .split_once('=')
            .ok_or_else(|| format!("--map expects TAG=Table, got '{mapping}'"))?;
        db.map_tag(tag, table)?;
    }

    if let Some(path) = &cli.load {
        let bytes = std::fs::read(path)
            .map_err(|e| format!("cannot read load file {:?}: {e}", path))?;
        let summary = db.load(&bytes)?;
        tracing::info!(records = summary.records, "loaded {} bytes from {:?}", bytes.len(), path);
    }

    if !cli.no_stdin {
        let ingested = ingest_stdin(&mut db, config.engine.stdin_chunk_size)?;
        if ingested > 0 {
            tracing::info!(records = ingested, "ingested from stdin");
        }
    }

    if cli.stats {
        print_stats(&db);
    }

    if let Some(sql) = &cli.query {
        let out = db.query(sql, &[])?;
        match cli.format.as_str() {
            "json" => print_json(&out)?,
            _ => print_table(&out),
        }
    }

    if let Some(path) = &cli.export {
        let bytes = db.export();
        std::fs::write(path, &bytes)
            .map_err(|e| format!("cannot write export file {:?}: {e}", path))?;
        tracing::info!("exported {} bytes to {:?}", bytes.len(), path);
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| format!("framesql={}", config.logging.level)),
    );

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Stream stdin through the database in chunks, holding the unconsumed
/// residue between reads
fn ingest_stdin(db: &mut Database, chunk_size: usize) -> Result<u64, Box<dyn std::error::Error>> {
    let mut stdin = std::io::stdin().lock();
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = stdin.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        let summary = db.ingest(&buffer)?;
        buffer.drain(..summary.bytes_consumed);
        total += summary.records as u64;
    }

    if !buffer.is_empty() {
        tracing::warn!(
            residue = buffer.len(),
            "trailing bytes at end of stream do not form a complete frame"
        );
    }

    Ok(total)
}

fn print_stats(db: &Database) {
    eprintln!("Database statistics:");
    for stat in db.stats() {
        let tag = stat
            .tag
            .map(|t| format!(" (tag: {t})"))
            .unwrap_or_default();
        let indexes = if stat.indexes.is_empty() {
            String::new()
        } else {
            format!(
                ", indexes: {} ({} entries)",
                stat.indexes.join(", "),
                stat.index_entries
            )
        };
        eprintln!(
            "  Table: {}{} - {} records{}",
            stat.table, tag, stat.records, indexes
        );
    }
    eprintln!("  Total: {} records, {} bytes", db.record_count(), db.data_size());
}

/// Tab-separated output: header row, then one line per row
fn print_table(out: &QueryOutput) {
    println!("{}", out.columns.join("\t"));
    for row in &out.rows {
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_json(out: &QueryOutput) -> Result<(), Box<dyn std::error::Error>> {
    let rows: Vec<Vec<serde_json::Value>> = out
        .rows
        .iter()
        .map(|row| row.iter().map(value_to_json).collect())
        .collect();
    let doc = serde_json::json!({
        "columns": out.columns,
        "rows": rows,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::json;
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => json!(v),
        Value::F32(v) => json!(v),
        Value::F64(v) => json!(v),
        Value::Str(v) => json!(v),
        Value::Bytes(v) => json!(v),
        Value::U64(v) => json!(v),
        other => match other.as_i64() {
            Some(i) => json!(i),
            None => serde_json::Value::Null,
        },
    }
}
