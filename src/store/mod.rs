//! Primary record storage
//!
//! This module provides the append-only core of the engine:
//!
//! - **framing**: splits chunked byte input into complete frames
//! - **record**: the append-only store with tag routing and O(1) lookups
//! - **error**: error types
//!
//! # Stream format
//!
//! ```text
//! [u32 LE size][payload][u32 LE size][payload]...
//! ```
//!
//! Each payload's bytes 4..8 are its 4-byte tag. The exported form of
//! the store is this exact stream; `load(export())` reproduces the store
//! byte for byte, including sequences and offsets.

pub mod error;
pub mod framing;
pub mod record;

pub use error::{StoreError, StoreResult};
pub use framing::{frame_payload, scan_frames, ScanSummary};
pub use record::{IngestSummary, RecordRef, RecordSlot, RecordStore, Tag};
