//! Append-only record store
//!
//! The primary copy of every ingested record, kept in its original wire
//! form in one growing buffer:
//!
//! ```text
//! [4-byte size][payload][4-byte size][payload]...
//! ```
//!
//! Each payload carries a 4-byte tag at bytes 4..8 (the embedded
//! file-identifier convention of the wire format) which routes it to a
//! table. During ingest the store derives its secondary structures:
//! sequence↔offset maps for O(1) lookups and a per-tag record list for
//! O(1) random access and in-order scans.
//!
//! Records are immutable once appended and are never removed. Read
//! surfaces hand out borrowed slices into the buffer; the `&self` borrow
//! statically prevents an ingest from reallocating the buffer while a
//! reader holds one.

use crate::store::error::{StoreError, StoreResult};
use crate::store::framing::{self, ScanSummary};
use std::collections::HashMap;

/// A 4-byte record tag read from payload bytes 4..8
///
/// Registered tag names shorter than 4 bytes are zero-padded, longer
/// names are truncated. Non-ASCII bytes are preserved verbatim.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; 4]);

impl Tag {
    /// Build a tag from a registered name (padded / truncated to 4 bytes)
    pub fn from_name(name: &str) -> Tag {
        let mut bytes = [0u8; 4];
        for (i, b) in name.bytes().take(4).enumerate() {
            bytes[i] = b;
        }
        Tag(bytes)
    }

    /// Read the embedded tag from a payload; payloads shorter than 8
    /// bytes have none and route nowhere
    pub fn from_payload(payload: &[u8]) -> Option<Tag> {
        if payload.len() < 8 {
            return None;
        }
        Some(Tag(payload[4..8].try_into().unwrap()))
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Tag {
        Tag(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Derive the synthetic tag for a source variant of this tag.
    ///
    /// Deterministic fold of the source name into the base tag bytes, so
    /// the same `(base, source)` pair always maps to the same tag.
    pub fn with_source(&self, source: &str) -> Tag {
        let mut bytes = self.0;
        for (i, b) in source.bytes().enumerate() {
            bytes[i % 4] = bytes[i % 4].wrapping_mul(31).wrapping_add(b);
        }
        Tag(bytes)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({})", self)
    }
}

/// Position of one record within a tag's list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSlot {
    /// Byte offset of the record's length prefix in the store buffer
    pub offset: u64,
    /// Sequence assigned on append
    pub sequence: u64,
}

/// Borrowed view of one stored record (no copy)
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    /// Tag the record was routed under, if any
    pub tag: Option<Tag>,
    /// The payload bytes, borrowed from the store buffer
    pub payload: &'a [u8],
    /// Sequence assigned on append (serves as rowid)
    pub sequence: u64,
    /// Byte offset of the length prefix in the store buffer
    pub offset: u64,
}

/// Outcome of an ingest pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Bytes consumed from the front of the input
    pub bytes_consumed: usize,
    /// Records appended
    pub records: usize,
}

/// The append-only primary store
///
/// Not thread-safe: single logical writer, readers between ingests only.
/// Read methods take `&self` and return borrows into the buffer, so the
/// compiler rejects an ingest while any borrow is live.
pub struct RecordStore {
    /// The wire-form buffer; `data.len()` is the live write offset
    data: Vec<u8>,
    record_count: u64,
    next_sequence: u64,
    max_frame_len: usize,

    /// sequence → offset, O(1)
    seq_to_offset: HashMap<u64, u64>,
    /// offset → sequence, O(1) reverse lookup
    offset_to_seq: HashMap<u64, u64>,
    /// tag → record list, in insertion order
    by_tag: HashMap<Tag, Vec<RecordSlot>>,
}

impl RecordStore {
    /// Create a store with a pre-allocated buffer
    pub fn new(initial_capacity: usize, max_frame_len: usize) -> Self {
        Self {
            data: Vec::with_capacity(initial_capacity),
            record_count: 0,
            next_sequence: 1,
            max_frame_len,
            seq_to_offset: HashMap::new(),
            offset_to_seq: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    // ==================== Ingest ====================

    /// Consume complete frames from the front of `bytes`, appending each
    /// and invoking `on_record` exactly once per record.
    ///
    /// Partial trailing data is not consumed; the caller keeps the
    /// residue for the next call. An oversized length prefix aborts with
    /// [`StoreError::FrameTooLarge`] after appending everything up to
    /// the last valid boundary.
    pub fn ingest<F>(&mut self, bytes: &[u8], mut on_record: F) -> StoreResult<IngestSummary>
    where
        F: FnMut(RecordRef<'_>),
    {
        let max = self.max_frame_len;
        let summary: ScanSummary = framing::scan_frames(bytes, max, |payload, _| {
            self.append_frame(payload, None, &mut on_record);
        })?;

        Ok(IngestSummary {
            bytes_consumed: summary.bytes_consumed,
            records: summary.frames,
        })
    }

    /// Append one payload without a caller-supplied length prefix; the
    /// store writes `[len][payload]` itself. Returns the assigned
    /// sequence.
    pub fn ingest_one<F>(&mut self, payload: &[u8], on_record: F) -> StoreResult<u64>
    where
        F: FnMut(RecordRef<'_>),
    {
        self.ingest_one_tagged(payload, None, on_record)
    }

    /// As [`ingest_one`](Self::ingest_one), routing under `tag_override`
    /// instead of the embedded tag when one is given (multi-source
    /// ingest).
    pub fn ingest_one_tagged<F>(
        &mut self,
        payload: &[u8],
        tag_override: Option<Tag>,
        mut on_record: F,
    ) -> StoreResult<u64>
    where
        F: FnMut(RecordRef<'_>),
    {
        if payload.len() > self.max_frame_len {
            return Err(StoreError::FrameTooLarge {
                length: payload.len(),
                max: self.max_frame_len,
                consumed: 0,
                frames: 0,
            });
        }
        Ok(self.append_frame(payload, tag_override, &mut on_record))
    }

    /// Clear the store and replay a previously exported stream through
    /// the ingest path, reproducing sequences, offsets and routing.
    ///
    /// Trailing bytes that do not form a complete frame surface as
    /// [`StoreError::ShortFrame`] (the complete prefix is still loaded).
    pub fn load<F>(&mut self, bytes: &[u8], on_record: F) -> StoreResult<IngestSummary>
    where
        F: FnMut(RecordRef<'_>),
    {
        self.clear();
        let summary = self.ingest(bytes, on_record)?;
        if summary.bytes_consumed < bytes.len() {
            return Err(StoreError::ShortFrame {
                remaining: bytes.len() - summary.bytes_consumed,
            });
        }
        tracing::debug!(records = summary.records, "store loaded from stream");
        Ok(summary)
    }

    /// Drop all records and derived structures; sequences restart at 1
    pub fn clear(&mut self) {
        self.data.clear();
        self.record_count = 0;
        self.next_sequence = 1;
        self.seq_to_offset.clear();
        self.offset_to_seq.clear();
        self.by_tag.clear();
    }

    fn append_frame<F>(&mut self, payload: &[u8], tag_override: Option<Tag>, on_record: &mut F) -> u64
    where
        F: FnMut(RecordRef<'_>),
    {
        let offset = self.data.len() as u64;
        framing::frame_payload(payload, &mut self.data);

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.record_count += 1;
        self.seq_to_offset.insert(sequence, offset);
        self.offset_to_seq.insert(offset, sequence);

        let stored = &self.data[offset as usize + 4..];
        let tag = tag_override.or_else(|| Tag::from_payload(stored));
        if let Some(tag) = tag {
            self.by_tag
                .entry(tag)
                .or_default()
                .push(RecordSlot { offset, sequence });
        }

        on_record(RecordRef {
            tag,
            payload: stored,
            sequence,
            offset,
        });

        sequence
    }

    // ==================== Reads ====================

    /// Borrow the payload stored at `offset` (no copy).
    ///
    /// Returns `None` for offsets that are not a frame boundary.
    pub fn payload_at(&self, offset: u64) -> Option<&[u8]> {
        self.offset_to_seq.get(&offset)?;
        Some(self.payload_at_unchecked(offset))
    }

    fn payload_at_unchecked(&self, offset: u64) -> &[u8] {
        let start = offset as usize;
        let len =
            u32::from_le_bytes(self.data[start..start + 4].try_into().unwrap()) as usize;
        &self.data[start + 4..start + 4 + len]
    }

    /// Sequence assigned to the record at `offset`
    pub fn sequence_at(&self, offset: u64) -> Option<u64> {
        self.offset_to_seq.get(&offset).copied()
    }

    /// Offset of the record with the given sequence
    pub fn offset_of(&self, sequence: u64) -> Option<u64> {
        self.seq_to_offset.get(&sequence).copied()
    }

    /// Whether a sequence exists
    pub fn has_record(&self, sequence: u64) -> bool {
        self.seq_to_offset.contains_key(&sequence)
    }

    /// Borrowed view of the record at `offset`
    pub fn record_at(&self, offset: u64) -> Option<RecordRef<'_>> {
        let sequence = self.sequence_at(offset)?;
        let payload = self.payload_at_unchecked(offset);
        Some(RecordRef {
            tag: Tag::from_payload(payload),
            payload,
            sequence,
            offset,
        })
    }

    /// Borrowed view of the record with the given sequence
    pub fn record_by_sequence(&self, sequence: u64) -> Option<RecordRef<'_>> {
        self.record_at(self.offset_of(sequence)?)
    }

    /// Visit every record in insertion order; the visitor returns `false`
    /// to stop early
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(RecordRef<'_>) -> bool,
    {
        let mut offset = 0usize;
        while offset + 4 <= self.data.len() {
            let len =
                u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap()) as usize;
            let payload = &self.data[offset + 4..offset + 4 + len];
            let sequence = self.offset_to_seq[&(offset as u64)];
            let go = visitor(RecordRef {
                tag: Tag::from_payload(payload),
                payload,
                sequence,
                offset: offset as u64,
            });
            if !go {
                return;
            }
            offset += 4 + len;
        }
    }

    /// Visit every record routed under `tag`, in insertion order; the
    /// visitor returns `false` to stop early
    pub fn for_each_by_tag<F>(&self, tag: Tag, mut visitor: F)
    where
        F: FnMut(RecordRef<'_>) -> bool,
    {
        let Some(slots) = self.by_tag.get(&tag) else {
            return;
        };
        for slot in slots {
            let payload = self.payload_at_unchecked(slot.offset);
            let go = visitor(RecordRef {
                tag: Some(tag),
                payload,
                sequence: slot.sequence,
                offset: slot.offset,
            });
            if !go {
                return;
            }
        }
    }

    /// O(1) random access to the i-th record of a tag
    pub fn record_by_tag_index(&self, tag: Tag, index: usize) -> Option<RecordRef<'_>> {
        let slot = self.by_tag.get(&tag)?.get(index)?;
        let payload = self.payload_at_unchecked(slot.offset);
        Some(RecordRef {
            tag: Some(tag),
            payload,
            sequence: slot.sequence,
            offset: slot.offset,
        })
    }

    /// Direct access to a tag's record list (avoids a map lookup per
    /// iteration step)
    pub fn slots_by_tag(&self, tag: Tag) -> Option<&[RecordSlot]> {
        self.by_tag.get(&tag).map(|v| v.as_slice())
    }

    /// Record count for one tag
    pub fn count_by_tag(&self, tag: Tag) -> usize {
        self.by_tag.get(&tag).map(|v| v.len()).unwrap_or(0)
    }

    // ==================== Export ====================

    /// Copy of the live prefix of the buffer.
    ///
    /// Round-trip property: `load(export())` reproduces identical
    /// sequences and offsets.
    pub fn export(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Total records appended
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Live bytes in the buffer (the write offset)
    pub fn data_size(&self) -> u64 {
        self.data.len() as u64
    }
}
