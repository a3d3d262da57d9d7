//! Stream framer
//!
//! Splits chunked byte input into complete length-prefixed frames:
//!
//! Format per frame:
//! - length: u32 (4 bytes, little-endian)
//! - payload: [u8; length]
//!
//! The framer is stateless over the buffer the caller maintains. A frame
//! is complete when the 4-byte prefix is present and `length` payload
//! bytes follow. Partial trailing data is never consumed; the caller
//! keeps the residue and concatenates it with the next chunk, so any
//! byte-wise partition of a stream yields the same frames in the same
//! order as the whole stream.

use crate::store::error::{StoreError, StoreResult};

/// Outcome of one framing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Bytes consumed from the front of the input
    pub bytes_consumed: usize,
    /// Complete frames emitted
    pub frames: usize,
}

/// Scan `bytes` from the front, invoking `emit` once per complete frame
/// with `(payload, frame_offset)` where `frame_offset` is the position of
/// the frame's length prefix within `bytes`.
///
/// Stops at the first incomplete frame and reports how far it got. A
/// declared length above `max_frame_len` aborts with
/// [`StoreError::FrameTooLarge`] carrying the progress made.
pub fn scan_frames<F>(bytes: &[u8], max_frame_len: usize, mut emit: F) -> StoreResult<ScanSummary>
where
    F: FnMut(&[u8], usize),
{
    let mut consumed = 0usize;
    let mut frames = 0usize;

    while bytes.len() - consumed >= 4 {
        let prefix: [u8; 4] = bytes[consumed..consumed + 4].try_into().unwrap();
        let length = u32::from_le_bytes(prefix) as usize;

        if length > max_frame_len {
            return Err(StoreError::FrameTooLarge {
                length,
                max: max_frame_len,
                consumed,
                frames,
            });
        }

        if consumed + 4 + length > bytes.len() {
            break; // incomplete frame, caller retains the residue
        }

        emit(&bytes[consumed + 4..consumed + 4 + length], consumed);
        consumed += 4 + length;
        frames += 1;
    }

    Ok(ScanSummary {
        bytes_consumed: consumed,
        frames,
    })
}

/// Frame a payload: `[u32 LE length][payload]`
pub fn frame_payload(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}
