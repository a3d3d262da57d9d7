//! Record store error types

use thiserror::Error;

/// Errors that can occur in the record store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A length prefix exceeds the configured maximum frame length.
    ///
    /// Ingest stops at the last valid frame boundary; `consumed` and
    /// `frames` report the progress made before the oversized prefix so
    /// the caller can decide whether to skip past it.
    #[error(
        "frame of {length} bytes exceeds maximum {max} (consumed {consumed} bytes, {frames} frames)"
    )]
    FrameTooLarge {
        length: usize,
        max: usize,
        consumed: usize,
        frames: usize,
    },

    /// Trailing bytes at end of a loaded stream do not form a complete frame
    #[error("short frame at end of stream: {remaining} trailing bytes")]
    ShortFrame { remaining: usize },
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
