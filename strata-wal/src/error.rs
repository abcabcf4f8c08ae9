//! WAL error types.
//!
//! All errors are explicit and typed. No string errors, except for the
//! message carried by an I/O failure.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// A segment or index file already exists where a new one must be created.
    ///
    /// Indicates an epoch/naming collision. This is a logic bug, not a
    /// transient fault.
    #[error("segment already exists: {}", path.display())]
    SegmentExists {
        /// Path that was expected to be absent.
        path: PathBuf,
    },

    /// A write would overflow the segment's capacity.
    #[error("segment full: {size} + {requested} bytes exceeds capacity {capacity}")]
    SegmentFull {
        /// Bytes already in the segment.
        size: u64,
        /// Bytes the write needed.
        requested: u64,
        /// Segment capacity.
        capacity: u64,
    },

    /// Record is larger than the configured limit.
    #[error("record too large: {size} bytes exceeds max {max} bytes")]
    RecordTooLarge {
        /// Encoded record size in bytes.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// CRC checksum mismatch indicates corruption.
    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Expected CRC32 value.
        expected: u32,
        /// Actual CRC32 value computed.
        actual: u32,
    },

    /// Record or index header is invalid or corrupted.
    #[error("invalid header at offset {offset}: {reason}")]
    InvalidHeader {
        /// Byte offset of the header.
        offset: u64,
        /// Why the header is invalid.
        reason: &'static str,
    },

    /// A record was cut short, typically by a torn write.
    #[error("truncated record at offset {offset}: expected {expected} bytes, found {found} bytes")]
    TruncatedRecord {
        /// Offset of the truncated record.
        offset: u64,
        /// Expected record size.
        expected: u64,
        /// Actual bytes found.
        found: u64,
    },

    /// The indexer was handed an offset smaller than one it already indexed.
    #[error("offset regression: {offset} is below largest indexed offset {largest}")]
    OffsetRegression {
        /// Offending offset.
        offset: u64,
        /// Largest offset seen so far.
        largest: u64,
    },

    /// A read asked for an offset the log does not cover.
    #[error("offset {offset} out of range ({first}..={last})")]
    OffsetOutOfRange {
        /// Requested offset.
        offset: u64,
        /// First readable offset.
        first: u64,
        /// End of the durable log.
        last: u64,
    },

    /// I/O error from underlying storage.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// The segment, indexer or writer node was already closed.
    #[error("{what} is closed")]
    Closed {
        /// Which component was closed.
        what: &'static str,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl WalError {
    /// Creates an I/O error.
    pub fn io(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            operation,
            message: err.to_string(),
        }
    }

    /// Returns true if this error indicates data corruption.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::InvalidHeader { .. }
        )
    }

    /// Returns true if this error is a logic/configuration fault that must not
    /// be retried.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SegmentExists { .. } | Self::OffsetRegression { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WalError::ChecksumMismatch {
            offset: 1024,
            expected: 0xDEAD_BEEF,
            actual: 0xCAFE_BABE,
        };
        let msg = format!("{err}");
        assert!(msg.contains("1024"));
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("0xcafebabe"));
    }

    #[test]
    fn test_is_corruption() {
        assert!(WalError::ChecksumMismatch {
            offset: 0,
            expected: 0,
            actual: 1
        }
        .is_corruption());

        assert!(!WalError::Closed { what: "segment" }.is_corruption());
    }

    #[test]
    fn test_is_fatal() {
        assert!(WalError::SegmentExists {
            path: PathBuf::from("/wal/segment-0.wal")
        }
        .is_fatal());
        assert!(WalError::OffsetRegression {
            offset: 1,
            largest: 2
        }
        .is_fatal());
        assert!(!WalError::io("write", "disk full").is_fatal());
    }
}
