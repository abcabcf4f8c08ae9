//! Strata WAL - segmented append-only write-ahead log.
//!
//! A partition's log is a sequence of size-bounded segment files. The
//! [`WriterNode`] appends records to the active segment, rotates to a new one
//! when the next record would not fit, and flushes on every append and on a
//! timer. Compaction topics additionally feed every record into a
//! [`SegmentIndexer`], which keeps a bounded key/offset map and spills it to a
//! parallel index file.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Exclusive creation**: a segment or index file is never truncated; an
//!   existing path is a fatal naming collision
//! - **Checksums**: CRC32 on every record and every index block
//! - **Explicit limits**: bounded segments, records and index memory
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod indexer;
pub mod naming;
mod page_cache;
mod reader;
mod record;
mod segment;
mod storage;
mod writer;

pub use error::{WalError, WalResult};
pub use indexer::{DuplicateKeyPolicy, IndexBlock, IndexEntry, IndexerConfig, SegmentIndexer};
pub use page_cache::{PageCacheLease, PageCacheResult, PagePriority, PAGE_SIZE};
pub use reader::{read_segment, recover_segment, ReadRecord, SegmentRead};
pub use record::{CompressionType, WalRecord, RECORD_HEADER_SIZE};
pub use segment::Segment;
pub use storage::{FaultConfig, SimulatedStorage, Storage, StorageFile, TokioStorage};
pub use writer::{NoopListener, SegmentListener, WriteReply, WriterConfig, WriterNode};

/// WAL configuration limits.
pub mod limits {
    /// Maximum encoded size of a single record in bytes (1 MB).
    pub const RECORD_SIZE_BYTES_MAX: u32 = 1024 * 1024;

    /// Maximum size of a segment in bytes (1 GB).
    pub const SEGMENT_SIZE_BYTES_MAX: u64 = 1024 * 1024 * 1024;

    /// Minimum size of a segment in bytes (4 KB).
    pub const SEGMENT_SIZE_BYTES_MIN: u64 = 4 * 1024;

    /// Default size of a segment in bytes (64 MB).
    pub const SEGMENT_SIZE_BYTES_DEFAULT: u64 = 64 * 1024 * 1024;

    /// Memory budget for the keys a segment indexer holds before it flushes
    /// an index block (32 MB).
    pub const INDEX_MEMORY_BUDGET_BYTES: u64 = 1 << 25;

    /// Estimated per-entry bookkeeping cost charged against the index budget,
    /// on top of the key bytes.
    pub const INDEX_ENTRY_OVERHEAD_BYTES: u64 = 64;
}
