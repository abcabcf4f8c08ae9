//! Segment key indexer for compaction topics.
//!
//! Every record appended to a compaction topic's segment is fed to that
//! segment's [`SegmentIndexer`], which keeps the latest (or first) offset of
//! each key in an ordered in-memory map. The map's estimated size is bounded;
//! once it exceeds the budget the whole map is written to the parallel index
//! file as one [`IndexBlock`] and a fresh generation starts.
//!
//! # Index Block Format
//!
//! ```text
//! +----------+-------+-------+-----------+----------+---------+
//! |  Magic   | Count |  Xor  |  Largest  |  CRC32   | Entries |
//! | (8 bytes)| (4 B) | (8 B) |  offset   | (4 bytes)|   ...   |
//! |          |       |       |   (8 B)   |          |         |
//! +----------+-------+-------+-----------+----------+---------+
//!
//! Entry: hash u64 | offset u64 | size u32 | key_len u32 | key
//! ```
//!
//! The CRC covers the entries section. `Xor` is the xor of every key hash in
//! the block, a cheap checksum for debugging tools.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{WalError, WalResult};
use crate::limits::{INDEX_ENTRY_OVERHEAD_BYTES, INDEX_MEMORY_BUDGET_BYTES};
use crate::record::WalRecord;
use crate::storage::{Storage, StorageFile};

/// Magic bytes opening every index block.
const INDEX_BLOCK_MAGIC: &[u8; 8] = b"STRXIDX1";

/// Size of an index block header in bytes.
pub const INDEX_BLOCK_HEADER_SIZE: usize = 32; // 8 + 4 + 8 + 8 + 4

/// Fixed part of an encoded index entry.
const INDEX_ENTRY_FIXED_SIZE: usize = 24; // 8 + 8 + 4 + 4

/// What to do when a key is indexed twice in one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyPolicy {
    /// The newer record's offset replaces the stored one.
    #[default]
    LastWriteWins,
    /// The first record's offset is kept.
    FirstWriteWins,
}

/// Configuration for a segment indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Estimated memory the in-memory map may use before it is flushed.
    pub memory_budget_bytes: u64,
    /// Duplicate key handling.
    pub duplicate_policy: DuplicateKeyPolicy,
}

impl IndexerConfig {
    /// Creates a configuration with the default 32 MB budget.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            memory_budget_bytes: INDEX_MEMORY_BUDGET_BYTES,
            duplicate_policy: DuplicateKeyPolicy::LastWriteWins,
        }
    }

    /// Sets the memory budget.
    #[must_use]
    pub const fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    /// Sets the duplicate key policy.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the budget is zero.
    pub fn validate(&self) -> WalResult<()> {
        if self.memory_budget_bytes == 0 {
            return Err(WalError::InvalidConfig {
                reason: "index memory budget must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One indexed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// xxHash-64 of the key.
    pub hash: u64,
    /// Logical offset of the record.
    pub offset: u64,
    /// Encoded size of the record.
    pub size: u32,
    /// Key bytes.
    pub key: Bytes,
}

impl IndexEntry {
    #[allow(clippy::cast_possible_truncation)] // Key length bounded by the record limit.
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.hash);
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.size);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_slice(&self.key);
    }

    fn encoded_size(&self) -> usize {
        INDEX_ENTRY_FIXED_SIZE + self.key.len()
    }
}

/// Map key: hash first, then key length, then key bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntryKey {
    hash: u64,
    len: usize,
    key: Bytes,
}

impl EntryKey {
    fn new(hash: u64, key: Bytes) -> Self {
        Self {
            hash,
            len: key.len(),
            key,
        }
    }
}

/// A decoded index block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBlock {
    /// Xor of all key hashes in the block.
    pub xor: u64,
    /// Largest offset indexed when the block was written.
    pub largest_offset: u64,
    /// Entries in (hash, key length, key) order.
    pub entries: Vec<IndexEntry>,
}

impl IndexBlock {
    #[allow(clippy::cast_possible_truncation)] // Entry count bounded by the memory budget.
    fn encode<'a>(
        entries: impl ExactSizeIterator<Item = &'a IndexEntry>,
        xor: u64,
        largest_offset: u64,
    ) -> Bytes {
        let count = entries.len();
        let mut body = BytesMut::new();
        for entry in entries {
            entry.encode(&mut body);
        }

        let mut buf = BytesMut::with_capacity(INDEX_BLOCK_HEADER_SIZE + body.len());
        buf.put_slice(INDEX_BLOCK_MAGIC);
        buf.put_u32_le(count as u32);
        buf.put_u64_le(xor);
        buf.put_u64_le(largest_offset);
        buf.put_u32_le(crc32fast::hash(&body));
        buf.put_slice(&body);
        buf.freeze()
    }

    /// Decodes every block of an index file.
    ///
    /// # Errors
    /// Returns an error if a block is truncated or fails its checksum.
    pub fn decode_all(mut data: Bytes) -> WalResult<Vec<Self>> {
        let mut blocks = Vec::new();
        let total = data.len() as u64;

        while data.has_remaining() {
            let position = total - data.remaining() as u64;
            blocks.push(Self::decode(&mut data, position)?);
        }

        Ok(blocks)
    }

    fn decode(data: &mut Bytes, position: u64) -> WalResult<Self> {
        if data.remaining() < INDEX_BLOCK_HEADER_SIZE {
            return Err(WalError::TruncatedRecord {
                offset: position,
                expected: INDEX_BLOCK_HEADER_SIZE as u64,
                found: data.remaining() as u64,
            });
        }

        if &data[..8] != INDEX_BLOCK_MAGIC {
            return Err(WalError::InvalidHeader {
                offset: position,
                reason: "bad index block magic",
            });
        }
        data.advance(8);

        let count = data.get_u32_le();
        let xor = data.get_u64_le();
        let largest_offset = data.get_u64_le();
        let crc = data.get_u32_le();

        // Walk the entries once to find the body length before checking the CRC.
        let mut body_len = 0usize;
        for _ in 0..count {
            if data.remaining() < body_len + INDEX_ENTRY_FIXED_SIZE {
                return Err(Self::truncated(position, body_len, data.remaining()));
            }
            let key_len_at = body_len + 20;
            let key_len = u32::from_le_bytes([
                data[key_len_at],
                data[key_len_at + 1],
                data[key_len_at + 2],
                data[key_len_at + 3],
            ]) as usize;
            body_len += INDEX_ENTRY_FIXED_SIZE + key_len;
            if data.remaining() < body_len {
                return Err(Self::truncated(position, body_len, data.remaining()));
            }
        }

        let mut body = data.split_to(body_len);
        let actual = crc32fast::hash(&body);
        if actual != crc {
            return Err(WalError::ChecksumMismatch {
                offset: position,
                expected: crc,
                actual,
            });
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let hash = body.get_u64_le();
            let offset = body.get_u64_le();
            let size = body.get_u32_le();
            let key_len = body.get_u32_le() as usize;
            let key = body.split_to(key_len);
            entries.push(IndexEntry {
                hash,
                offset,
                size,
                key,
            });
        }

        Ok(Self {
            xor,
            largest_offset,
            entries,
        })
    }

    fn truncated(position: u64, needed: usize, found: usize) -> WalError {
        WalError::TruncatedRecord {
            offset: position,
            expected: (INDEX_BLOCK_HEADER_SIZE + needed) as u64,
            found: (INDEX_BLOCK_HEADER_SIZE + found) as u64,
        }
    }
}

/// Builds the key index of one segment.
pub struct SegmentIndexer {
    path: PathBuf,
    file: Option<Box<dyn StorageFile>>,
    config: IndexerConfig,
    entries: BTreeMap<EntryKey, IndexEntry>,
    /// Estimated memory held by `entries`.
    estimated_bytes: u64,
    /// Xor of the key hashes in the current generation.
    xor: u64,
    /// Never decreases, survives flushes.
    largest_offset: u64,
    /// Append position in the index file.
    file_size: u64,
    flush_count: u64,
}

impl SegmentIndexer {
    /// Creates the index file at `path`.
    ///
    /// # Errors
    /// Returns [`WalError::SegmentExists`] if the file already exists, or an
    /// error if the configuration is invalid or the file cannot be created.
    pub async fn open<S: Storage + ?Sized>(
        storage: &S,
        path: impl Into<PathBuf>,
        config: IndexerConfig,
    ) -> WalResult<Self> {
        config.validate()?;
        let path = path.into();
        let file = storage.create(&path).await?;

        debug!(path = %path.display(), budget = config.memory_budget_bytes, "Opened segment indexer");

        Ok(Self {
            path,
            file: Some(file),
            config,
            entries: BTreeMap::new(),
            estimated_bytes: 0,
            xor: 0,
            largest_offset: 0,
            file_size: 0,
            flush_count: 0,
        })
    }

    /// Indexes the record written at `offset`.
    ///
    /// Must be called once per appended record, in append order.
    ///
    /// # Errors
    /// Returns [`WalError::OffsetRegression`] if `offset` is below an offset
    /// already indexed, or an error if a budget-triggered flush fails.
    #[allow(clippy::cast_possible_truncation)] // Record size bounded by RECORD_SIZE_BYTES_MAX.
    pub async fn index(&mut self, offset: u64, record: &WalRecord) -> WalResult<()> {
        if self.file.is_none() {
            return Err(WalError::Closed { what: "indexer" });
        }
        if offset < self.largest_offset {
            return Err(WalError::OffsetRegression {
                offset,
                largest: self.largest_offset,
            });
        }
        self.largest_offset = offset;

        let hash = record.key_hash();
        let size = record.encoded_size() as u32;
        let map_key = EntryKey::new(hash, record.key.clone());

        if let Some(existing) = self.entries.get_mut(&map_key) {
            if self.config.duplicate_policy == DuplicateKeyPolicy::LastWriteWins {
                existing.offset = offset;
                existing.size = size;
            }
        } else {
            self.estimated_bytes += INDEX_ENTRY_OVERHEAD_BYTES + record.key.len() as u64;
            self.xor ^= hash;
            self.entries.insert(
                map_key,
                IndexEntry {
                    hash,
                    offset,
                    size,
                    key: record.key.clone(),
                },
            );
        }

        if self.estimated_bytes > self.config.memory_budget_bytes {
            self.flush().await?;
        }
        Ok(())
    }

    /// Writes the current generation as one block and starts a new one.
    ///
    /// Does nothing when the map is empty.
    ///
    /// # Errors
    /// Returns an error if the write or fsync fails; the generation is kept.
    pub async fn flush(&mut self) -> WalResult<()> {
        let file = self.file.as_ref().ok_or(WalError::Closed { what: "indexer" })?;
        if self.entries.is_empty() {
            return Ok(());
        }

        let block = IndexBlock::encode(self.entries.values(), self.xor, self.largest_offset);
        file.write_at(self.file_size, &block).await?;
        file.sync().await?;

        debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            bytes = block.len(),
            xor = self.xor,
            "Flushed index block"
        );

        self.file_size += block.len() as u64;
        self.flush_count += 1;
        self.entries.clear();
        self.estimated_bytes = 0;
        self.xor = 0;
        Ok(())
    }

    /// Flushes remaining entries and closes the file. Closing twice is a
    /// no-op.
    ///
    /// # Errors
    /// Returns an error if the final flush fails.
    pub async fn close(&mut self) -> WalResult<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.flush().await?;
        self.file = None;
        info!(path = %self.path.display(), blocks = self.flush_count, "Closed segment indexer");
        Ok(())
    }

    /// Moves the indexer into a background task that flushes and closes it.
    pub fn close_detached(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.close().await {
                warn!(path = %self.path.display(), error = %e, "Detached index close failed");
            }
        })
    }

    /// Looks `key` up in the in-memory generation.
    #[must_use]
    pub fn lookup(&self, key: &[u8]) -> Option<&IndexEntry> {
        let map_key = EntryKey::new(xxhash_rust::xxh64::xxh64(key, 0), Bytes::copy_from_slice(key));
        self.entries.get(&map_key)
    }

    /// Number of keys in the in-memory generation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the in-memory generation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated memory of the in-memory generation.
    #[must_use]
    pub const fn estimated_bytes(&self) -> u64 {
        self.estimated_bytes
    }

    /// Largest offset indexed so far.
    #[must_use]
    pub const fn largest_offset(&self) -> u64 {
        self.largest_offset
    }

    /// Number of blocks written.
    #[must_use]
    pub const fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Path of the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SegmentIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentIndexer")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("estimated_bytes", &self.estimated_bytes)
            .field("largest_offset", &self.largest_offset)
            .field("flush_count", &self.flush_count)
            .finish_non_exhaustive()
    }
}
