//! WAL record format.
//!
//! Each record appended to a segment has the following binary format:
//!
//! ```text
//! +----------+----------+-----------+-------+----------+-------+-------+
//! |  CRC32   | Key len  | Value len | Comp. | Reserved |  Key  | Value |
//! | (4 bytes)| (4 bytes)| (4 bytes) | (1 B) | (3 bytes)| (K B) | (V B) |
//! +----------+----------+-----------+-------+----------+-------+-------+
//! ```
//!
//! - CRC32: Checksum of everything after the CRC field
//! - Comp.: Compression codec the value was written with; the WAL carries the
//!   tag and never inspects the value bytes
//!
//! All integers are stored in little-endian format. The logical offset of a
//! record is the byte position of its header in the partition's log, so the
//! next record's offset is `offset + encoded_size()`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use xxhash_rust::xxh64::xxh64;

use crate::error::{WalError, WalResult};
use crate::limits::RECORD_SIZE_BYTES_MAX;

/// Size of the record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 16; // 4 + 4 + 4 + 1 + 3

/// Compression codec tag carried with a record's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// Value stored as-is.
    #[default]
    None = 0,
    /// LZ4 frame.
    Lz4 = 1,
    /// Zstandard frame.
    Zstd = 2,
}

impl CompressionType {
    /// Returns the on-disk tag.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses an on-disk tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// A single key/value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Record key. Used by the segment indexer of compaction topics.
    pub key: Bytes,
    /// Record value.
    pub value: Bytes,
    /// Compression codec of `value`.
    pub compression: CompressionType,
}

impl WalRecord {
    /// Creates a new uncompressed record.
    ///
    /// # Errors
    /// Returns an error if the encoded record exceeds `RECORD_SIZE_BYTES_MAX`.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> WalResult<Self> {
        Self::with_compression(key, value, CompressionType::None)
    }

    /// Creates a record whose value is tagged with the given codec.
    ///
    /// # Errors
    /// Returns an error if the encoded record exceeds `RECORD_SIZE_BYTES_MAX`.
    pub fn with_compression(
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        compression: CompressionType,
    ) -> WalResult<Self> {
        let record = Self {
            key: key.into(),
            value: value.into(),
            compression,
        };

        let size = record.encoded_size();
        if size > u64::from(RECORD_SIZE_BYTES_MAX) {
            return Err(WalError::RecordTooLarge {
                size,
                max: u64::from(RECORD_SIZE_BYTES_MAX),
            });
        }

        Ok(record)
    }

    /// Returns the number of bytes this record occupies on disk.
    #[must_use]
    pub fn encoded_size(&self) -> u64 {
        RECORD_HEADER_SIZE as u64 + self.key.len() as u64 + self.value.len() as u64
    }

    /// Returns the 64-bit hash of the key.
    #[must_use]
    pub fn key_hash(&self) -> u64 {
        xxh64(&self.key, 0)
    }

    /// Computes the CRC32 of everything after the CRC field.
    #[allow(clippy::cast_possible_truncation)] // Lengths bounded by RECORD_SIZE_BYTES_MAX.
    fn compute_crc(key: &[u8], value: &[u8], compression: u8) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(key.len() as u32).to_le_bytes());
        hasher.update(&(value.len() as u32).to_le_bytes());
        hasher.update(&[compression, 0, 0, 0]);
        hasher.update(key);
        hasher.update(value);
        hasher.finalize()
    }

    /// Encodes the record to bytes.
    #[allow(clippy::cast_possible_truncation)] // Lengths bounded by RECORD_SIZE_BYTES_MAX.
    pub fn encode(&self, buf: &mut BytesMut) {
        let compression = self.compression.as_u8();
        buf.put_u32_le(Self::compute_crc(&self.key, &self.value, compression));
        buf.put_u32_le(self.key.len() as u32);
        buf.put_u32_le(self.value.len() as u32);
        buf.put_u8(compression);
        buf.put_slice(&[0, 0, 0]);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
    }

    /// Encodes the record into a fresh buffer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Size bounded by RECORD_SIZE_BYTES_MAX.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size() as usize);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes a record from bytes.
    ///
    /// `offset` is only used for error reporting.
    ///
    /// # Errors
    /// Returns an error if the data is truncated, invalid or corrupted.
    pub fn decode(buf: &mut impl Buf, offset: u64) -> WalResult<Self> {
        if buf.remaining() < RECORD_HEADER_SIZE {
            return Err(WalError::TruncatedRecord {
                offset,
                expected: RECORD_HEADER_SIZE as u64,
                found: buf.remaining() as u64,
            });
        }

        let crc = buf.get_u32_le();
        let key_len = buf.get_u32_le();
        let value_len = buf.get_u32_le();
        let tag = buf.get_u8();
        buf.advance(3);

        let body_len = u64::from(key_len) + u64::from(value_len);
        if body_len + RECORD_HEADER_SIZE as u64 > u64::from(RECORD_SIZE_BYTES_MAX) {
            return Err(WalError::InvalidHeader {
                offset,
                reason: "record length exceeds maximum",
            });
        }

        let compression = CompressionType::from_u8(tag).ok_or(WalError::InvalidHeader {
            offset,
            reason: "unknown compression type",
        })?;

        if (buf.remaining() as u64) < body_len {
            return Err(WalError::TruncatedRecord {
                offset,
                expected: RECORD_HEADER_SIZE as u64 + body_len,
                found: RECORD_HEADER_SIZE as u64 + buf.remaining() as u64,
            });
        }

        let key = buf.copy_to_bytes(key_len as usize);
        let value = buf.copy_to_bytes(value_len as usize);

        let expected = Self::compute_crc(&key, &value, tag);
        if expected != crc {
            return Err(WalError::ChecksumMismatch {
                offset,
                expected,
                actual: crc,
            });
        }

        Ok(Self {
            key,
            value,
            compression,
        })
    }
}
