//! Reading records back from segment files.
//!
//! Readers never look past the durable size a writer node has announced for
//! a segment, so they only ever see fsynced bytes.

use std::path::Path;

use bytes::Bytes;
use tracing::warn;

use crate::error::{WalError, WalResult};
use crate::record::{WalRecord, RECORD_HEADER_SIZE};
use crate::storage::Storage;

/// A record together with its logical offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Logical offset of the record.
    pub offset: u64,
    /// The record.
    pub record: WalRecord,
}

/// Result of reading one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentRead {
    /// Records in offset order.
    pub records: Vec<ReadRecord>,
    /// Offset to continue reading from.
    pub next_offset: u64,
    /// Encoded bytes covered by `records`.
    pub bytes: u64,
}

/// Reads records of the segment starting at logical offset `epoch`.
///
/// Starts at `offset` (which must be a record boundary) and stops at
/// `durable_size` or once `max_bytes` would be exceeded. The first record is
/// always returned when one is available, even if it alone exceeds
/// `max_bytes`.
///
/// # Errors
/// Returns [`WalError::OffsetOutOfRange`] if `offset` lies outside the
/// segment, or a decode error if the data is corrupt.
#[allow(clippy::cast_possible_truncation)] // Read sizes bounded by max_bytes and RECORD_SIZE_BYTES_MAX.
pub async fn read_segment<S: Storage + ?Sized>(
    storage: &S,
    path: &Path,
    epoch: u64,
    durable_size: u64,
    offset: u64,
    max_bytes: u64,
) -> WalResult<SegmentRead> {
    if offset < epoch || offset > epoch + durable_size {
        return Err(WalError::OffsetOutOfRange {
            offset,
            first: epoch,
            last: epoch + durable_size,
        });
    }

    let start = offset - epoch;
    let available = durable_size - start;
    let mut read = SegmentRead {
        records: Vec::new(),
        next_offset: offset,
        bytes: 0,
    };
    if available == 0 {
        return Ok(read);
    }

    let file = storage.open(path).await?;
    let want = available.min(max_bytes.max(RECORD_HEADER_SIZE as u64));
    let mut buf = file.read_at(start, want as usize).await?;

    loop {
        if buf.is_empty() {
            break;
        }
        let before = buf.len();
        match WalRecord::decode(&mut buf, read.next_offset) {
            Ok(record) => {
                let size = (before - buf.len()) as u64;
                read.records.push(ReadRecord {
                    offset: read.next_offset,
                    record,
                });
                read.next_offset += size;
                read.bytes += size;
            }
            // The buffer ended mid-record: that record belongs to the next read,
            // unless nothing was read yet.
            Err(WalError::TruncatedRecord { expected, .. }) => {
                if read.records.is_empty() && expected <= available {
                    let mut whole = file.read_at(start, expected as usize).await?;
                    let record = WalRecord::decode(&mut whole, offset)?;
                    read.records.push(ReadRecord { offset, record });
                    read.next_offset = offset + expected;
                    read.bytes = expected;
                }
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(read)
}

/// Scans a segment left behind by a previous run and cuts off a torn tail.
///
/// Returns the length of the valid prefix. Bytes after the last complete,
/// checksummed record are truncated away.
///
/// # Errors
/// Returns an error if the file cannot be read or truncated.
pub async fn recover_segment<S: Storage + ?Sized>(storage: &S, path: &Path) -> WalResult<u64> {
    let file = storage.open(path).await?;
    let data = file.read_all().await?;
    let total = data.len() as u64;

    let valid = valid_prefix(data);
    if valid < total {
        warn!(
            path = %path.display(),
            valid,
            discarded = total - valid,
            "Truncating torn segment tail"
        );
        file.truncate(valid).await?;
        file.sync().await?;
    }
    Ok(valid)
}

fn valid_prefix(mut data: Bytes) -> u64 {
    let mut valid = 0u64;
    while !data.is_empty() {
        let before = data.len();
        if WalRecord::decode(&mut data, valid).is_err() {
            break;
        }
        valid += (before - data.len()) as u64;
    }
    valid
}
