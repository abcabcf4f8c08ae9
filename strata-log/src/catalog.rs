//! Per-partition segment catalog.
//!
//! Maps each segment's epoch to its file and durable size. The writer node
//! keeps it current through [`SegmentListener`] notifications, which arrive
//! only after a flush succeeded, so readers consulting the catalog never see
//! bytes that are not on stable storage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use strata_wal::SegmentListener;

/// A segment known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Logical offset of the segment's first byte.
    pub epoch: u64,
    /// Segment file.
    pub path: PathBuf,
    /// Bytes known to be flushed.
    pub durable_size: u64,
}

impl SegmentInfo {
    /// One past the last durable offset.
    #[must_use]
    pub const fn end_offset(&self) -> u64 {
        self.epoch + self.durable_size
    }
}

/// Ordered map of a partition's segments.
#[derive(Debug, Default)]
pub struct SegmentCatalog {
    segments: Mutex<BTreeMap<u64, SegmentInfo>>,
}

impl SegmentCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn segments(&self) -> MutexGuard<'_, BTreeMap<u64, SegmentInfo>> {
        // Every critical section leaves the map consistent.
        self.segments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a segment found on disk.
    pub fn insert(&self, epoch: u64, path: PathBuf, durable_size: u64) {
        self.segments().insert(
            epoch,
            SegmentInfo {
                epoch,
                path,
                durable_size,
            },
        );
    }

    /// Segment holding `offset`: the one with the largest epoch not above it.
    #[must_use]
    pub fn locate(&self, offset: u64) -> Option<SegmentInfo> {
        self.segments()
            .range(..=offset)
            .next_back()
            .map(|(_, info)| info.clone())
    }

    /// Segment following the one that starts at `epoch`.
    #[must_use]
    pub fn next_after(&self, epoch: u64) -> Option<SegmentInfo> {
        self.segments()
            .range(epoch + 1..)
            .next()
            .map(|(_, info)| info.clone())
    }

    /// First offset of the partition.
    #[must_use]
    pub fn first_offset(&self) -> u64 {
        self.segments().keys().next().copied().unwrap_or(0)
    }

    /// One past the last durable offset of the partition.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.segments()
            .values()
            .next_back()
            .map_or(0, SegmentInfo::end_offset)
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments().len()
    }

    /// True when no segment is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments().is_empty()
    }

    /// All segments in epoch order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SegmentInfo> {
        self.segments().values().cloned().collect()
    }
}

#[async_trait]
impl SegmentListener for SegmentCatalog {
    async fn on_segment_created(&self, path: &Path, epoch: u64) {
        self.insert(epoch, path.to_path_buf(), 0);
    }

    async fn on_size_change(&self, path: &Path, epoch: u64, size: u64) {
        let mut segments = self.segments();
        let info = segments.entry(epoch).or_insert_with(|| SegmentInfo {
            epoch,
            path: path.to_path_buf(),
            durable_size: 0,
        });
        // Durable sizes only grow.
        info.durable_size = info.durable_size.max(size);
    }
}
