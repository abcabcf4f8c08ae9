//! Segment files.
//!
//! A segment is one append-only file of a partition's log with a fixed byte
//! capacity. It is created exclusively: opening a path that already exists
//! means two segments were assigned the same epoch, which is a logic bug and
//! surfaces as the fatal [`WalError::SegmentExists`].
//!
//! A segment is owned by exactly one writer node. When the node rotates, the
//! outgoing segment is moved into a background task with
//! [`Segment::close_detached`] and the node carries on with the new one.

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{WalError, WalResult};
use crate::storage::{Storage, StorageFile};

/// An open, append-only segment file.
pub struct Segment {
    path: PathBuf,
    /// `None` once closed.
    file: Option<Box<dyn StorageFile>>,
    /// Append cursor: bytes written so far.
    size: u64,
    /// Bytes covered by the last successful fsync.
    flushed_size: u64,
    capacity: u64,
}

impl Segment {
    /// Creates a new segment file at `path`.
    ///
    /// # Errors
    /// Returns [`WalError::SegmentExists`] if the path already exists, or an
    /// I/O error if the file cannot be created.
    pub async fn open<S: Storage + ?Sized>(
        storage: &S,
        path: impl Into<PathBuf>,
        capacity: u64,
    ) -> WalResult<Self> {
        let path = path.into();
        let file = storage.create(&path).await?;

        info!(path = %path.display(), capacity, "Created segment");

        Ok(Self {
            path,
            file: Some(file),
            size: 0,
            flushed_size: 0,
            capacity,
        })
    }

    /// Appends `data` at the end of the segment.
    ///
    /// Returns the number of bytes written. The data is not durable until
    /// [`Segment::flush`] succeeds.
    ///
    /// # Errors
    /// Returns [`WalError::SegmentFull`] if the data does not fit, or
    /// [`WalError::Closed`] if the segment was closed.
    pub async fn append(&mut self, data: &[u8]) -> WalResult<u64> {
        let file = self.file.as_ref().ok_or(WalError::Closed { what: "segment" })?;

        let len = data.len() as u64;
        if len > self.space_left() {
            return Err(WalError::SegmentFull {
                size: self.size,
                requested: len,
                capacity: self.capacity,
            });
        }

        file.write_at(self.size, data).await?;
        self.size += len;
        Ok(len)
    }

    /// Syncs appended bytes to stable storage.
    ///
    /// # Errors
    /// Returns an error if the fsync fails or the segment is closed.
    pub async fn flush(&mut self) -> WalResult<()> {
        let file = self.file.as_ref().ok_or(WalError::Closed { what: "segment" })?;
        if self.flushed_size == self.size {
            return Ok(());
        }

        file.sync().await?;
        debug!(
            path = %self.path.display(),
            bytes = self.size - self.flushed_size,
            size = self.size,
            "Flushed segment"
        );
        self.flushed_size = self.size;
        Ok(())
    }

    /// Flushes and releases the file handle. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns an error if the final flush fails; the segment stays open so
    /// the close can be retried.
    pub async fn close(&mut self) -> WalResult<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.flush().await?;
        self.file = None;
        info!(path = %self.path.display(), size = self.size, "Closed segment");
        Ok(())
    }

    /// Moves the segment into a background task that flushes and closes it.
    ///
    /// Failures are logged; nobody is waiting for them.
    pub fn close_detached(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.close().await {
                warn!(path = %self.path.display(), error = %e, "Detached segment close failed");
            }
        })
    }

    /// Returns the bytes still available before the segment is full.
    #[must_use]
    pub const fn space_left(&self) -> u64 {
        self.capacity.saturating_sub(self.size)
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the bytes written but not yet flushed.
    #[must_use]
    pub const fn unflushed_bytes(&self) -> u64 {
        self.size - self.flushed_size
    }

    /// Returns the segment's capacity.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the path of the segment file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once [`Segment::close`] has succeeded.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("flushed_size", &self.flushed_size)
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FaultConfig, SimulatedStorage, TokioStorage};

    #[tokio::test]
    async fn test_segment_append_and_flush() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("segment-0.wal");
        let storage = TokioStorage::new();

        let mut segment = Segment::open(&storage, &path, 1024).await.unwrap();
        assert_eq!(segment.append(b"hello").await.unwrap(), 5);
        assert_eq!(segment.size(), 5);
        assert_eq!(segment.space_left(), 1019);
        assert_eq!(segment.unflushed_bytes(), 5);

        segment.flush().await.unwrap();
        assert_eq!(segment.unflushed_bytes(), 0);

        segment.close().await.unwrap();
        assert!(segment.is_closed());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_segment_open_existing_path_is_fatal() {
        let storage = SimulatedStorage::new(1);
        let path = Path::new("/wal/segment-0.wal");

        let _first = Segment::open(&storage, path, 1024).await.unwrap();
        let err = Segment::open(&storage, path, 1024).await.unwrap_err();
        assert!(matches!(err, WalError::SegmentExists { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_segment_rejects_overflow() {
        let storage = SimulatedStorage::new(1);
        let mut segment = Segment::open(&storage, "/wal/segment-0.wal", 8).await.unwrap();

        segment.append(b"12345").await.unwrap();
        let result = segment.append(b"6789").await;
        assert!(matches!(
            result,
            Err(WalError::SegmentFull {
                size: 5,
                requested: 4,
                capacity: 8
            })
        ));
        assert_eq!(segment.size(), 5);
    }

    #[tokio::test]
    async fn test_segment_close_is_idempotent() {
        let storage = SimulatedStorage::new(1);
        let path = Path::new("/wal/segment-0.wal");
        let mut segment = Segment::open(&storage, path, 64).await.unwrap();
        segment.append(b"abc").await.unwrap();

        segment.close().await.unwrap();
        segment.close().await.unwrap();
        assert_eq!(storage.sync_count(path), 1);

        let result = segment.append(b"x").await;
        assert!(matches!(result, Err(WalError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_segment_close_retries_after_fsync_failure() {
        let storage = SimulatedStorage::with_faults(1, FaultConfig::none().with_force_fsync_fail());
        let mut segment = Segment::open(&storage, "/wal/segment-0.wal", 64).await.unwrap();
        segment.append(b"abc").await.unwrap();

        assert!(segment.close().await.is_err());
        assert!(!segment.is_closed());
        segment.close().await.unwrap();
        assert!(segment.is_closed());
    }

    #[tokio::test]
    async fn test_segment_close_detached() {
        let storage = SimulatedStorage::new(1);
        let path = Path::new("/wal/segment-0.wal");
        let mut segment = Segment::open(&storage, path, 64).await.unwrap();
        segment.append(b"detached").await.unwrap();

        segment.close_detached().await.unwrap();
        assert_eq!(storage.sync_count(path), 1);
        assert_eq!(storage.get_raw_content(path).unwrap(), b"detached");
    }
}
