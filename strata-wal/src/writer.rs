//! Writer node: the append path of one partition.
//!
//! A [`WriterNode`] owns the active segment of a (topic, partition) and the
//! segment's indexer for compaction topics. Every append and rotation goes
//! through one gate, so the bytes of a batch are contiguous in the log and a
//! rotation never races a write.
//!
//! # Append
//!
//! For each record: if it does not fit in the space left, rotate; write it;
//! index it. Then flush the segment and, only once the flush succeeded,
//! announce the new durable size to the [`SegmentListener`].
//!
//! # Rotation
//!
//! The new segment is named by the current offset, which becomes the new
//! epoch. The outgoing segment is flushed under the gate and then handed to a
//! background task that closes it, so the writer never waits for a close.
//!
//! A background timer flushes unflushed bytes every `flush_interval`. It takes
//! the same gate and never rotates.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{WalError, WalResult};
use crate::indexer::{IndexerConfig, SegmentIndexer};
use crate::limits::{SEGMENT_SIZE_BYTES_DEFAULT, SEGMENT_SIZE_BYTES_MAX, SEGMENT_SIZE_BYTES_MIN};
use crate::naming::{index_file_name, segment_file_name, DEFAULT_SEGMENT_PREFIX};
use crate::record::WalRecord;
use crate::segment::Segment;
use crate::storage::Storage;

/// Default interval of the background flush.
const FLUSH_INTERVAL_DEFAULT: Duration = Duration::from_secs(1);

/// Receives segment lifecycle notifications from a writer node.
///
/// Calls are awaited under the writer's gate, in write order.
#[async_trait]
pub trait SegmentListener: Send + Sync {
    /// A new segment starting at logical offset `epoch` was created.
    async fn on_segment_created(&self, path: &Path, epoch: u64);

    /// The segment's bytes up to `size` are durable.
    async fn on_size_change(&self, path: &Path, epoch: u64, size: u64);
}

/// A listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

#[async_trait]
impl SegmentListener for NoopListener {
    async fn on_segment_created(&self, _path: &Path, _epoch: u64) {}

    async fn on_size_change(&self, _path: &Path, _epoch: u64, _size: u64) {}
}

/// Configuration for a writer node.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory holding the partition's segments.
    pub dir: PathBuf,
    /// Segment file name prefix.
    pub prefix: String,
    /// Capacity of each segment in bytes.
    pub max_log_segment_size: u64,
    /// Interval of the background flush.
    pub flush_interval: Duration,
    /// Logical offset the first segment starts at.
    pub epoch: u64,
    /// Index configuration, set for compaction topics only.
    pub indexer: Option<IndexerConfig>,
}

impl WriterConfig {
    /// Creates a configuration with defaults for the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            max_log_segment_size: SEGMENT_SIZE_BYTES_DEFAULT,
            flush_interval: FLUSH_INTERVAL_DEFAULT,
            epoch: 0,
            indexer: None,
        }
    }

    /// Sets the segment file name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the segment capacity.
    #[must_use]
    pub const fn with_max_log_segment_size(mut self, size: u64) -> Self {
        self.max_log_segment_size = size;
        self
    }

    /// Sets the background flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the starting epoch.
    #[must_use]
    pub const fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Enables key indexing of every segment.
    #[must_use]
    pub const fn with_indexer(mut self, config: IndexerConfig) -> Self {
        self.indexer = Some(config);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the segment size is out of range, the flush
    /// interval is zero, or the indexer configuration is invalid.
    pub fn validate(&self) -> WalResult<()> {
        if !(SEGMENT_SIZE_BYTES_MIN..=SEGMENT_SIZE_BYTES_MAX).contains(&self.max_log_segment_size) {
            return Err(WalError::InvalidConfig {
                reason: format!(
                    "max_log_segment_size {} outside {}..={}",
                    self.max_log_segment_size, SEGMENT_SIZE_BYTES_MIN, SEGMENT_SIZE_BYTES_MAX
                ),
            });
        }
        if self.flush_interval.is_zero() {
            return Err(WalError::InvalidConfig {
                reason: "flush_interval must be positive".to_string(),
            });
        }
        if let Some(indexer) = &self.indexer {
            indexer.validate()?;
        }
        Ok(())
    }

    fn segment_path(&self, epoch: u64) -> (PathBuf, PathBuf) {
        let name = segment_file_name(&self.prefix, epoch);
        let index = self.dir.join(index_file_name(&name));
        (self.dir.join(name), index)
    }
}

/// Result of an append: where the bytes landed and how many were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReply {
    /// Logical offset of the first appended record.
    pub offset: u64,
    /// Encoded bytes written.
    pub size: u64,
}

/// State behind the write gate.
struct WriterState {
    segment: Segment,
    indexer: Option<SegmentIndexer>,
    epoch: u64,
    current_size: u64,
    closed: bool,
}

impl WriterState {
    const fn current_offset(&self) -> u64 {
        self.epoch + self.current_size
    }
}

/// Appends records of one partition to size-bounded segments.
pub struct WriterNode<S: Storage + 'static> {
    storage: Arc<S>,
    config: WriterConfig,
    listener: Arc<dyn SegmentListener>,
    /// The write gate.
    state: Arc<Mutex<WriterState>>,
    flush_task: JoinHandle<()>,
}

// The gate is held across every await of an append by design.
#[allow(clippy::significant_drop_tightening)]
impl<S: Storage + 'static> WriterNode<S> {
    /// Opens the first segment at `config.epoch` and starts the flush timer.
    ///
    /// # Errors
    /// Returns [`WalError::SegmentExists`] if the segment for the epoch is
    /// already on disk, or an error if the configuration is invalid or the
    /// files cannot be created.
    pub async fn open(
        storage: Arc<S>,
        config: WriterConfig,
        listener: Arc<dyn SegmentListener>,
    ) -> WalResult<Self> {
        config.validate()?;
        storage.create_dir_all(&config.dir).await?;

        let (segment, indexer) = open_segment(storage.as_ref(), &config, config.epoch).await?;
        listener.on_segment_created(segment.path(), config.epoch).await;

        info!(
            dir = %config.dir.display(),
            epoch = config.epoch,
            max_log_segment_size = config.max_log_segment_size,
            indexed = config.indexer.is_some(),
            "Opened writer node"
        );

        let state = Arc::new(Mutex::new(WriterState {
            segment,
            indexer,
            epoch: config.epoch,
            current_size: 0,
            closed: false,
        }));

        let flush_task =
            spawn_flush_timer(Arc::downgrade(&state), listener.clone(), config.flush_interval);

        Ok(Self {
            storage,
            config,
            listener,
            state,
            flush_task,
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    /// See [`WriterNode::append_batch`].
    pub async fn append(&self, record: &WalRecord) -> WalResult<WriteReply> {
        self.append_batch(std::slice::from_ref(record)).await
    }

    /// Appends records contiguously, rotating as needed, then flushes.
    ///
    /// # Errors
    /// Returns [`WalError::RecordTooLarge`] (before writing anything) if a
    /// record exceeds the segment capacity, [`WalError::Closed`] after
    /// close, [`WalError::SegmentExists`] if a rotation collides with an
    /// existing file, or any I/O error. Nothing is retried.
    pub async fn append_batch(&self, records: &[WalRecord]) -> WalResult<WriteReply> {
        let capacity = self.config.max_log_segment_size;
        if let Some(size) = records
            .iter()
            .map(WalRecord::encoded_size)
            .find(|size| *size > capacity)
        {
            return Err(WalError::RecordTooLarge {
                size,
                max: capacity,
            });
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(WalError::Closed { what: "writer node" });
        }

        let offset = state.current_offset();
        let mut written = 0u64;
        let mut buf = BytesMut::new();

        for record in records {
            let size = record.encoded_size();
            if state.segment.space_left() < size {
                self.rotate(&mut state).await?;
            }

            let record_offset = state.current_offset();
            buf.clear();
            record.encode(&mut buf);
            state.segment.append(&buf).await?;
            state.current_size += size;
            written += size;

            if let Some(indexer) = state.indexer.as_mut() {
                indexer.index(record_offset, record).await?;
            }
        }

        if written > 0 {
            state.segment.flush().await?;
            self.listener
                .on_size_change(state.segment.path(), state.epoch, state.current_size)
                .await;
        }

        debug!(
            offset,
            bytes = written,
            records = records.len(),
            epoch = state.epoch,
            current_size = state.current_size,
            "Appended"
        );

        Ok(WriteReply {
            offset,
            size: written,
        })
    }

    /// Replaces the active segment with one starting at the current offset.
    async fn rotate(&self, state: &mut WriterState) -> WalResult<()> {
        let old_epoch = state.epoch;
        let new_epoch = state.current_offset();

        // Bytes already acknowledged for this batch must not depend on the
        // background close.
        if state.segment.unflushed_bytes() > 0 {
            state.segment.flush().await?;
            self.listener
                .on_size_change(state.segment.path(), old_epoch, state.current_size)
                .await;
        }

        let (segment, indexer) = open_segment(self.storage.as_ref(), &self.config, new_epoch).await?;

        let old_segment = std::mem::replace(&mut state.segment, segment);
        let old_indexer = std::mem::replace(&mut state.indexer, indexer);
        old_segment.close_detached();
        if let Some(old_indexer) = old_indexer {
            old_indexer.close_detached();
        }

        state.epoch = new_epoch;
        state.current_size = 0;

        info!(
            old_epoch,
            new_epoch,
            path = %state.segment.path().display(),
            "Rotated segment"
        );
        self.listener
            .on_segment_created(state.segment.path(), new_epoch)
            .await;
        Ok(())
    }

    /// Flushes unflushed bytes of the active segment.
    ///
    /// # Errors
    /// Returns an error if the node is closed or the fsync fails.
    pub async fn flush(&self) -> WalResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(WalError::Closed { what: "writer node" });
        }
        flush_active(&mut state, self.listener.as_ref()).await
    }

    /// Flushes and closes the segment and the indexer, then stops the flush
    /// timer. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns an error if the final flush fails.
    pub async fn close(&self) -> WalResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }

        // The timer keeps running until the close succeeded: a node that
        // failed to close still accepts appends.
        flush_active(&mut state, self.listener.as_ref()).await?;
        state.segment.close().await?;
        if let Some(indexer) = state.indexer.as_mut() {
            indexer.close().await?;
        }
        state.closed = true;
        self.flush_task.abort();

        info!(
            epoch = state.epoch,
            current_offset = state.current_offset(),
            "Closed writer node"
        );
        Ok(())
    }

    /// Bytes left in the active segment.
    pub async fn space_left(&self) -> u64 {
        let state = self.state.lock().await;
        self.config.max_log_segment_size - state.current_size
    }

    /// Logical offset the next record will be written at.
    pub async fn current_offset(&self) -> u64 {
        self.state.lock().await.current_offset()
    }

    /// Epoch of the active segment.
    pub async fn epoch(&self) -> u64 {
        self.state.lock().await.epoch
    }

    /// Bytes written to the active segment.
    pub async fn current_size(&self) -> u64 {
        self.state.lock().await.current_size
    }

    /// Path of the active segment.
    pub async fn filename(&self) -> PathBuf {
        self.state.lock().await.segment.path().to_path_buf()
    }

    /// True once [`WriterNode::close`] has succeeded.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// The node's configuration.
    #[must_use]
    pub const fn config(&self) -> &WriterConfig {
        &self.config
    }
}

impl<S: Storage + 'static> Drop for WriterNode<S> {
    fn drop(&mut self) {
        self.flush_task.abort();
    }
}

impl<S: Storage + 'static> std::fmt::Debug for WriterNode<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterNode")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn open_segment<S: Storage + ?Sized>(
    storage: &S,
    config: &WriterConfig,
    epoch: u64,
) -> WalResult<(Segment, Option<SegmentIndexer>)> {
    let (path, index_path) = config.segment_path(epoch);
    let segment = Segment::open(storage, path.clone(), config.max_log_segment_size).await?;
    let Some(indexer_config) = config.indexer else {
        return Ok((segment, None));
    };

    match SegmentIndexer::open(storage, index_path, indexer_config).await {
        Ok(indexer) => Ok((segment, Some(indexer))),
        Err(e) => {
            // An empty segment left behind would collide with the next
            // attempt at this epoch.
            drop(segment);
            if let Err(remove_error) = storage.remove(&path).await {
                warn!(
                    path = %path.display(),
                    error = %remove_error,
                    "Failed to remove segment after index create failure"
                );
            }
            Err(e)
        }
    }
}

async fn flush_active(state: &mut WriterState, listener: &dyn SegmentListener) -> WalResult<()> {
    if state.segment.unflushed_bytes() == 0 {
        return Ok(());
    }
    state.segment.flush().await?;
    listener
        .on_size_change(state.segment.path(), state.epoch, state.current_size)
        .await;
    Ok(())
}

/// Flushes the active segment every `interval` until the node goes away.
fn spawn_flush_timer(
    state: Weak<Mutex<WriterState>>,
    listener: Arc<dyn SegmentListener>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let Some(state) = state.upgrade() else {
                break;
            };
            let mut guard = state.lock().await;
            if guard.closed {
                break;
            }
            if let Err(e) = flush_active(&mut guard, listener.as_ref()).await {
                warn!(
                    path = %guard.segment.path().display(),
                    error = %e,
                    "Periodic flush failed"
                );
            }
        }
    })
}
