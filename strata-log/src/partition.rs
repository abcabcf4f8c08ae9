//! One partition's log: a writer node plus the catalog of its segments.
//!
//! Opening a partition whose directory already holds segments recovers it:
//! the torn tail of the last segment is cut off, a trailing empty segment is
//! removed, and writing resumes at the end of the last segment in a new one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_routing::{Ntp, ReadReply, TopicType};
use strata_wal::naming::{
    extract_epoch, extract_partition, index_file_name, is_valid_partition_dir, SEGMENT_EXTENSION,
};
use strata_wal::{
    read_segment, recover_segment, Storage, WalError, WalRecord, WalResult, WriteReply, WriterNode,
};
use tracing::{info, warn};

use crate::catalog::SegmentCatalog;
use crate::config::{LogConfig, PartitionSpec};

/// The log of one (namespace, topic, partition).
pub struct PartitionLog<S: Storage + 'static> {
    ntp: Ntp,
    topic_type: TopicType,
    storage: Arc<S>,
    writer: WriterNode<S>,
    catalog: Arc<SegmentCatalog>,
}

impl<S: Storage + 'static> PartitionLog<S> {
    /// Opens the partition, recovering any segments already in its
    /// directory.
    ///
    /// # Errors
    /// Returns [`WalError::InvalidConfig`] if the directory name does not
    /// name the partition, or an error if recovery fails or the writer node
    /// cannot be opened.
    pub async fn open(storage: Arc<S>, spec: PartitionSpec, config: &LogConfig) -> WalResult<Self> {
        check_partition_dir(&spec)?;
        let ntp = Ntp::new(spec.ns, spec.topic, spec.partition);
        storage.create_dir_all(&spec.dir).await?;

        let catalog = Arc::new(SegmentCatalog::new());
        let epoch = recover(storage.as_ref(), &spec.dir, &catalog).await?;

        let writer_config = config.writer_config(&spec.dir, spec.topic_type, epoch);
        let writer = WriterNode::open(storage.clone(), writer_config, catalog.clone()).await?;

        info!(
            %ntp,
            dir = %spec.dir.display(),
            epoch,
            recovered_segments = catalog.len() - 1,
            "Opened partition"
        );

        Ok(Self {
            ntp,
            topic_type: spec.topic_type,
            storage,
            writer,
            catalog,
        })
    }

    /// Appends records contiguously.
    ///
    /// # Errors
    /// Propagates writer node failures.
    pub async fn append(&self, records: &[WalRecord]) -> WalResult<WriteReply> {
        self.writer.append_batch(records).await
    }

    /// Reads durable records starting at `offset`.
    ///
    /// Reads stay within one segment. An offset at the end of the log yields
    /// an empty reply whose `next_offset` is `offset`.
    ///
    /// # Errors
    /// Returns [`WalError::OffsetOutOfRange`] for offsets outside the durable
    /// log, or a decode/I/O error.
    pub async fn read(&self, offset: u64, max_bytes: u64) -> WalResult<ReadReply> {
        let first = self.catalog.first_offset();
        let end = self.catalog.end_offset();
        if offset < first || offset > end {
            return Err(WalError::OffsetOutOfRange {
                offset,
                first,
                last: end,
            });
        }

        let Some(mut segment) = self.catalog.locate(offset) else {
            return Ok(empty_reply(offset));
        };

        // An offset at the durable end of a rotated segment continues in the
        // next one.
        if offset >= segment.end_offset() {
            match self.catalog.next_after(segment.epoch) {
                Some(next) if next.epoch == offset => segment = next,
                _ => return Ok(empty_reply(offset)),
            }
        }

        let read = read_segment(
            self.storage.as_ref(),
            &segment.path,
            segment.epoch,
            segment.durable_size,
            offset,
            max_bytes,
        )
        .await?;

        Ok(ReadReply {
            next_offset: read.next_offset,
            bytes: read.bytes,
            records: read.records,
        })
    }

    /// Closes the writer node.
    ///
    /// # Errors
    /// Returns an error if the final flush fails.
    pub async fn close(&self) -> WalResult<()> {
        self.writer.close().await
    }

    /// The partition key.
    #[must_use]
    pub const fn ntp(&self) -> Ntp {
        self.ntp
    }

    /// Topic kind.
    #[must_use]
    pub const fn topic_type(&self) -> TopicType {
        self.topic_type
    }

    /// Offset the next append lands at.
    pub async fn current_offset(&self) -> u64 {
        self.writer.current_offset().await
    }

    /// The partition's segment catalog.
    #[must_use]
    pub fn catalog(&self) -> &SegmentCatalog {
        &self.catalog
    }
}

impl<S: Storage + 'static> std::fmt::Debug for PartitionLog<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionLog")
            .field("ntp", &self.ntp)
            .field("topic_type", &self.topic_type)
            .field("segments", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

const fn empty_reply(offset: u64) -> ReadReply {
    ReadReply {
        next_offset: offset,
        bytes: 0,
        records: Vec::new(),
    }
}

fn check_partition_dir(spec: &PartitionSpec) -> WalResult<()> {
    let name = spec
        .dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let partition = extract_partition(name).map(u64::from);
    if is_valid_partition_dir(name) && partition == Some(spec.partition.get()) {
        return Ok(());
    }
    Err(WalError::InvalidConfig {
        reason: format!(
            "directory {} does not hold partition {}",
            spec.dir.display(),
            spec.partition
        ),
    })
}

/// Loads existing segments into the catalog and returns the epoch to resume
/// writing at.
async fn recover<S: Storage + ?Sized>(
    storage: &S,
    dir: &Path,
    catalog: &SegmentCatalog,
) -> WalResult<u64> {
    let mut segments: Vec<(u64, PathBuf)> = storage
        .list_files(dir, SEGMENT_EXTENSION)
        .await?
        .into_iter()
        .filter_map(|path| {
            let epoch = path.file_name()?.to_str().and_then(extract_epoch)?;
            Some((epoch, path))
        })
        .collect();
    segments.sort_by_key(|(epoch, _)| *epoch);

    let Some((last_epoch, last_path)) = segments.pop() else {
        return Ok(0);
    };

    for (epoch, path) in segments {
        let size = storage.open(&path).await?.size().await?;
        catalog.insert(epoch, path, size);
    }

    let last_size = recover_segment(storage, &last_path).await?;
    if last_size == 0 {
        // Nothing was ever flushed to it; its epoch is where writing resumes.
        warn!(path = %last_path.display(), "Removing empty trailing segment");
        storage.remove(&last_path).await?;
        if let Some(name) = last_path.file_name().and_then(|n| n.to_str()) {
            let index_path = last_path.with_file_name(index_file_name(name));
            if storage.exists(&index_path).await? {
                storage.remove(&index_path).await?;
            }
        }
        return Ok(last_epoch);
    }

    catalog.insert(last_epoch, last_path, last_size);
    Ok(last_epoch + last_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{NamespaceId, PartitionId, TopicId};
    use strata_wal::SimulatedStorage;

    const DIR: &str = "/data/ns/orders/0";

    fn spec(topic_type: TopicType) -> PartitionSpec {
        PartitionSpec {
            ns: NamespaceId::new(1),
            topic: TopicId::new(2),
            partition: PartitionId::new(0),
            topic_type,
            dir: PathBuf::from(DIR),
        }
    }

    fn config() -> LogConfig {
        LogConfig::new("/data").with_max_log_segment_size(4096)
    }

    fn record(value_len: usize) -> WalRecord {
        WalRecord::new("key", vec![b'v'; value_len]).unwrap()
    }

    async fn open(storage: &SimulatedStorage) -> PartitionLog<SimulatedStorage> {
        PartitionLog::open(Arc::new(storage.clone()), spec(TopicType::Regular), &config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_then_read() {
        let storage = SimulatedStorage::new(5);
        let log = open(&storage).await;

        let reply = log.append(&[record(10), record(20)]).await.unwrap();
        assert_eq!(reply.offset, 0);

        let read = log.read(0, 1 << 20).await.unwrap();
        assert_eq!(read.records.len(), 2);
        assert_eq!(read.next_offset, reply.size);
        assert_eq!(read.bytes, reply.size);

        let tail = log.read(read.next_offset, 1 << 20).await.unwrap();
        assert!(tail.records.is_empty());
        assert_eq!(tail.next_offset, read.next_offset);
    }

    #[tokio::test]
    async fn test_read_crosses_rotated_segments() {
        let storage = SimulatedStorage::new(5);
        let log = open(&storage).await;

        // 1000-byte records: four per 4096-byte segment.
        let records: Vec<_> = (0..10).map(|_| record(1000 - 16 - 3)).collect();
        log.append(&records).await.unwrap();
        assert_eq!(log.catalog().len(), 3);

        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let read = log.read(cursor, 1 << 20).await.unwrap();
            if read.records.is_empty() {
                break;
            }
            for r in &read.records {
                assert_eq!(r.offset, cursor);
                cursor += r.record.encoded_size();
                seen += 1;
            }
            assert_eq!(read.next_offset, cursor);
        }
        assert_eq!(seen, 10);
        assert_eq!(cursor, 10_000);
    }

    #[tokio::test]
    async fn test_read_out_of_range() {
        let storage = SimulatedStorage::new(5);
        let log = open(&storage).await;
        log.append(&[record(10)]).await.unwrap();

        let result = log.read(1_000_000, 1024).await;
        assert!(matches!(result, Err(WalError::OffsetOutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_recovery_resumes_after_last_segment() {
        let storage = SimulatedStorage::new(5);
        let log = open(&storage).await;
        let reply = log.append(&[record(100), record(100)]).await.unwrap();
        log.close().await.unwrap();
        drop(log);

        let reopened = open(&storage).await;
        assert_eq!(reopened.current_offset().await, reply.size);

        // Old data is still readable, new data lands after it.
        let old = reopened.read(0, 1 << 20).await.unwrap();
        assert_eq!(old.records.len(), 2);

        let next = reopened.append(&[record(5)]).await.unwrap();
        assert_eq!(next.offset, reply.size);
        let new = reopened.read(next.offset, 1 << 20).await.unwrap();
        assert_eq!(new.records.len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_removes_empty_trailing_segment() {
        let storage = SimulatedStorage::new(5);
        let log = open(&storage).await;
        log.close().await.unwrap();
        drop(log);

        // The empty segment-0.wal is removed and recreated instead of
        // colliding.
        let reopened = open(&storage).await;
        assert_eq!(reopened.current_offset().await, 0);
        assert_eq!(reopened.catalog().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_truncates_torn_tail() {
        let storage = SimulatedStorage::new(5);
        let log = open(&storage).await;
        let first = log.append(&[record(10)]).await.unwrap();
        log.append(&[record(10)]).await.unwrap();
        log.close().await.unwrap();
        drop(log);

        let path = Path::new(DIR).join("segment-0.wal");
        let mut content = storage.get_raw_content(&path).unwrap();
        content.truncate(content.len() - 3);
        storage.set_raw_content(&path, content);

        let reopened = open(&storage).await;
        assert_eq!(reopened.current_offset().await, first.size);
    }

    #[tokio::test]
    async fn test_open_rejects_mismatched_partition_dir() {
        let storage = Arc::new(SimulatedStorage::new(5));
        for dir in ["/data/ns/orders/7", "/data/ns/orders/latest", "/"] {
            let spec = PartitionSpec {
                dir: PathBuf::from(dir),
                ..spec(TopicType::Regular)
            };
            let result = PartitionLog::open(storage.clone(), spec, &config()).await;
            assert!(
                matches!(result, Err(WalError::InvalidConfig { .. })),
                "{dir} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_compaction_partition_writes_index() {
        let storage = SimulatedStorage::new(5);
        let log = PartitionLog::open(
            Arc::new(storage.clone()),
            spec(TopicType::Compaction),
            &config(),
        )
        .await
        .unwrap();

        log.append(&[record(10)]).await.unwrap();
        log.close().await.unwrap();

        let index = Path::new(DIR).join("segment-0.wal.index");
        assert!(!storage.get_raw_content(&index).unwrap().is_empty());
    }
}
