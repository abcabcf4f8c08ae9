//! Log service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use strata_core::{Limits, NamespaceId, PartitionId, TopicId};
use strata_routing::TopicType;
use strata_wal::naming::DEFAULT_SEGMENT_PREFIX;
use strata_wal::{IndexerConfig, WriterConfig};

use crate::error::{LogError, LogResult};

/// Configuration of a [`crate::WriteAheadLog`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Root of the on-disk layout.
    pub data_dir: PathBuf,
    /// Number of shard actors.
    pub shard_count: u32,
    /// Segment file name prefix.
    pub segment_prefix: String,
    /// Index settings for compaction topics.
    pub indexer: IndexerConfig,
    /// System limits. Segment size, flush interval and queue depths come
    /// from here.
    pub limits: Limits,
}

impl LogConfig {
    /// Creates a configuration with default limits and one shard per
    /// available CPU.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let shard_count = std::thread::available_parallelism()
            .map_or(1, |n| u32::try_from(n.get()).unwrap_or(1));
        Self {
            data_dir: data_dir.into(),
            shard_count,
            segment_prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            indexer: IndexerConfig::new(),
            limits: Limits::new(),
        }
    }

    /// Sets the number of shards.
    #[must_use]
    pub const fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Sets the segment capacity.
    #[must_use]
    pub const fn with_max_log_segment_size(mut self, size: u64) -> Self {
        self.limits.max_log_segment_size = size;
        self
    }

    /// Sets the background flush interval.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Intervals beyond u64 microseconds are not meaningful.
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.limits.flush_interval_us = interval.as_micros() as u64;
        self
    }

    /// Sets the index settings for compaction topics.
    #[must_use]
    pub const fn with_indexer(mut self, indexer: IndexerConfig) -> Self {
        self.indexer = indexer;
        self
    }

    /// Replaces the limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the limits are inconsistent, the shard count is
    /// out of range, or the writer settings are invalid.
    pub fn validate(&self) -> LogResult<()> {
        self.limits.validate()?;
        strata_core::Error::check_limit(
            "shard_count",
            u64::from(self.limits.max_shards),
            u64::from(self.shard_count),
        )?;
        self.writer_config(Path::new(""), TopicType::Compaction, 0)
            .validate()
            .map_err(LogError::from)
    }

    /// Directory of one partition.
    #[must_use]
    pub fn partition_dir(&self, namespace: &str, topic: &str, partition: PartitionId) -> PathBuf {
        self.data_dir
            .join(namespace)
            .join(topic)
            .join(partition.get().to_string())
    }

    /// Writer node configuration for a partition directory.
    #[must_use]
    pub fn writer_config(&self, dir: &Path, topic_type: TopicType, epoch: u64) -> WriterConfig {
        let config = WriterConfig::new(dir)
            .with_prefix(self.segment_prefix.clone())
            .with_max_log_segment_size(self.limits.max_log_segment_size)
            .with_flush_interval(Duration::from_micros(self.limits.flush_interval_us))
            .with_epoch(epoch);
        match topic_type {
            TopicType::Compaction => config.with_indexer(
                self.indexer
                    .with_memory_budget(self.limits.max_partial_index_keys_bytes),
            ),
            TopicType::Regular => config,
        }
    }
}

/// Identity and kind of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Partition number.
    pub partition: PartitionId,
    /// Topic kind.
    pub topic_type: TopicType,
    /// Directory holding the partition's segments.
    pub dir: PathBuf,
}
