//! System limits and configuration bounds.
//!
//! Put limits on everything. Every queue, buffer, and resource has an
//! explicit maximum size. This prevents unbounded growth and makes the system
//! predictable.

/// System-wide limits for Strata.
///
/// All limits are explicit and configurable. Default values are chosen to be
/// safe for most deployments while allowing customization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Record limits.
    /// Maximum encoded size of a single record in bytes.
    pub max_record_bytes: u32,
    /// Maximum number of records in one partition put.
    pub max_records_per_put: u32,
    /// Maximum number of bytes a single read may request.
    pub max_read_bytes: u32,

    // Storage limits.
    /// Maximum size of a log segment in bytes before rotation.
    pub max_log_segment_size: u64,
    /// Memory budget for the keys a segment indexer holds before flushing.
    pub max_partial_index_keys_bytes: u64,
    /// Interval of the writer node's periodic flush, in microseconds.
    pub flush_interval_us: u64,

    // Topology limits.
    /// Maximum number of execution shards.
    pub max_shards: u32,
    /// Maximum number of partitions per topic.
    pub max_partitions_per_topic: u32,
    /// Capacity of each shard's command channel.
    pub shard_channel_capacity: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Records: 1MB record, 10k records per put, 16MB reads.
            max_record_bytes: 1024 * 1024,
            max_records_per_put: 10_000,
            max_read_bytes: 16 * 1024 * 1024,

            // Storage: 64MB segments, 32MB partial index, 1s flush timer.
            max_log_segment_size: 64 * 1024 * 1024,
            max_partial_index_keys_bytes: 1 << 25,
            flush_interval_us: 1_000_000,

            // Topology: 1024 shards, 65536 partitions, 1024 queued commands.
            max_shards: 1024,
            max_partitions_per_topic: 65_536,
            shard_channel_capacity: 1024,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limits are invalid or inconsistent.
    pub const fn validate(&self) -> crate::Result<()> {
        if self.max_record_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_record_bytes",
                reason: "must be positive",
            });
        }

        // A segment must be able to hold at least one maximal record.
        if self.max_log_segment_size < self.max_record_bytes as u64 {
            return Err(crate::Error::InvalidArgument {
                name: "max_log_segment_size",
                reason: "must be >= max_record_bytes",
            });
        }

        if self.max_partial_index_keys_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_partial_index_keys_bytes",
                reason: "must be positive",
            });
        }

        if self.max_shards == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_shards",
                reason: "must be positive",
            });
        }

        if self.max_partitions_per_topic == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_partitions_per_topic",
                reason: "must be positive",
            });
        }

        if self.shard_channel_capacity == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "shard_channel_capacity",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
