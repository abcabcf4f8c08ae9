//! Workload driver configuration.

use std::collections::BTreeMap;

use strata_routing::TopicType;
use strata_wal::CompressionType;

use crate::error::{WorkloadError, WorkloadResult};

/// Configuration of a [`crate::Smash`] run.
#[derive(Debug, Clone)]
pub struct SmashConfig {
    /// Namespace of the topic under test.
    pub namespace: String,
    /// Topic under test.
    pub topic: String,
    /// Partition count of the topic.
    pub partitions: u32,
    /// Topic kind.
    pub topic_type: TopicType,
    /// Topic properties sent with the create request.
    pub properties: BTreeMap<String, String>,
    /// Records per partition in each write.
    pub write_batch_size: usize,
    /// Length of each random alphanumeric key.
    pub key_bytes: usize,
    /// Length of each random alphanumeric value.
    pub value_bytes: usize,
    /// Codec tagged on values at least `compression_threshold` bytes long.
    pub compression: CompressionType,
    /// Value length from which `compression` applies.
    pub compression_threshold: usize,
    /// `max_bytes` of every read.
    pub max_read_bytes: u64,
    /// Seed of the record generator.
    pub seed: u64,
}

impl SmashConfig {
    /// Creates a configuration for one topic with small defaults.
    #[must_use]
    pub fn new(namespace: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            topic: topic.into(),
            partitions: 16,
            topic_type: TopicType::Regular,
            properties: BTreeMap::new(),
            write_batch_size: 1,
            key_bytes: 20,
            value_bytes: 100,
            compression: CompressionType::None,
            compression_threshold: 512,
            max_read_bytes: 64 * 1024,
            seed: 0,
        }
    }

    /// Sets the partition count.
    #[must_use]
    pub const fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }

    /// Sets the topic kind.
    #[must_use]
    pub const fn with_topic_type(mut self, topic_type: TopicType) -> Self {
        self.topic_type = topic_type;
        self
    }

    /// Adds a topic property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the records per partition in each write.
    #[must_use]
    pub const fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size;
        self
    }

    /// Sets the random key and value lengths.
    #[must_use]
    pub const fn with_record_bytes(mut self, key_bytes: usize, value_bytes: usize) -> Self {
        self.key_bytes = key_bytes;
        self.value_bytes = value_bytes;
        self
    }

    /// Tags values of at least `threshold` bytes with `compression`.
    #[must_use]
    pub const fn with_compression(mut self, compression: CompressionType, threshold: usize) -> Self {
        self.compression = compression;
        self.compression_threshold = threshold;
        self
    }

    /// Sets the `max_bytes` of every read.
    #[must_use]
    pub const fn with_max_read_bytes(mut self, max_read_bytes: u64) -> Self {
        self.max_read_bytes = max_read_bytes;
        self
    }

    /// Sets the generator seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`WorkloadError::InvalidConfig`] on a zero partition count,
    /// batch size or read size.
    pub const fn validate(&self) -> WorkloadResult<()> {
        if self.partitions == 0 {
            return Err(WorkloadError::InvalidConfig {
                reason: "partitions must be positive",
            });
        }
        if self.write_batch_size == 0 {
            return Err(WorkloadError::InvalidConfig {
                reason: "write_batch_size must be positive",
            });
        }
        if self.max_read_bytes == 0 {
            return Err(WorkloadError::InvalidConfig {
                reason: "max_read_bytes must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SmashConfig::new("ns", "t").validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let zero_partitions = SmashConfig::new("ns", "t").with_partitions(0);
        assert!(zero_partitions.validate().is_err());

        let zero_batch = SmashConfig::new("ns", "t").with_write_batch_size(0);
        assert!(zero_batch.validate().is_err());

        let zero_read = SmashConfig::new("ns", "t").with_max_read_bytes(0);
        assert!(zero_read.validate().is_err());
    }
}
