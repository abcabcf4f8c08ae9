//! Requests and replies of the log service.
//!
//! Clients address topics by name when creating them and by id afterwards.
//! Ids are the xxHash-64 of the names, so any client can derive them.

use std::collections::BTreeMap;

use strata_core::{Limits, NamespaceId, PartitionId, ShardId, TopicId};
use strata_wal::naming::is_valid_ns_topic_name;
use strata_wal::{ReadRecord, WalRecord, WriteReply};

use crate::error::RoutingError;
use crate::hash::xxhash64;
use crate::key::Ntp;

/// Kind of topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TopicType {
    /// Plain append-only log.
    #[default]
    Regular,
    /// Log whose segments are key-indexed for compaction.
    Compaction,
}

/// Request to create a topic with `partitions` partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Namespace name.
    pub namespace: String,
    /// Topic name.
    pub topic: String,
    /// Number of partitions, numbered `0..partitions`.
    pub partitions: u32,
    /// Topic kind.
    pub topic_type: TopicType,
    /// Free-form topic properties.
    pub properties: BTreeMap<String, String>,
}

impl CreateRequest {
    /// Creates a request for a regular topic.
    #[must_use]
    pub fn new(namespace: impl Into<String>, topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            namespace: namespace.into(),
            topic: topic.into(),
            partitions,
            topic_type: TopicType::Regular,
            properties: BTreeMap::new(),
        }
    }

    /// Sets the topic type.
    #[must_use]
    pub fn with_topic_type(mut self, topic_type: TopicType) -> Self {
        self.topic_type = topic_type;
        self
    }

    /// Adds a topic property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Id of the namespace.
    #[must_use]
    pub fn ns_id(&self) -> NamespaceId {
        NamespaceId::new(xxhash64(self.namespace.as_bytes()))
    }

    /// Id of the topic.
    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        TopicId::new(xxhash64(self.topic.as_bytes()))
    }

    /// Validates names and partition count.
    ///
    /// # Errors
    /// Returns an error if a name is not a valid directory name or the
    /// partition count is zero or above the limit.
    pub fn validate(&self, limits: &Limits) -> Result<(), RoutingError> {
        for name in [&self.namespace, &self.topic] {
            if !is_valid_ns_topic_name(name) {
                return Err(RoutingError::InvalidName { name: name.clone() });
            }
        }
        if self.partitions == 0 || self.partitions > limits.max_partitions_per_topic {
            return Err(RoutingError::InvalidPartitionCount {
                count: self.partitions,
                max: limits.max_partitions_per_topic,
            });
        }
        Ok(())
    }
}

/// The part of a create request one shard executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardCreate {
    /// Target shard.
    pub shard: ShardId,
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Namespace name, for the directory layout.
    pub namespace_name: String,
    /// Topic name, for the directory layout.
    pub topic_name: String,
    /// Topic kind.
    pub topic_type: TopicType,
    /// Partitions this shard owns, ascending.
    pub partitions: Vec<PartitionId>,
}

/// Partitions created, grouped by owning shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateReply {
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Shard → partitions it created.
    pub partitions: BTreeMap<ShardId, Vec<PartitionId>>,
}

/// Records destined for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPut {
    /// Target partition.
    pub partition: PartitionId,
    /// Records, appended in order.
    pub records: Vec<WalRecord>,
}

/// Request to append records to partitions of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Per-partition records.
    pub puts: Vec<PartitionPut>,
}

impl PutRequest {
    /// Creates an empty put request.
    #[must_use]
    pub const fn new(ns: NamespaceId, topic: TopicId) -> Self {
        Self {
            ns,
            topic,
            puts: Vec::new(),
        }
    }

    /// Adds records for a partition.
    #[must_use]
    pub fn with_partition(mut self, partition: PartitionId, records: Vec<WalRecord>) -> Self {
        self.puts.push(PartitionPut { partition, records });
        self
    }

    /// Total number of records across partitions.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.puts.iter().map(|p| p.records.len()).sum()
    }
}

/// The part of a put request one shard executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPut {
    /// Target shard.
    pub shard: ShardId,
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Puts for partitions this shard owns, in request order.
    pub puts: Vec<PartitionPut>,
}

/// Outcome of one partition's put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionWriteReply {
    /// Partition written.
    pub partition: PartitionId,
    /// Offset and size of the appended bytes.
    pub reply: WriteReply,
}

/// Outcome of a put request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReply {
    /// One reply per partition put.
    pub replies: Vec<PartitionWriteReply>,
}

/// Request to read one partition from `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetRequest {
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Partition to read.
    pub partition: PartitionId,
    /// Offset of the first record to return.
    pub offset: u64,
    /// Soft byte limit; at least one record is returned when available.
    pub max_bytes: u64,
}

impl GetRequest {
    /// Partition key of the request.
    #[must_use]
    pub const fn ntp(&self) -> Ntp {
        Ntp::new(self.ns, self.topic, self.partition)
    }
}

/// A get request routed to its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardGet {
    /// Target shard.
    pub shard: ShardId,
    /// The request.
    pub request: GetRequest,
}

/// Records read from a partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReply {
    /// Offset to continue reading from.
    pub next_offset: u64,
    /// Encoded bytes returned.
    pub bytes: u64,
    /// Records with their offsets.
    pub records: Vec<ReadRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_hash_names() {
        let request = CreateRequest::new("ns", "orders", 4);
        assert_eq!(request.ns_id().get(), xxhash64(b"ns"));
        assert_eq!(request.topic_id().get(), xxhash64(b"orders"));
    }

    #[test]
    fn test_validate() {
        let limits = Limits::new();
        assert!(CreateRequest::new("ns", "orders", 4).validate(&limits).is_ok());
        assert!(matches!(
            CreateRequest::new("ns", "orders", 0).validate(&limits),
            Err(RoutingError::InvalidPartitionCount { .. })
        ));
        assert!(matches!(
            CreateRequest::new("ns", "a.b", 1).validate(&limits),
            Err(RoutingError::InvalidName { .. })
        ));
        assert!(matches!(
            CreateRequest::new("../etc", "t", 1).validate(&limits),
            Err(RoutingError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_put_request_builder() {
        let record = WalRecord::new("k", "v").unwrap();
        let request = PutRequest::new(NamespaceId::new(1), TopicId::new(2))
            .with_partition(PartitionId::new(0), vec![record.clone(), record.clone()])
            .with_partition(PartitionId::new(1), vec![record]);
        assert_eq!(request.puts.len(), 2);
        assert_eq!(request.record_count(), 3);
    }
}
