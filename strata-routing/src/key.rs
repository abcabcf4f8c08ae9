//! Composite partition key.

use std::fmt;

use strata_core::{NamespaceId, PartitionId, ShardId, TopicId};

use crate::hash::{jump_consistent_hash, xxhash64};

/// Namespace, topic and partition: the address of one partition log.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ntp {
    /// Namespace id.
    pub ns: NamespaceId,
    /// Topic id.
    pub topic: TopicId,
    /// Partition number.
    pub partition: PartitionId,
}

impl Ntp {
    /// Creates a partition key.
    #[must_use]
    pub const fn new(ns: NamespaceId, topic: TopicId, partition: PartitionId) -> Self {
        Self {
            ns,
            topic,
            partition,
        }
    }

    /// 64-bit id: xxHash-64 of the little-endian namespace, topic and
    /// partition ids.
    #[must_use]
    pub fn id(&self) -> u64 {
        let mut buf = [0u8; 24];
        buf[..8].copy_from_slice(&self.ns.get().to_le_bytes());
        buf[8..16].copy_from_slice(&self.topic.get().to_le_bytes());
        buf[16..].copy_from_slice(&self.partition.get().to_le_bytes());
        xxhash64(&buf)
    }

    /// Shard owning this partition among `shard_count` shards.
    ///
    /// # Panics
    /// Panics if `shard_count` is zero.
    #[must_use]
    pub fn shard(&self, shard_count: u32) -> ShardId {
        ShardId::new(u64::from(jump_consistent_hash(self.id(), shard_count)))
    }
}

impl fmt::Debug for Ntp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ntp({}/{}/{})", self.ns.get(), self.topic.get(), self.partition.get())
    }
}

impl fmt::Display for Ntp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.ns, self.topic, self.partition)
    }
}
