//! Core assignment: which shard owns which partition.
//!
//! Ownership is a pure function of the partition key and the shard count,
//! recomputed on every lookup. Nothing is cached, so there is nothing to keep
//! consistent.

use std::collections::BTreeMap;

use strata_core::{Limits, PartitionId, ShardId};

use crate::error::RoutingError;
use crate::key::Ntp;
use crate::request::{CreateRequest, GetRequest, PartitionPut, PutRequest, ShardCreate, ShardGet, ShardPut};

/// Routes requests to the shards owning their partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAssignment {
    shard_count: u32,
}

impl CoreAssignment {
    /// Creates a router over `shard_count` shards.
    ///
    /// # Errors
    /// Returns an error if `shard_count` is zero or above `limits.max_shards`.
    pub const fn new(shard_count: u32, limits: &Limits) -> Result<Self, RoutingError> {
        if shard_count == 0 || shard_count > limits.max_shards {
            return Err(RoutingError::InvalidShardCount {
                count: shard_count,
                max: limits.max_shards,
            });
        }
        Ok(Self { shard_count })
    }

    /// Number of shards.
    #[must_use]
    pub const fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Shard owning `ntp`.
    #[must_use]
    pub fn shard_for(&self, ntp: &Ntp) -> ShardId {
        ntp.shard(self.shard_count)
    }

    /// Splits a put request into one sub-request per owning shard.
    ///
    /// Sub-requests come out ordered by shard id; within a shard the
    /// partition puts keep their request order.
    #[must_use]
    pub fn put(&self, request: PutRequest) -> Vec<ShardPut> {
        let PutRequest { ns, topic, puts } = request;

        let mut by_shard: BTreeMap<ShardId, Vec<PartitionPut>> = BTreeMap::new();
        for put in puts {
            let shard = self.shard_for(&Ntp::new(ns, topic, put.partition));
            by_shard.entry(shard).or_default().push(put);
        }

        by_shard
            .into_iter()
            .map(|(shard, puts)| ShardPut {
                shard,
                ns,
                topic,
                puts,
            })
            .collect()
    }

    /// Routes a get request to its shard.
    #[must_use]
    pub fn get(&self, request: GetRequest) -> ShardGet {
        ShardGet {
            shard: self.shard_for(&request.ntp()),
            request,
        }
    }

    /// Splits a create request into one sub-request per shard that owns at
    /// least one of the new partitions.
    #[must_use]
    pub fn create(&self, request: &CreateRequest) -> Vec<ShardCreate> {
        let ns = request.ns_id();
        let topic = request.topic_id();

        let mut by_shard: BTreeMap<ShardId, Vec<PartitionId>> = BTreeMap::new();
        for partition in 0..request.partitions {
            let partition = PartitionId::new(u64::from(partition));
            let shard = self.shard_for(&Ntp::new(ns, topic, partition));
            by_shard.entry(shard).or_default().push(partition);
        }

        by_shard
            .into_iter()
            .map(|(shard, partitions)| ShardCreate {
                shard,
                ns,
                topic,
                namespace_name: request.namespace.clone(),
                topic_name: request.topic.clone(),
                topic_type: request.topic_type,
                partitions,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{NamespaceId, TopicId};
    use strata_wal::WalRecord;

    fn router(shards: u32) -> CoreAssignment {
        CoreAssignment::new(shards, &Limits::new()).unwrap()
    }

    fn put_request(partitions: u64) -> PutRequest {
        let record = WalRecord::new("k", "v").unwrap();
        (0..partitions).fold(
            PutRequest::new(NamespaceId::new(10), TopicId::new(20)),
            |request, p| request.with_partition(PartitionId::new(p), vec![record.clone()]),
        )
    }

    #[test]
    fn test_rejects_invalid_shard_count() {
        let limits = Limits::new();
        assert!(CoreAssignment::new(0, &limits).is_err());
        assert!(CoreAssignment::new(limits.max_shards + 1, &limits).is_err());
        assert!(CoreAssignment::new(limits.max_shards, &limits).is_ok());
    }

    #[test]
    fn test_put_groups_every_partition_once() {
        let assignment = router(4);
        let shard_puts = assignment.put(put_request(64));

        let mut seen: Vec<u64> = shard_puts
            .iter()
            .flat_map(|sp| sp.puts.iter().map(|p| p.partition.get()))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());

        // One sub-request per shard, ordered by shard, each owning its puts.
        let shards: Vec<_> = shard_puts.iter().map(|sp| sp.shard).collect();
        let mut sorted = shards.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(shards, sorted);
        assert!(shards.len() >= 2);

        for shard_put in &shard_puts {
            for put in &shard_put.puts {
                let ntp = Ntp::new(shard_put.ns, shard_put.topic, put.partition);
                assert_eq!(assignment.shard_for(&ntp), shard_put.shard);
            }
            // Request order preserved within a shard.
            let partitions: Vec<_> = shard_put.puts.iter().map(|p| p.partition).collect();
            let mut ordered = partitions.clone();
            ordered.sort();
            assert_eq!(partitions, ordered);
        }
    }

    #[test]
    fn test_put_is_deterministic() {
        let assignment = router(8);
        assert_eq!(assignment.put(put_request(16)), assignment.put(put_request(16)));
    }

    #[test]
    fn test_single_shard_gets_everything() {
        let shard_puts = router(1).put(put_request(5));
        assert_eq!(shard_puts.len(), 1);
        assert_eq!(shard_puts[0].shard, ShardId::new(0));
        assert_eq!(shard_puts[0].puts.len(), 5);
    }

    #[test]
    fn test_get_matches_put_routing() {
        let assignment = router(6);
        for partition in 0..32 {
            let request = GetRequest {
                ns: NamespaceId::new(10),
                topic: TopicId::new(20),
                partition: PartitionId::new(partition),
                offset: 0,
                max_bytes: 1024,
            };
            let routed = assignment.get(request);
            assert_eq!(routed.shard, assignment.shard_for(&request.ntp()));
            assert!(routed.shard.get() < 6);
        }
    }

    #[test]
    fn test_create_covers_all_partitions() {
        let assignment = router(4);
        let request = CreateRequest::new("ns", "orders", 32);
        let creates = assignment.create(&request);

        let total: usize = creates.iter().map(|c| c.partitions.len()).sum();
        assert_eq!(total, 32);
        for create in &creates {
            assert_eq!(create.ns, request.ns_id());
            assert_eq!(create.topic_name, "orders");
            for partition in &create.partitions {
                let ntp = Ntp::new(create.ns, create.topic, *partition);
                assert_eq!(assignment.shard_for(&ntp), create.shard);
            }
        }
    }
}
