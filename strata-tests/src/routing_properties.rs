//! Property tests for core assignment over random partition keys.

#![allow(clippy::cast_precision_loss)] // Fractions over small counts.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_core::{Limits, NamespaceId, PartitionId, TopicId};
use strata_routing::{CoreAssignment, Ntp, PutRequest};
use strata_wal::WalRecord;

fn random_ntps(rng: &mut StdRng, count: usize) -> Vec<Ntp> {
    (0..count)
        .map(|_| {
            Ntp::new(
                NamespaceId::new(rng.gen()),
                TopicId::new(rng.gen()),
                PartitionId::new(rng.gen_range(0..65_536)),
            )
        })
        .collect()
}

#[test]
fn test_adding_a_shard_only_moves_keys_to_it() {
    let limits = Limits::new();
    let mut rng = StdRng::seed_from_u64(2024);
    let ntps = random_ntps(&mut rng, 20_000);

    for shards in 1..24u32 {
        let before = CoreAssignment::new(shards, &limits).unwrap();
        let after = CoreAssignment::new(shards + 1, &limits).unwrap();

        let mut moved = 0usize;
        for ntp in &ntps {
            let (old, new) = (before.shard_for(ntp), after.shard_for(ntp));
            assert!(new.get() < u64::from(shards + 1));
            if old != new {
                assert_eq!(new.get(), u64::from(shards), "{ntp} moved between old shards");
                moved += 1;
            }
        }

        let fraction = moved as f64 / ntps.len() as f64;
        let ideal = 1.0 / f64::from(shards + 1);
        assert!(
            fraction <= ideal + 0.02,
            "{shards} -> {}: moved {fraction:.3}, ideal {ideal:.3}",
            shards + 1
        );
    }
}

#[test]
fn test_put_split_covers_each_partition_once() {
    let limits = Limits::new();
    let mut rng = StdRng::seed_from_u64(9);

    for _ in 0..50 {
        let shards = rng.gen_range(1..=16);
        let assignment = CoreAssignment::new(shards, &limits).unwrap();
        let (ns, topic) = (NamespaceId::new(rng.gen()), TopicId::new(rng.gen()));

        let partitions: Vec<u64> = (0..rng.gen_range(1..64))
            .map(|_| rng.gen_range(0..1024))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let request = partitions.iter().fold(PutRequest::new(ns, topic), |put, &p| {
            put.with_partition(
                PartitionId::new(p),
                vec![WalRecord::new("k", "v").unwrap()],
            )
        });

        let split = assignment.put(request);

        // Shards are distinct and ascending.
        assert!(split.windows(2).all(|w| w[0].shard < w[1].shard));

        let mut seen = BTreeSet::new();
        for shard_put in &split {
            for put in &shard_put.puts {
                let ntp = Ntp::new(ns, topic, put.partition);
                assert_eq!(assignment.shard_for(&ntp), shard_put.shard);
                assert!(seen.insert(put.partition.get()), "partition routed twice");
            }
            // Request order survives within a shard.
            assert!(shard_put
                .puts
                .windows(2)
                .all(|w| w[0].partition < w[1].partition));
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), partitions);
    }
}
