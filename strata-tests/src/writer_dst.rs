//! Writer node simulation tests.
//!
//! Random record streams are written through a writer node over
//! `SimulatedStorage`, and the notifications it emits are checked against a
//! model of the segment chain.
//!
//! # Test Categories
//!
//! 1. **Rotation**: exactly one rotation per overflowing record
//! 2. **Fsync Failures**: failures surface and withhold size notifications
//! 3. **Torn Writes**: recovery cuts the torn record and resumes after it

#![allow(clippy::cast_possible_truncation)] // Test sizes are small.
#![allow(clippy::unreadable_literal)] // Seeds are fine without separators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_core::{NamespaceId, PartitionId, TopicId};
use strata_log::{LogConfig, PartitionLog, PartitionSpec};
use strata_routing::TopicType;
use strata_wal::{
    FaultConfig, SimulatedStorage, WalError, WalRecord, WriterConfig, WriterNode,
    RECORD_HEADER_SIZE,
};

use crate::properties::{check_segment_chain, SegmentEvent, SegmentRecorder};

const CAPACITY: u64 = 4096;
const DIR: &str = "/sim/ns/topic/0";

fn config() -> WriterConfig {
    WriterConfig::new(DIR)
        .with_max_log_segment_size(CAPACITY)
        // Long enough that the timer never fires during a test.
        .with_flush_interval(Duration::from_secs(3600))
}

fn random_record(rng: &mut StdRng) -> WalRecord {
    let key_len = rng.gen_range(1..16);
    let value_len = rng.gen_range(0..2000);
    let key: Vec<u8> = (0..key_len).map(|_| rng.gen_range(b'a'..=b'z')).collect();
    WalRecord::new(key, vec![0xAB; value_len]).unwrap()
}

async fn open(
    storage: &SimulatedStorage,
) -> (WriterNode<SimulatedStorage>, Arc<SegmentRecorder>) {
    let recorder = Arc::new(SegmentRecorder::new());
    let node = WriterNode::open(Arc::new(storage.clone()), config(), recorder.clone())
        .await
        .unwrap();
    (node, recorder)
}

/// End offset of the last announced size.
fn announced_end(recorder: &SegmentRecorder) -> u64 {
    recorder
        .events()
        .iter()
        .rev()
        .find_map(|e| match e {
            SegmentEvent::Size { epoch, size } => Some(epoch + size),
            SegmentEvent::Created { .. } => None,
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn test_dst_writer_one_rotation_per_overflow() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let storage = SimulatedStorage::new(seed);
        let (node, recorder) = open(&storage).await;

        // Model: offset and size of the active segment.
        let mut offset = 0u64;
        let mut size = 0u64;
        let mut expected_epochs = vec![0u64];

        for _ in 0..100 {
            let batch: Vec<_> = (0..rng.gen_range(1..5))
                .map(|_| random_record(&mut rng))
                .collect();

            let reply = node.append_batch(&batch).await.unwrap();
            assert_eq!(reply.offset, offset, "seed {seed}: batch offset");

            for record in &batch {
                let len = record.encoded_size();
                if CAPACITY - size < len {
                    expected_epochs.push(offset);
                    size = 0;
                }
                size += len;
                offset += len;
            }
            assert_eq!(node.current_offset().await, offset, "seed {seed}");
            assert_eq!(node.current_size().await, size, "seed {seed}");
        }

        assert_eq!(recorder.epochs(), expected_epochs, "seed {seed}: rotations");
        let violations = check_segment_chain(&recorder.events(), CAPACITY);
        assert!(violations.is_empty(), "seed {seed}: {violations:?}");

        // Every segment on disk stays within capacity.
        for epoch in &expected_epochs {
            let path = PathBuf::from(DIR).join(format!("segment-{epoch}.wal"));
            let content = storage.get_raw_content(&path).unwrap();
            assert!(content.len() as u64 <= CAPACITY, "seed {seed}: {path:?}");
        }

        node.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_dst_writer_fsync_failures_withhold_notifications() {
    for seed in [7u64, 42, 1234, 99999] {
        let mut rng = StdRng::seed_from_u64(seed);
        let storage =
            SimulatedStorage::with_faults(seed, FaultConfig::none().with_fsync_fail_rate(0.2));
        let (node, recorder) = open(&storage).await;

        let mut failures = 0;
        for _ in 0..200 {
            let result = node.append(&random_record(&mut rng)).await;
            let end = node.current_offset().await;
            let announced = announced_end(&recorder);
            match result {
                // A successful append is durable and announced.
                Ok(_) => assert_eq!(announced, end, "seed {seed}"),
                Err(e) => {
                    assert!(matches!(e, WalError::Io { .. }), "seed {seed}: {e}");
                    assert!(announced < end, "seed {seed}: unflushed bytes announced");
                    failures += 1;
                }
            }
        }
        assert!(failures > 0, "seed {seed}: no fsync failure injected");

        let violations = check_segment_chain(&recorder.events(), CAPACITY);
        assert!(violations.is_empty(), "seed {seed}: {violations:?}");
    }
}

#[tokio::test]
async fn test_dst_torn_write_recovery() {
    let storage = SimulatedStorage::new(5);
    let spec = PartitionSpec {
        ns: NamespaceId::new(1),
        topic: TopicId::new(1),
        partition: PartitionId::new(0),
        topic_type: TopicType::Regular,
        dir: PathBuf::from(DIR),
    };
    let mut limits = strata_core::Limits::new();
    limits.max_record_bytes = 1024;
    let log_config = LogConfig::new("/sim")
        .with_limits(limits)
        .with_max_log_segment_size(CAPACITY);

    let log = PartitionLog::open(Arc::new(storage.clone()), spec.clone(), &log_config)
        .await
        .unwrap();
    let mut durable = 0;
    for i in 0..5 {
        let record = WalRecord::new(format!("key-{i}"), vec![b'v'; 100]).unwrap();
        durable += log.append(&[record]).await.unwrap().size;
    }

    // The next write tears after a few header bytes, as if the process died.
    storage.fault_config().force_torn_write_at = Some(RECORD_HEADER_SIZE / 2);
    log.append(&[WalRecord::new("torn", "lost").unwrap()])
        .await
        .unwrap();
    drop(log);

    let recovered = PartitionLog::open(Arc::new(storage.clone()), spec, &log_config)
        .await
        .unwrap();
    assert_eq!(recovered.current_offset().await, durable);

    let read = recovered.read(0, 1 << 20).await.unwrap();
    let keys: Vec<_> = read.records.iter().map(|r| r.record.key.clone()).collect();
    let expected: Vec<_> = (0..5).map(|i| format!("key-{i}")).collect();
    assert_eq!(keys, expected);

    // New writes land in a fresh segment right after the recovered data.
    let reply = recovered
        .append(&[WalRecord::new("after", "crash").unwrap()])
        .await
        .unwrap();
    assert_eq!(reply.offset, durable);
    let tail = recovered.read(durable, 1 << 20).await.unwrap();
    assert_eq!(tail.records.len(), 1);
    assert_eq!(tail.records[0].record.key.as_ref(), b"after");
}
