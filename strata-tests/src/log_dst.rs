//! Sharded log simulation tests.
//!
//! Random multi-partition puts go through a `WriteAheadLog` over
//! `SimulatedStorage`; every partition is then read back and compared with an
//! in-memory model.

#![allow(clippy::cast_possible_truncation)] // Test sizes are small.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use strata_core::{Limits, PartitionId};
use strata_log::{LogConfig, WriteAheadLog};
use strata_routing::{CreateRequest, GetRequest, PutRequest, TopicType};
use strata_wal::{SimulatedStorage, WalRecord};

const PARTITIONS: u32 = 12;

fn log_config(shards: u32) -> LogConfig {
    let mut limits = Limits::new();
    limits.max_record_bytes = 1024;
    LogConfig::new("/sim")
        .with_shard_count(shards)
        .with_limits(limits)
        .with_max_log_segment_size(4096)
}

/// Values written to each partition, in offset order, plus the next offset.
#[derive(Debug, Default)]
struct Model {
    values: BTreeMap<u64, Vec<Bytes>>,
    offsets: BTreeMap<u64, u64>,
}

async fn random_puts(
    wal: &WriteAheadLog,
    request: &CreateRequest,
    rng: &mut StdRng,
    model: &mut Model,
    puts: usize,
) {
    let all: Vec<u64> = (0..u64::from(PARTITIONS)).collect();
    for _ in 0..puts {
        let count = rng.gen_range(1..=4);
        let chosen: Vec<u64> = all.choose_multiple(rng, count).copied().collect();

        let mut put = PutRequest::new(request.ns_id(), request.topic_id());
        let mut written: BTreeMap<u64, Vec<WalRecord>> = BTreeMap::new();
        for &p in &chosen {
            let records: Vec<_> = (0..rng.gen_range(1..=3))
                .map(|_| {
                    let len = rng.gen_range(0..600);
                    let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                    WalRecord::new(format!("p{p}"), value).unwrap()
                })
                .collect();
            written.insert(p, records.clone());
            put = put.with_partition(PartitionId::new(p), records);
        }

        let reply = wal.append(put).await.unwrap();
        assert_eq!(reply.replies.len(), chosen.len());

        for partition_reply in reply.replies {
            let p = partition_reply.partition.get();
            let records = &written[&p];
            let expected_offset = model.offsets.entry(p).or_default();
            assert_eq!(partition_reply.reply.offset, *expected_offset, "partition {p}");

            let size: u64 = records.iter().map(WalRecord::encoded_size).sum();
            assert_eq!(partition_reply.reply.size, size);
            *expected_offset += size;
            model
                .values
                .entry(p)
                .or_default()
                .extend(records.iter().map(|r| r.value.clone()));
        }
    }
}

async fn read_partition(wal: &WriteAheadLog, request: &CreateRequest, p: u64) -> (Vec<Bytes>, u64) {
    let mut values = Vec::new();
    let mut offset = 0;
    loop {
        let read = wal
            .get(GetRequest {
                ns: request.ns_id(),
                topic: request.topic_id(),
                partition: PartitionId::new(p),
                offset,
                max_bytes: 1500,
            })
            .await
            .unwrap();
        if read.records.is_empty() {
            return (values, offset);
        }
        // Records arrive contiguously from the requested offset.
        for record in read.records {
            assert_eq!(record.offset, offset, "partition {p}: gap");
            offset += record.record.encoded_size();
            values.push(record.record.value);
        }
        assert_eq!(read.next_offset, offset, "partition {p}: next offset");
    }
}

fn assert_matches_model(model: &Model, p: u64, values: &[Bytes], end: u64) {
    let expected = model.values.get(&p).map_or(&[][..], Vec::as_slice);
    assert_eq!(values, expected, "partition {p}: contents");
    assert_eq!(end, model.offsets.get(&p).copied().unwrap_or(0), "partition {p}: end");
}

#[tokio::test]
async fn test_dst_log_random_puts_read_back() {
    for seed in 0..5u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let storage = Arc::new(SimulatedStorage::new(seed));
        let wal = WriteAheadLog::open(storage, log_config(4)).await.unwrap();

        let request = CreateRequest::new("sim", format!("topic-{seed}"), PARTITIONS);
        wal.create(request.clone()).await.unwrap();

        let mut model = Model::default();
        random_puts(&wal, &request, &mut rng, &mut model, 80).await;

        for p in 0..u64::from(PARTITIONS) {
            let (values, end) = read_partition(&wal, &request, p).await;
            assert_matches_model(&model, p, &values, end);
        }

        wal.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_dst_log_restart_resumes_every_partition() {
    let mut rng = StdRng::seed_from_u64(77);
    let storage = Arc::new(SimulatedStorage::new(77));
    let request =
        CreateRequest::new("sim", "durable", PARTITIONS).with_topic_type(TopicType::Compaction);
    let mut model = Model::default();

    let wal = WriteAheadLog::open(storage.clone(), log_config(3)).await.unwrap();
    wal.create(request.clone()).await.unwrap();
    random_puts(&wal, &request, &mut rng, &mut model, 40).await;
    wal.shutdown().await.unwrap();

    // A different shard count moves partitions between shards; recovery
    // depends only on the files.
    let wal = WriteAheadLog::open(storage, log_config(5)).await.unwrap();
    let created = wal.create(request.clone()).await.unwrap();
    assert_eq!(
        created.partitions.values().map(Vec::len).sum::<usize>(),
        PARTITIONS as usize
    );
    random_puts(&wal, &request, &mut rng, &mut model, 40).await;

    for p in 0..u64::from(PARTITIONS) {
        let (values, end) = read_partition(&wal, &request, p).await;
        assert_matches_model(&model, p, &values, end);
    }
    wal.shutdown().await.unwrap();
}
