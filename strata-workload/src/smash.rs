//! The smash driver: random writes and cursor-following reads on one topic.
//!
//! Each partition has a read cursor. Only one read per partition is in
//! flight at a time, and a reply whose `next_offset` lies behind the cursor is
//! a fatal [`WorkloadError::OffsetRegression`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_core::{NamespaceId, PartitionId, ShardId, TopicId};
use strata_log::WriteAheadLog;
use strata_routing::{
    jump_consistent_hash, CreateReply, CreateRequest, GetRequest, Ntp, PutReply, PutRequest,
    ReadReply,
};
use strata_wal::{CompressionType, WalRecord};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

use crate::config::SmashConfig;
use crate::error::{WorkloadError, WorkloadResult};
use crate::stats::SmashStats;

/// Drives writes and reads against one topic of a [`WriteAheadLog`].
#[derive(Debug)]
pub struct Smash {
    config: SmashConfig,
    ns: NamespaceId,
    topic: TopicId,
    wal: Arc<WriteAheadLog>,
    /// Read cursor per partition; the lock admits one read at a time.
    cursors: Vec<AsyncMutex<u64>>,
    shard_partitions: BTreeMap<ShardId, Vec<PartitionId>>,
    created: AtomicBool,
    read_sequence: AtomicU64,
    rng: Mutex<StdRng>,
    stats: Mutex<SmashStats>,
}

impl Smash {
    /// Creates a driver for the topic described by `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SmashConfig, wal: Arc<WriteAheadLog>) -> WorkloadResult<Self> {
        config.validate()?;

        let request = CreateRequest::new(&config.namespace, &config.topic, config.partitions);
        let (ns, topic) = (request.ns_id(), request.topic_id());

        let mut shard_partitions: BTreeMap<ShardId, Vec<PartitionId>> = BTreeMap::new();
        for p in 0..u64::from(config.partitions) {
            let partition = PartitionId::new(p);
            let shard = wal.assignment().shard_for(&Ntp::new(ns, topic, partition));
            shard_partitions.entry(shard).or_default().push(partition);
        }

        Ok(Self {
            cursors: (0..config.partitions).map(|_| AsyncMutex::new(0)).collect(),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            stats: Mutex::new(SmashStats::new()?),
            config,
            ns,
            topic,
            wal,
            shard_partitions,
            created: AtomicBool::new(false),
            read_sequence: AtomicU64::new(0),
        })
    }

    /// Creates the topic. Must precede any write or read.
    ///
    /// # Errors
    /// Returns an error if the log rejects the topic.
    pub async fn create(&self) -> WorkloadResult<CreateReply> {
        let request = self.config.properties.iter().fold(
            CreateRequest::new(&self.config.namespace, &self.config.topic, self.config.partitions)
                .with_topic_type(self.config.topic_type),
            |request, (key, value)| request.with_property(key.as_str(), value.as_str()),
        );

        let reply = self.wal.create(request).await?;
        self.created.store(true, Ordering::Release);

        info!(
            namespace = %self.config.namespace,
            topic = %self.config.topic,
            partitions = self.config.partitions,
            shards = self.shard_partitions.len(),
            "Created topic"
        );
        Ok(reply)
    }

    /// Writes one batch of random records to `partition`.
    ///
    /// # Errors
    /// Returns an error if the topic was not created, the partition is out of
    /// range, or the append fails.
    pub async fn write_one(&self, partition: PartitionId) -> WorkloadResult<PutReply> {
        self.ensure_created()?;
        self.cursor(partition)?;

        let put = PutRequest::new(self.ns, self.topic).with_partition(partition, self.random_batch()?);
        self.put(put).await
    }

    /// Writes one batch to every partition in a single put, which the log
    /// fans out to every owning shard.
    ///
    /// # Errors
    /// Returns an error if the topic was not created or any append fails.
    pub async fn write_all(&self) -> WorkloadResult<PutReply> {
        self.ensure_created()?;

        let mut put = PutRequest::new(self.ns, self.topic);
        for partitions in self.shard_partitions.values() {
            for &partition in partitions {
                put = put.with_partition(partition, self.random_batch()?);
            }
        }
        self.put(put).await
    }

    async fn put(&self, put: PutRequest) -> WorkloadResult<PutReply> {
        let (records, bytes) = put
            .puts
            .iter()
            .flat_map(|p| &p.records)
            .fold((0_u64, 0_u64), |(n, b), r| (n + 1, b + r.encoded_size()));

        let start = Instant::now();
        let reply = self.wal.append(put).await?;
        self.stats().record_write(records, bytes, start.elapsed());

        debug!(records, bytes, partitions = reply.replies.len(), "Wrote batch");
        Ok(reply)
    }

    /// Reads from `partition`'s cursor and advances it.
    ///
    /// With `None`, the partition is picked by hashing a read sequence number
    /// over the partition count.
    ///
    /// # Errors
    /// Returns [`WorkloadError::OffsetRegression`] if the reply moves the
    /// cursor backwards, or the log's error if the read fails.
    pub async fn read_one(&self, partition: Option<PartitionId>) -> WorkloadResult<ReadReply> {
        self.ensure_created()?;

        let partition = partition.unwrap_or_else(|| {
            let sequence = self.read_sequence.fetch_add(1, Ordering::Relaxed);
            PartitionId::new(u64::from(jump_consistent_hash(
                sequence,
                self.config.partitions,
            )))
        });
        let mut cursor = self.cursor(partition)?.lock().await;

        let start = Instant::now();
        let reply = self
            .wal
            .get(GetRequest {
                ns: self.ns,
                topic: self.topic,
                partition,
                offset: *cursor,
                max_bytes: self.config.max_read_bytes,
            })
            .await?;

        advance_cursor(partition, &mut cursor, reply.next_offset)?;

        self.stats()
            .record_read(reply.records.len() as u64, reply.bytes, start.elapsed());
        Ok(reply)
    }

    /// Current read cursor of `partition`.
    ///
    /// # Errors
    /// Returns an error if the partition is out of range.
    pub async fn cursor_offset(&self, partition: PartitionId) -> WorkloadResult<u64> {
        Ok(*self.cursor(partition)?.lock().await)
    }

    /// Partitions grouped by owning shard.
    #[must_use]
    pub const fn shard_partitions(&self) -> &BTreeMap<ShardId, Vec<PartitionId>> {
        &self.shard_partitions
    }

    /// The driver's configuration.
    #[must_use]
    pub const fn config(&self) -> &SmashConfig {
        &self.config
    }

    /// Locks the statistics gathered so far.
    #[must_use]
    pub fn stats(&self) -> MutexGuard<'_, SmashStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_created(&self) -> WorkloadResult<()> {
        if self.created.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(WorkloadError::NotCreated)
        }
    }

    fn cursor(&self, partition: PartitionId) -> WorkloadResult<&AsyncMutex<u64>> {
        usize::try_from(partition.get())
            .ok()
            .and_then(|index| self.cursors.get(index))
            .ok_or(WorkloadError::UnknownPartition {
                partition,
                partitions: self.config.partitions,
            })
    }

    fn random_batch(&self) -> WorkloadResult<Vec<WalRecord>> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let compression = if self.config.value_bytes >= self.config.compression_threshold {
            self.config.compression
        } else {
            CompressionType::None
        };

        (0..self.config.write_batch_size)
            .map(|_| {
                let key = alphanumeric(&mut *rng, self.config.key_bytes);
                let value = alphanumeric(&mut *rng, self.config.value_bytes);
                WalRecord::with_compression(key, value, compression)
                    .map_err(|e| WorkloadError::Log(e.into()))
            })
            .collect()
    }
}

/// Moves a read cursor to `observed`, refusing to move it backwards.
fn advance_cursor(partition: PartitionId, cursor: &mut u64, observed: u64) -> WorkloadResult<()> {
    if observed < *cursor {
        error!(
            %partition,
            previous = *cursor,
            observed,
            "Read reply regressed the partition cursor"
        );
        return Err(WorkloadError::OffsetRegression {
            partition,
            previous: *cursor,
            observed,
        });
    }
    *cursor = observed;
    Ok(())
}

fn alphanumeric(rng: &mut StdRng, len: usize) -> Vec<u8> {
    rng.sample_iter(&Alphanumeric).take(len).collect()
}
