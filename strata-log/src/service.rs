//! The sharded write-ahead log service.
//!
//! Requests are split by [`CoreAssignment`] into one sub-request per owning
//! shard; sub-requests run concurrently and their replies are merged.

use std::sync::Arc;

use futures::future::try_join_all;
use strata_core::{Error as LimitError, ShardId};
use strata_routing::{CoreAssignment, CreateReply, CreateRequest, GetRequest, PutReply, PutRequest, ReadReply};
use strata_wal::Storage;
use tracing::info;

use crate::config::LogConfig;
use crate::error::LogResult;
use crate::shard::{spawn_shard_actor, ShardHandle};

/// A write-ahead log spread over a fixed set of shard actors.
#[derive(Debug)]
pub struct WriteAheadLog {
    assignment: CoreAssignment,
    shards: Vec<ShardHandle>,
    config: LogConfig,
}

impl WriteAheadLog {
    /// Spawns one actor per shard over `storage`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub async fn open<S: Storage + 'static>(storage: Arc<S>, config: LogConfig) -> LogResult<Self> {
        config.validate()?;
        let assignment = CoreAssignment::new(config.shard_count, &config.limits)?;
        storage.create_dir_all(&config.data_dir).await?;

        let shards = (0..u64::from(config.shard_count))
            .map(|id| spawn_shard_actor(ShardId::new(id), storage.clone(), config.clone()))
            .collect();

        info!(
            data_dir = %config.data_dir.display(),
            shards = config.shard_count,
            "Opened write-ahead log"
        );

        Ok(Self {
            assignment,
            shards,
            config,
        })
    }

    /// The router.
    #[must_use]
    pub const fn assignment(&self) -> &CoreAssignment {
        &self.assignment
    }

    /// The configuration the log was opened with.
    #[must_use]
    pub const fn config(&self) -> &LogConfig {
        &self.config
    }

    fn shard(&self, shard: ShardId) -> &ShardHandle {
        // Every id the router hands out is below the shard count.
        let index = usize::try_from(shard.get()).unwrap_or(usize::MAX);
        &self.shards[index]
    }

    /// Creates a topic's partitions on their owning shards.
    ///
    /// Partitions that already exist are left alone and do not appear in the
    /// reply.
    ///
    /// # Errors
    /// Returns an error if the request is invalid or a shard fails.
    pub async fn create(&self, request: CreateRequest) -> LogResult<CreateReply> {
        request.validate(&self.config.limits)?;

        let creates = self.assignment.create(&request);
        let opened = try_join_all(creates.into_iter().map(|create| async move {
            let shard = create.shard;
            let partitions = self.shard(shard).create(create).await?;
            LogResult::Ok((shard, partitions))
        }))
        .await?;

        Ok(CreateReply {
            ns: request.ns_id(),
            topic: request.topic_id(),
            partitions: opened
                .into_iter()
                .filter(|(_, partitions)| !partitions.is_empty())
                .collect(),
        })
    }

    /// Appends records to one or more partitions of a topic.
    ///
    /// Each shard's sub-batch is applied concurrently; the reply lists the
    /// partitions in shard order.
    ///
    /// # Errors
    /// Returns an error if the batch is too large, a partition does not
    /// exist, or an append fails.
    pub async fn append(&self, request: PutRequest) -> LogResult<PutReply> {
        LimitError::check_limit(
            "records_per_put",
            u64::from(self.config.limits.max_records_per_put),
            request.record_count() as u64,
        )?;

        let puts = self.assignment.put(request);
        let replies = try_join_all(
            puts.into_iter()
                .map(|put| async move { self.shard(put.shard).put(put).await }),
        )
        .await?;

        Ok(PutReply {
            replies: replies.into_iter().flat_map(|r| r.replies).collect(),
        })
    }

    /// Reads from one partition.
    ///
    /// `max_bytes` is clamped to the configured read limit.
    ///
    /// # Errors
    /// Returns an error if the partition does not exist or the offset is out
    /// of range.
    pub async fn get(&self, mut request: GetRequest) -> LogResult<ReadReply> {
        request.max_bytes = request
            .max_bytes
            .min(u64::from(self.config.limits.max_read_bytes));
        let routed = self.assignment.get(request);
        self.shard(routed.shard).get(routed.request).await
    }

    /// Closes every partition and stops all shard actors.
    ///
    /// # Errors
    /// Returns the first shard failure; every shard is asked to stop
    /// regardless.
    pub async fn shutdown(&self) -> LogResult<()> {
        let results = futures::future::join_all(self.shards.iter().map(ShardHandle::shutdown)).await;
        info!(shards = self.shards.len(), "Write-ahead log shut down");
        results.into_iter().collect()
    }
}
