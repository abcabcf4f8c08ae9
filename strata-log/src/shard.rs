//! Shard actor: owns the partitions assigned to one execution shard.
//!
//! Every partition lives on exactly one shard and is only touched through
//! that shard's command channel.
//!
//! ```text
//! WriteAheadLog ──┬──► ShardActor(0) ──► PartitionLog(a), PartitionLog(b)
//!                 ├──► ShardActor(1) ──► PartitionLog(c)
//!                 └──► ShardActor(2) ──► ...
//! ```
//!
//! Creates run inline so a put that follows a create on the same shard always
//! finds its partition. Puts and gets are spawned and do not block the loop;
//! the writer node's gate orders appends within a partition.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use strata_core::{PartitionId, ShardId};
use strata_routing::{
    GetRequest, Ntp, PartitionWriteReply, PutReply, ReadReply, ShardCreate, ShardPut,
};
use strata_wal::Storage;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{LogConfig, PartitionSpec};
use crate::error::{LogError, LogResult};
use crate::partition::PartitionLog;

/// Commands accepted by a shard actor.
#[derive(Debug)]
pub enum ShardCommand {
    /// Open the shard's partitions of a topic.
    Create {
        /// Partitions to open.
        request: ShardCreate,
        /// Partitions newly opened by this request.
        reply: oneshot::Sender<LogResult<Vec<PartitionId>>>,
    },
    /// Append records to the shard's partitions.
    Put {
        /// Records per partition.
        request: ShardPut,
        /// One reply per partition put.
        reply: oneshot::Sender<LogResult<PutReply>>,
    },
    /// Read from one partition.
    Get {
        /// The read.
        request: GetRequest,
        /// Records read.
        reply: oneshot::Sender<LogResult<ReadReply>>,
    },
    /// Close every partition and stop.
    Shutdown {
        /// Completion signal.
        reply: oneshot::Sender<LogResult<()>>,
    },
}

/// Handle for sending commands to a shard actor.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    shard: ShardId,
    tx: mpsc::Sender<ShardCommand>,
}

impl ShardHandle {
    /// The shard this handle talks to.
    #[must_use]
    pub const fn shard(&self) -> ShardId {
        self.shard
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<LogResult<T>>) -> ShardCommand,
    ) -> LogResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let shutdown = || LogError::ShardShutdown { shard: self.shard };

        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| shutdown())?;
        reply_rx.await.map_err(|_| shutdown())?
    }

    /// Opens partitions on this shard.
    ///
    /// # Errors
    /// Returns an error if the shard has stopped or a partition cannot be
    /// opened.
    pub async fn create(&self, request: ShardCreate) -> LogResult<Vec<PartitionId>> {
        self.request(|reply| ShardCommand::Create { request, reply })
            .await
    }

    /// Appends to partitions on this shard.
    ///
    /// # Errors
    /// Returns an error if the shard has stopped, a partition is unknown, or
    /// an append fails.
    pub async fn put(&self, request: ShardPut) -> LogResult<PutReply> {
        self.request(|reply| ShardCommand::Put { request, reply })
            .await
    }

    /// Reads from a partition on this shard.
    ///
    /// # Errors
    /// Returns an error if the shard has stopped, the partition is unknown,
    /// or the read fails.
    pub async fn get(&self, request: GetRequest) -> LogResult<ReadReply> {
        self.request(|reply| ShardCommand::Get { request, reply })
            .await
    }

    /// Closes the shard's partitions and stops the actor.
    ///
    /// # Errors
    /// Returns the first close failure. A shard that already stopped is not
    /// an error.
    pub async fn shutdown(&self) -> LogResult<()> {
        match self.request(|reply| ShardCommand::Shutdown { reply }).await {
            Err(LogError::ShardShutdown { .. }) => Ok(()),
            result => result,
        }
    }
}

struct ShardActor<S: Storage + 'static> {
    shard: ShardId,
    rx: mpsc::Receiver<ShardCommand>,
    storage: Arc<S>,
    config: LogConfig,
    partitions: HashMap<Ntp, Arc<PartitionLog<S>>>,
}

impl<S: Storage + 'static> ShardActor<S> {
    async fn run(mut self) {
        debug!(shard = %self.shard, "Shard actor started");

        while let Some(command) = self.rx.recv().await {
            match command {
                ShardCommand::Create { request, reply } => {
                    let result = self.create(request).await;
                    let _ = reply.send(result);
                }
                ShardCommand::Put { request, reply } => {
                    let resolved = self.resolve_puts(request);
                    tokio::spawn(async move {
                        let result = match resolved {
                            Ok(puts) => append_all(puts).await,
                            Err(e) => Err(e),
                        };
                        let _ = reply.send(result);
                    });
                }
                ShardCommand::Get { request, reply } => match self.partition(request.ntp()) {
                    Ok(log) => {
                        tokio::spawn(async move {
                            let result = log
                                .read(request.offset, request.max_bytes)
                                .await
                                .map_err(LogError::from);
                            let _ = reply.send(result);
                        });
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                },
                ShardCommand::Shutdown { reply } => {
                    let result = self.close_all().await;
                    let _ = reply.send(result);
                    break;
                }
            }
        }

        debug!(shard = %self.shard, "Shard actor stopped");
    }

    async fn create(&mut self, request: ShardCreate) -> LogResult<Vec<PartitionId>> {
        let mut opened = Vec::new();
        for partition in request.partitions {
            let ntp = Ntp::new(request.ns, request.topic, partition);
            if self.partitions.contains_key(&ntp) {
                continue;
            }

            let spec = PartitionSpec {
                ns: request.ns,
                topic: request.topic,
                partition,
                topic_type: request.topic_type,
                dir: self
                    .config
                    .partition_dir(&request.namespace_name, &request.topic_name, partition),
            };
            let log = PartitionLog::open(self.storage.clone(), spec, &self.config).await?;
            self.partitions.insert(ntp, Arc::new(log));
            opened.push(partition);
        }

        info!(
            shard = %self.shard,
            namespace = %request.namespace_name,
            topic = %request.topic_name,
            opened = opened.len(),
            "Created partitions"
        );
        Ok(opened)
    }

    fn partition(&self, ntp: Ntp) -> LogResult<Arc<PartitionLog<S>>> {
        self.partitions
            .get(&ntp)
            .cloned()
            .ok_or(LogError::PartitionNotFound { ntp })
    }

    /// Looks up every partition of a put before any record is written.
    fn resolve_puts(&self, request: ShardPut) -> LogResult<Vec<ResolvedPut<S>>> {
        request
            .puts
            .into_iter()
            .map(|put| {
                let log = self.partition(Ntp::new(request.ns, request.topic, put.partition))?;
                Ok(ResolvedPut {
                    partition: put.partition,
                    log,
                    records: put.records,
                })
            })
            .collect()
    }

    async fn close_all(&mut self) -> LogResult<()> {
        let mut first_error = None;
        for (ntp, log) in self.partitions.drain() {
            if let Err(e) = log.close().await {
                warn!(%ntp, error = %e, "Failed to close partition");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }
}

struct ResolvedPut<S: Storage + 'static> {
    partition: PartitionId,
    log: Arc<PartitionLog<S>>,
    records: Vec<strata_wal::WalRecord>,
}

/// Appends to every partition of a put concurrently.
async fn append_all<S: Storage + 'static>(puts: Vec<ResolvedPut<S>>) -> LogResult<PutReply> {
    let replies = try_join_all(puts.into_iter().map(|put| async move {
        let reply = put.log.append(&put.records).await?;
        Ok::<_, LogError>(PartitionWriteReply {
            partition: put.partition,
            reply,
        })
    }))
    .await?;
    Ok(PutReply { replies })
}

/// Spawns the actor for `shard` and returns its handle.
#[must_use]
pub fn spawn_shard_actor<S: Storage + 'static>(
    shard: ShardId,
    storage: Arc<S>,
    config: LogConfig,
) -> ShardHandle {
    let (tx, rx) = mpsc::channel(config.limits.shard_channel_capacity as usize);

    let actor = ShardActor {
        shard,
        rx,
        storage,
        config,
        partitions: HashMap::new(),
    };
    tokio::spawn(actor.run());

    ShardHandle { shard, tx }
}
