//! Strata Log - a sharded topic/partition write-ahead log.
//!
//! Topics are created with a fixed number of partitions. Each partition is a
//! chain of WAL segments written by one writer node, and each partition is
//! owned by exactly one shard actor, chosen by jump consistent hashing.
//!
//! ```text
//! client ──► WriteAheadLog ──► CoreAssignment ──► ShardActor(n) ──► PartitionLog
//!                                                                  ├─ WriterNode
//!                                                                  └─ SegmentCatalog
//! ```
//!
//! # Durability
//!
//! A put replies only after its bytes are flushed. Readers see a segment up
//! to its last flushed size, which the writer node reports to the segment
//! catalog after each successful flush.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod catalog;
mod config;
mod error;
mod partition;
mod service;
mod shard;

pub use catalog::{SegmentCatalog, SegmentInfo};
pub use config::{LogConfig, PartitionSpec};
pub use error::{LogError, LogResult};
pub use partition::PartitionLog;
pub use service::WriteAheadLog;
pub use shard::{spawn_shard_actor, ShardCommand, ShardHandle};
