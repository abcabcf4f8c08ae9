//! Strata Routing - shard assignment and request routing.
//!
//! Every partition of every topic is owned by exactly one execution shard.
//! This crate decides which, and splits client requests into per-shard
//! sub-requests.
//!
//! # Design (`TigerStyle`)
//!
//! - **Jump consistent hashing**: a partition's shard is a pure function of
//!   its key and the shard count, with minimal remapping when shards are added
//! - **No routing state**: nothing to cache, nothing to invalidate
//! - **Explicit limits**: shard and partition counts are bounded

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod assignment;
mod error;
mod hash;
mod key;
mod request;

pub use assignment::CoreAssignment;
pub use error::RoutingError;
pub use hash::{jump_consistent_hash, xxhash64};
pub use key::Ntp;
pub use request::{
    CreateReply, CreateRequest, GetRequest, PartitionPut, PartitionWriteReply, PutReply,
    PutRequest, ReadReply, ShardCreate, ShardGet, ShardPut, TopicType,
};
