//! Strata Core - Strongly-typed identifiers and limits for Strata.
//!
//! This crate holds the types every other Strata crate agrees on: the
//! namespace/topic/partition/shard identifiers and the system-wide limits.
//! It has no I/O and no async code.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up `TopicId` with `PartitionId`
//! - **Explicit limits**: Every resource has a bounded maximum
//! - **Explicit types**: Use u32/u64, not usize
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use types::{NamespaceId, PartitionId, ShardId, TopicId};
