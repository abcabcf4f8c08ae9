//! Strata Workload: a driver that smashes a write-ahead log.
//!
//! [`Smash`] creates one topic, writes batches of random records and reads
//! them back by following a per-partition cursor. It checks the one property
//! a reader relies on: a partition's read cursor never moves backwards.
//!
//! # Example
//!
//! ```ignore
//! use strata_workload::{Smash, SmashConfig};
//!
//! let smash = Smash::new(SmashConfig::new("ns", "orders"), wal)?;
//! smash.create().await?;
//! smash.write_all().await?;
//! smash.read_one(None).await?;
//! smash.stats().print_summary();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod smash;
mod stats;

pub use config::SmashConfig;
pub use error::{WorkloadError, WorkloadResult};
pub use smash::Smash;
pub use stats::SmashStats;
