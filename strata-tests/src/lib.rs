//! Strata Tests - deterministic simulation and property tests for Strata.
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): seeded workloads over `SimulatedStorage`
//! - `writer_dst`: writer node rotation, fsync failures, torn writes
//! - `log_dst`: sharded log puts, reads and restart recovery
//!
//! **Property Tests**:
//! - `routing_properties`: remapping and request splitting of core assignment
//!
//! **Support Modules**:
//! - `properties`: segment-chain checker fed by a recording listener
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Property tests: `test_<property>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;

#[cfg(test)]
mod log_dst;
#[cfg(test)]
mod writer_dst;

#[cfg(test)]
mod routing_properties;
