//! Workload driver errors.

use strata_core::PartitionId;
use strata_log::LogError;
use thiserror::Error;

/// Result type for workload operations.
pub type WorkloadResult<T> = Result<T, WorkloadError>;

/// Errors returned by the workload driver.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The log rejected a request.
    #[error(transparent)]
    Log(#[from] LogError),

    /// A read reply moved a partition's cursor backwards.
    #[error("offset regression on {partition}: cursor at {previous}, reply at {observed}")]
    OffsetRegression {
        /// Partition read.
        partition: PartitionId,
        /// Cursor before the read.
        previous: u64,
        /// `next_offset` of the reply.
        observed: u64,
    },

    /// A write or read was issued before `create`.
    #[error("topic not created; call create() first")]
    NotCreated,

    /// The partition is outside the topic.
    #[error("{partition} is not a partition of this topic ({partitions} partitions)")]
    UnknownPartition {
        /// Requested partition.
        partition: PartitionId,
        /// Partition count of the topic.
        partitions: u32,
    },

    /// The driver configuration is invalid.
    #[error("invalid workload config: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: &'static str,
    },

    /// Latency histograms could not be created.
    #[error("histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

impl WorkloadError {
    /// Returns true for consistency violations that must stop the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::OffsetRegression { .. } => true,
            Self::Log(e) => e.is_fatal(),
            _ => false,
        }
    }
}
