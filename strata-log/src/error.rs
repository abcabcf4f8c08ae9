//! Log service errors.

use strata_core::ShardId;
use strata_routing::{Ntp, RoutingError};
use strata_wal::WalError;
use thiserror::Error;

/// Result type for log service operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors returned by the log service.
#[derive(Debug, Error)]
pub enum LogError {
    /// Failure in a partition's WAL.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// The request could not be routed.
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    /// A request exceeded a system limit.
    #[error("{0}")]
    Limit(#[from] strata_core::Error),

    /// The partition was never created on its shard.
    #[error("partition not found: {ntp}")]
    PartitionNotFound {
        /// The missing partition.
        ntp: Ntp,
    },

    /// The shard's actor has stopped.
    #[error("{shard} is shut down")]
    ShardShutdown {
        /// The stopped shard.
        shard: ShardId,
    },
}

impl LogError {
    /// Returns true if the error must not be retried.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Wal(e) => e.is_fatal(),
            _ => false,
        }
    }
}
