//! Routing errors.

/// Errors from request validation and shard assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// Shard count outside `1..=max`.
    InvalidShardCount {
        /// Requested shard count.
        count: u32,
        /// Largest allowed shard count.
        max: u32,
    },
    /// Namespace or topic name is not a valid directory name.
    InvalidName {
        /// The rejected name.
        name: String,
    },
    /// Partition count outside `1..=max`.
    InvalidPartitionCount {
        /// Requested partition count.
        count: u32,
        /// Largest allowed partition count.
        max: u32,
    },
}

impl std::fmt::Display for RoutingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidShardCount { count, max } => {
                write!(f, "invalid shard count {count} (must be 1..={max})")
            }
            Self::InvalidName { name } => {
                write!(f, "invalid namespace or topic name '{name}'")
            }
            Self::InvalidPartitionCount { count, max } => {
                write!(f, "invalid partition count {count} (must be 1..={max})")
            }
        }
    }
}

impl std::error::Error for RoutingError {}
