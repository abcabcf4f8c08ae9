//! Error types for Strata core operations.
//!
//! All errors must be handled explicitly. No silent failures, no ignored
//! errors.

use std::fmt;

/// The result type for Strata core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Strata core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A resource limit was exceeded.
    LimitExceeded {
        /// Which limit was exceeded.
        limit: &'static str,
        /// The maximum allowed value.
        max: u64,
        /// The actual value that exceeded the limit.
        actual: u64,
    },

    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// The requested resource was not found.
    NotFound {
        /// The type of resource.
        resource: &'static str,
        /// An identifier for the resource.
        id: u64,
    },
}

impl Error {
    /// Checks `actual <= max`, returning `LimitExceeded` otherwise.
    ///
    /// # Errors
    /// Returns `LimitExceeded` if `actual` is larger than `max`.
    pub const fn check_limit(limit: &'static str, max: u64, actual: u64) -> Result<()> {
        if actual > max {
            return Err(Self::LimitExceeded { limit, max, actual });
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitExceeded { limit, max, actual } => {
                write!(f, "limit exceeded: {limit} (max={max}, actual={actual})")
            }
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::NotFound { resource, id } => {
                write!(f, "{resource} not found: {id}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_exceeded_display() {
        let err = Error::LimitExceeded {
            limit: "partition_count",
            max: 1024,
            actual: 2048,
        };
        let msg = format!("{err}");
        assert!(msg.contains("partition_count"));
        assert!(msg.contains("1024"));
        assert!(msg.contains("2048"));
    }

    #[test]
    fn test_check_limit() {
        assert!(Error::check_limit("shards", 8, 8).is_ok());
        assert_eq!(
            Error::check_limit("shards", 8, 9),
            Err(Error::LimitExceeded {
                limit: "shards",
                max: 8,
                actual: 9
            })
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            resource: "partition",
            id: 7,
        };
        assert_eq!(format!("{err}"), "partition not found: 7");
    }
}
