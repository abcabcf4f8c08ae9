//! Strongly-typed identifiers for Strata entities.
//!
//! Explicit types prevent bugs from mixing up IDs. All IDs are 64-bit so a
//! hashed namespace or topic name fits without truncation.

use std::fmt;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `TopicId` with `PartitionId`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns the next ID in sequence.
            ///
            /// # Panics
            /// Panics if the ID would overflow.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                assert!(self.0 < u64::MAX, "ID overflow");
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

// Log addressing.
define_id!(NamespaceId, "ns", "Identifier for a namespace, derived by hashing its name.");
define_id!(TopicId, "topic", "Identifier for a topic within a namespace, derived by hashing its name.");
define_id!(PartitionId, "partition", "Identifier for a partition within a topic.");

// Execution.
define_id!(ShardId, "shard", "Index of the execution shard that owns a set of partitions.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let topic = TopicId::new(1);
        let partition = PartitionId::new(1);

        // These are different types even with same value.
        assert_eq!(topic.get(), partition.get());
    }

    #[test]
    fn test_id_display() {
        let partition = PartitionId::new(42);
        assert_eq!(format!("{partition}"), "partition-42");
        assert_eq!(format!("{partition:?}"), "partition(42)");

        let shard = ShardId::new(3);
        assert_eq!(format!("{shard}"), "shard-3");
    }

    #[test]
    fn test_id_next() {
        let id = PartitionId::new(0);
        assert_eq!(id.next().get(), 1);
        assert_eq!(id.next().next().get(), 2);
    }

    #[test]
    #[should_panic(expected = "ID overflow")]
    fn test_id_overflow_panics() {
        let id = NamespaceId::new(u64::MAX);
        let _ = id.next();
    }

    #[test]
    fn test_id_ordering() {
        let a = ShardId::new(1);
        let b = ShardId::new(2);
        let c = ShardId::new(1);

        assert!(a < b);
        assert!(b > a);
        assert_eq!(a, c);
    }
}
