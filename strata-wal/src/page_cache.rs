//! Page-cache results and leases.
//!
//! A [`PageCacheResult`] is a cached, page-aligned span of a segment. It may
//! only be evicted while nobody holds a [`PageCacheLease`] on it: every live
//! lease counts as one lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;

/// Page size used for page accounting.
pub const PAGE_SIZE: u64 = 4096;

/// Eviction priority of a cached span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagePriority {
    /// Evicted first.
    #[default]
    Low,
    /// Kept as long as possible.
    High,
}

/// A cached span of pages starting at `begin_pageno`.
#[derive(Debug)]
pub struct PageCacheResult {
    begin_pageno: u64,
    data: Bytes,
    priority: PagePriority,
    locks: AtomicU32,
}

impl PageCacheResult {
    /// Creates an unlocked result.
    #[must_use]
    pub const fn new(begin_pageno: u64, data: Bytes, priority: PagePriority) -> Self {
        Self {
            begin_pageno,
            data,
            priority,
            locks: AtomicU32::new(0),
        }
    }

    /// First page covered by this result.
    #[must_use]
    pub const fn begin_pageno(&self) -> u64 {
        self.begin_pageno
    }

    /// One past the last page covered. Always at least `begin_pageno + 1`,
    /// even for an empty span.
    #[must_use]
    pub fn end_pageno(&self) -> u64 {
        let pages = (self.data.len() as u64).div_ceil(PAGE_SIZE).max(1);
        self.begin_pageno + pages
    }

    /// Cached bytes.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Eviction priority.
    #[must_use]
    pub const fn priority(&self) -> PagePriority {
        self.priority
    }

    /// Number of live leases.
    #[must_use]
    pub fn locks(&self) -> u32 {
        self.locks.load(Ordering::Acquire)
    }

    /// True when no lease is held.
    #[must_use]
    pub fn is_evictable(&self) -> bool {
        self.locks() == 0
    }
}

/// A counted hold on a [`PageCacheResult`].
///
/// Creating or cloning a lease increments the lock count, dropping it
/// decrements. Moving a lease (including `std::mem::take`) leaves the count
/// untouched.
#[derive(Debug, Default)]
pub struct PageCacheLease {
    result: Option<Arc<PageCacheResult>>,
}

impl PageCacheLease {
    /// Takes a lease on `result`.
    #[must_use]
    pub fn new(result: Arc<PageCacheResult>) -> Self {
        result.locks.fetch_add(1, Ordering::AcqRel);
        Self {
            result: Some(result),
        }
    }

    /// Returns the leased result, or `None` for an empty lease.
    #[must_use]
    pub fn get(&self) -> Option<&PageCacheResult> {
        self.result.as_deref()
    }

    /// True if this lease holds nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.result.is_none()
    }
}

impl Clone for PageCacheLease {
    fn clone(&self) -> Self {
        self.result
            .as_ref()
            .map_or_else(Self::default, |result| Self::new(Arc::clone(result)))
    }
}

impl Drop for PageCacheLease {
    fn drop(&mut self) {
        if let Some(result) = self.result.take() {
            result.locks.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_result() -> Arc<PageCacheResult> {
        Arc::new(PageCacheResult::new(0, Bytes::new(), PagePriority::Low))
    }

    #[test]
    fn test_lease_counts_on_construction() {
        let result = empty_result();
        {
            let lease = PageCacheLease::new(result.clone());
            assert_eq!(result.locks(), 1);
            assert!(!lease.is_empty());
            assert!(!result.is_evictable());
        }
        assert!(result.is_evictable());
    }

    #[test]
    fn test_lease_clone_counts() {
        let result = empty_result();
        {
            let lease = PageCacheLease::new(result.clone());
            assert_eq!(result.locks(), 1);
            {
                let copy = lease.clone();
                assert_eq!(result.locks(), 2);
                drop(copy);
            }
            assert_eq!(result.locks(), 1);
        }
        assert!(result.is_evictable());
    }

    #[test]
    fn test_lease_move_keeps_count() {
        let result = empty_result();
        {
            let mut lease = PageCacheLease::new(result.clone());
            let moved = std::mem::take(&mut lease);
            assert_eq!(result.locks(), 1);
            assert!(lease.is_empty());
            assert_eq!(moved.get().map(PageCacheResult::begin_pageno), Some(0));
        }
        assert!(result.is_evictable());
    }

    #[test]
    fn test_empty_lease_clone() {
        let lease = PageCacheLease::default();
        assert!(lease.clone().is_empty());
    }

    #[test]
    fn test_empty_span_covers_one_page() {
        let result = PageCacheResult::new(0, Bytes::new(), PagePriority::Low);
        assert_eq!(result.begin_pageno(), 0);
        assert_eq!(result.end_pageno(), 1);
    }

    #[test]
    fn test_page_accounting() {
        let exact = PageCacheResult::new(3, Bytes::from(vec![0u8; 8192]), PagePriority::High);
        assert_eq!(exact.end_pageno(), 5);

        let partial = PageCacheResult::new(3, Bytes::from(vec![0u8; 8193]), PagePriority::High);
        assert_eq!(partial.end_pageno(), 6);
        assert_eq!(partial.priority(), PagePriority::High);
    }
}
