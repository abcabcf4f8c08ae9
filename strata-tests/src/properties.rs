//! Segment-chain properties checked against writer node notifications.
//!
//! A [`SegmentRecorder`] is installed as a writer node's listener and keeps
//! every notification. [`check_segment_chain`] then verifies the chain of
//! segments those notifications describe.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use strata_wal::SegmentListener;

/// A notification delivered by a writer node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentEvent {
    /// A segment was opened.
    Created {
        /// Segment file.
        path: PathBuf,
        /// Its epoch.
        epoch: u64,
    },
    /// A segment's flushed size grew.
    Size {
        /// Segment epoch.
        epoch: u64,
        /// Flushed size.
        size: u64,
    },
}

/// Listener that records every notification in order.
#[derive(Debug, Default)]
pub struct SegmentRecorder {
    events: Mutex<Vec<SegmentEvent>>,
}

impl SegmentRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    #[must_use]
    pub fn events(&self) -> Vec<SegmentEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Epochs of the segments opened so far.
    #[must_use]
    pub fn epochs(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SegmentEvent::Created { epoch, .. } => Some(epoch),
                SegmentEvent::Size { .. } => None,
            })
            .collect()
    }

    /// Number of size notifications so far.
    #[must_use]
    pub fn size_notifications(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SegmentEvent::Size { .. }))
            .count()
    }

    fn push(&self, event: SegmentEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[async_trait]
impl SegmentListener for SegmentRecorder {
    async fn on_segment_created(&self, path: &Path, epoch: u64) {
        self.push(SegmentEvent::Created {
            path: path.to_path_buf(),
            epoch,
        });
    }

    async fn on_size_change(&self, _path: &Path, epoch: u64, size: u64) {
        self.push(SegmentEvent::Size { epoch, size });
    }
}

/// A broken segment-chain property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// A segment grew beyond its capacity.
    OverCapacity {
        /// Segment epoch.
        epoch: u64,
        /// Reported size.
        size: u64,
        /// Segment capacity.
        capacity: u64,
    },
    /// A segment did not start where its predecessor ended.
    EpochGap {
        /// Epoch of the new segment.
        epoch: u64,
        /// End offset of the previous segment.
        expected: u64,
    },
    /// A segment's reported size shrank.
    SizeRegression {
        /// Segment epoch.
        epoch: u64,
        /// Previously reported size.
        previous: u64,
        /// Newly reported size.
        size: u64,
    },
    /// A size was reported for a segment other than the active one.
    StraySize {
        /// Epoch the size was reported for.
        epoch: u64,
    },
}

/// Checks the chain of segments described by `events`.
///
/// The chain holds when every segment stays within `capacity`, sizes never
/// shrink, sizes are only reported for the active segment, and each new
/// segment's epoch equals the previous segment's epoch plus its final size.
#[must_use]
pub fn check_segment_chain(events: &[SegmentEvent], capacity: u64) -> Vec<PropertyViolation> {
    let mut violations = Vec::new();
    // (epoch, size) of the active segment.
    let mut active: Option<(u64, u64)> = None;

    for event in events {
        match *event {
            SegmentEvent::Created { epoch, .. } => {
                if let Some((prev_epoch, prev_size)) = active {
                    let expected = prev_epoch + prev_size;
                    if epoch != expected {
                        violations.push(PropertyViolation::EpochGap { epoch, expected });
                    }
                }
                active = Some((epoch, 0));
            }
            SegmentEvent::Size { epoch, size } => match active.as_mut() {
                Some((active_epoch, active_size)) if *active_epoch == epoch => {
                    if size < *active_size {
                        violations.push(PropertyViolation::SizeRegression {
                            epoch,
                            previous: *active_size,
                            size,
                        });
                    }
                    if size > capacity {
                        violations.push(PropertyViolation::OverCapacity {
                            epoch,
                            size,
                            capacity,
                        });
                    }
                    *active_size = size;
                }
                _ => violations.push(PropertyViolation::StraySize { epoch }),
            },
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(epoch: u64) -> SegmentEvent {
        SegmentEvent::Created {
            path: PathBuf::from(format!("segment-{epoch}.wal")),
            epoch,
        }
    }

    #[test]
    fn test_valid_chain() {
        let events = [
            created(0),
            SegmentEvent::Size { epoch: 0, size: 60 },
            SegmentEvent::Size { epoch: 0, size: 100 },
            created(100),
            SegmentEvent::Size { epoch: 100, size: 10 },
        ];
        assert!(check_segment_chain(&events, 100).is_empty());
    }

    #[test]
    fn test_detects_gap_overflow_and_regression() {
        let events = [
            created(0),
            SegmentEvent::Size { epoch: 0, size: 120 },
            SegmentEvent::Size { epoch: 0, size: 90 },
            created(100),
            SegmentEvent::Size { epoch: 0, size: 5 },
        ];
        let violations = check_segment_chain(&events, 100);
        assert_eq!(
            violations,
            vec![
                PropertyViolation::OverCapacity {
                    epoch: 0,
                    size: 120,
                    capacity: 100
                },
                PropertyViolation::SizeRegression {
                    epoch: 0,
                    previous: 120,
                    size: 90
                },
                PropertyViolation::EpochGap {
                    epoch: 100,
                    expected: 90
                },
                PropertyViolation::StraySize { epoch: 0 },
            ]
        );
    }
}
