//! File and directory naming.
//!
//! Segments are named `<prefix><epoch>.wal`, their index files
//! `<prefix><epoch>.wal.index`, and partition directories end in the
//! partition number. The patterns are compiled once per process.

use std::sync::LazyLock;

use regex::Regex;

/// File extension of segment files.
pub const SEGMENT_EXTENSION: &str = "wal";

/// Suffix appended to a segment file name to name its index file.
pub const INDEX_SUFFIX: &str = ".index";

/// Default prefix of segment file names.
pub const DEFAULT_SEGMENT_PREFIX: &str = "segment-";

// `[[:ascii:]]+[^0-9]+` forces the optional prefix to end in a non-digit so
// the whole trailing number lands in the capture.
static EPOCH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[[:ascii:]]+[^0-9]+)?([0-9]+)\.wal$").expect("epoch pattern is valid")
});

static PARTITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[[:ascii:]]+[^0-9]+)?([0-9]+)$").expect("partition pattern is valid")
});

static NS_TOPIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[[:graph:]&&[^/.]]+$").expect("name pattern is valid"));

/// Returns the epoch encoded in a segment file name.
///
/// `None` when the name is not a segment name or the number does not fit.
#[must_use]
pub fn extract_epoch(filename: &str) -> Option<u64> {
    EPOCH_PATTERN
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Returns true if `filename` looks like a segment file.
#[must_use]
pub fn is_segment_file(filename: &str) -> bool {
    EPOCH_PATTERN.is_match(filename)
}

/// Returns true if `name` is usable as a namespace or topic directory name.
///
/// Printable ASCII only, no path separators and no dots.
#[must_use]
pub fn is_valid_ns_topic_name(name: &str) -> bool {
    NS_TOPIC_PATTERN.is_match(name)
}

/// Returns true if `name` is a partition directory name.
#[must_use]
pub fn is_valid_partition_dir(name: &str) -> bool {
    PARTITION_PATTERN.is_match(name)
}

/// Returns the partition number a partition directory name ends in.
#[must_use]
pub fn extract_partition(name: &str) -> Option<u32> {
    PARTITION_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Builds the file name of the segment starting at `epoch`.
#[must_use]
pub fn segment_file_name(prefix: &str, epoch: u64) -> String {
    format!("{prefix}{epoch}.{SEGMENT_EXTENSION}")
}

/// Builds the index file name for a segment file name.
#[must_use]
pub fn index_file_name(segment_file_name: &str) -> String {
    format!("{segment_file_name}{INDEX_SUFFIX}")
}
