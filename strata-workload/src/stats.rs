//! Counters and latency histograms of a workload run.

use std::time::Duration;

use hdrhistogram::Histogram;

use crate::error::WorkloadResult;

/// Significant figures kept by the latency histograms.
const HISTOGRAM_SIGFIG: u8 = 3;

/// Statistics gathered by a [`crate::Smash`].
#[derive(Debug, Clone)]
pub struct SmashStats {
    /// Put requests completed.
    pub writes: u64,
    /// Records written.
    pub records_written: u64,
    /// Encoded bytes written.
    pub bytes_written: u64,
    /// Get requests completed.
    pub reads: u64,
    /// Records read.
    pub records_read: u64,
    /// Bytes returned by reads.
    pub bytes_read: u64,
    /// Put latency in microseconds.
    pub write_latency_us: Histogram<u64>,
    /// Get latency in microseconds.
    pub read_latency_us: Histogram<u64>,
}

impl SmashStats {
    /// Creates empty statistics.
    ///
    /// # Errors
    /// Returns an error if the histograms cannot be allocated.
    pub fn new() -> WorkloadResult<Self> {
        Ok(Self {
            writes: 0,
            records_written: 0,
            bytes_written: 0,
            reads: 0,
            records_read: 0,
            bytes_read: 0,
            write_latency_us: Histogram::new(HISTOGRAM_SIGFIG)?,
            read_latency_us: Histogram::new(HISTOGRAM_SIGFIG)?,
        })
    }

    pub(crate) fn record_write(&mut self, records: u64, bytes: u64, latency: Duration) {
        self.writes += 1;
        self.records_written += records;
        self.bytes_written += bytes;
        self.write_latency_us.saturating_record(micros(latency));
    }

    pub(crate) fn record_read(&mut self, records: u64, bytes: u64, latency: Duration) {
        self.reads += 1;
        self.records_read += records;
        self.bytes_read += bytes;
        self.read_latency_us.saturating_record(micros(latency));
    }

    /// Prints a human-readable summary.
    pub fn print_summary(&self) {
        println!("=== Smash Statistics ===");
        println!(
            "Writes: {} requests, {} records, {} bytes",
            self.writes, self.records_written, self.bytes_written
        );
        println!(
            "Reads:  {} requests, {} records, {} bytes",
            self.reads, self.records_read, self.bytes_read
        );
        print_latency("Write", &self.write_latency_us);
        print_latency("Read", &self.read_latency_us);
    }
}

#[allow(clippy::cast_possible_truncation)] // A u64 of microseconds spans 584k years.
const fn micros(latency: Duration) -> u64 {
    latency.as_micros() as u64
}

fn print_latency(label: &str, histogram: &Histogram<u64>) {
    if histogram.is_empty() {
        println!("{label} latency: no samples");
        return;
    }
    println!(
        "{label} latency: p50={}us p99={}us p99.9={}us max={}us",
        histogram.value_at_quantile(0.50),
        histogram.value_at_quantile(0.99),
        histogram.value_at_quantile(0.999),
        histogram.max()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_counters_and_latency() {
        let mut stats = SmashStats::new().unwrap();
        stats.record_write(4, 400, Duration::from_micros(150));
        stats.record_write(1, 100, Duration::from_micros(50));
        stats.record_read(5, 500, Duration::from_micros(20));

        assert_eq!(stats.writes, 2);
        assert_eq!(stats.records_written, 5);
        assert_eq!(stats.bytes_written, 500);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.write_latency_us.len(), 2);
        assert!(stats.write_latency_us.max() >= 150);
    }
}
