//! Smash a write-ahead log with random writes and cursor-following reads.
//!
//! ```bash
//! strata-smash --partitions 64 --shards 8 --writes 10000 --concurrency 16
//! ```
//!
//! Without `--data-dir` the log lives in a temporary directory that is
//! removed on exit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use futures::future::try_join_all;
use strata_core::PartitionId;
use strata_log::{LogConfig, WriteAheadLog};
use strata_routing::TopicType;
use strata_wal::{CompressionType, TokioStorage};
use strata_workload::{Smash, SmashConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Value codec tag for large records.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Compression {
    /// No compression.
    #[default]
    None,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl From<Compression> for CompressionType {
    fn from(c: Compression) -> Self {
        match c {
            Compression::None => Self::None,
            Compression::Lz4 => Self::Lz4,
            Compression::Zstd => Self::Zstd,
        }
    }
}

/// Strata write-ahead log workload driver.
#[derive(Parser, Debug)]
#[command(name = "strata-smash")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory. A temporary directory is used if not given.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Namespace of the topic.
    #[arg(long, default_value = "smash")]
    namespace: String,

    /// Topic name.
    #[arg(long, default_value = "smash-topic")]
    topic: String,

    /// Partition count.
    #[arg(long, default_value = "16")]
    partitions: u32,

    /// Create a compaction topic, whose segments are key-indexed.
    #[arg(long)]
    compaction: bool,

    /// Shard count. Defaults to one per CPU.
    #[arg(long)]
    shards: Option<u32>,

    /// Segment size in bytes.
    #[arg(long, default_value = "67108864")]
    segment_size: u64,

    /// Background flush interval in milliseconds.
    #[arg(long, default_value = "1000")]
    flush_interval_ms: u64,

    /// Number of write rounds; each round writes one batch per partition.
    #[arg(long, default_value = "1000")]
    writes: u64,

    /// Records per partition per write.
    #[arg(long, default_value = "1")]
    batch_size: usize,

    /// Random key length.
    #[arg(long, default_value = "20")]
    key_bytes: usize,

    /// Random value length.
    #[arg(long, default_value = "100")]
    value_bytes: usize,

    /// Codec tag for values of at least `--compression-threshold` bytes.
    #[arg(long, value_enum, default_value = "none")]
    compression: Compression,

    /// Value length from which `--compression` applies.
    #[arg(long, default_value = "512")]
    compression_threshold: usize,

    /// `max_bytes` of each read.
    #[arg(long, default_value = "65536")]
    max_read_bytes: u64,

    /// Concurrent writers and readers.
    #[arg(long, default_value = "4")]
    concurrency: u64,

    /// Generator seed.
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let temp_dir = tempfile::tempdir()?;
    let data_dir = args.data_dir.clone().unwrap_or_else(|| temp_dir.path().to_path_buf());

    let mut log_config = LogConfig::new(&data_dir)
        .with_max_log_segment_size(args.segment_size)
        .with_flush_interval(Duration::from_millis(args.flush_interval_ms));
    if let Some(shards) = args.shards {
        log_config = log_config.with_shard_count(shards);
    }
    let wal = Arc::new(WriteAheadLog::open(Arc::new(TokioStorage::new()), log_config).await?);

    let topic_type = if args.compaction {
        TopicType::Compaction
    } else {
        TopicType::Regular
    };
    let smash_config = SmashConfig::new(&args.namespace, &args.topic)
        .with_partitions(args.partitions)
        .with_topic_type(topic_type)
        .with_write_batch_size(args.batch_size)
        .with_record_bytes(args.key_bytes, args.value_bytes)
        .with_compression(args.compression.into(), args.compression_threshold)
        .with_max_read_bytes(args.max_read_bytes)
        .with_seed(args.seed);
    let smash = Arc::new(Smash::new(smash_config, wal.clone())?);

    info!(
        data_dir = %data_dir.display(),
        partitions = args.partitions,
        shards = wal.assignment().shard_count(),
        "Starting smash"
    );
    smash.create().await?;

    let start = Instant::now();
    let writers = (0..args.concurrency).map(|worker| {
        let smash = smash.clone();
        let rounds = args.writes;
        let concurrency = args.concurrency;
        tokio::spawn(async move {
            for _ in (worker..rounds).step_by(usize::try_from(concurrency).unwrap_or(1)) {
                smash.write_all().await?;
            }
            Ok::<_, strata_workload::WorkloadError>(())
        })
    });
    for result in try_join_all(writers).await? {
        result?;
    }
    let write_elapsed = start.elapsed();

    // Drain every partition.
    let readers = (0..args.partitions).map(|p| {
        let smash = smash.clone();
        tokio::spawn(async move {
            let partition = PartitionId::new(u64::from(p));
            while !smash.read_one(Some(partition)).await?.records.is_empty() {}
            Ok::<_, strata_workload::WorkloadError>(())
        })
    });
    for result in try_join_all(readers).await? {
        result?;
    }

    wal.shutdown().await?;

    let stats = smash.stats();
    stats.print_summary();
    println!("Write phase: {:.2}s", write_elapsed.as_secs_f64());
    println!("Total: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
