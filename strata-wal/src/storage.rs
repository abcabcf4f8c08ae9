//! Storage abstraction for the WAL.
//!
//! Segments and index files are written through the [`Storage`] trait so the
//! same writer node runs on `tokio::fs` in production and on an in-memory,
//! fault-injecting backend in simulation tests.
//!
//! The trait handles raw bytes at offsets. Segment capacity, record framing
//! and checksums live above it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{WalError, WalResult};

/// Storage backend trait for segment and index files.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Creates a new file at the given path for reading and writing.
    ///
    /// Never truncates existing data: if the path already exists this fails
    /// with [`WalError::SegmentExists`].
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be created.
    async fn create(&self, path: &Path) -> WalResult<Box<dyn StorageFile>>;

    /// Opens an existing file for reading and writing.
    ///
    /// # Errors
    /// Returns an error if the file does not exist or cannot be opened.
    async fn open(&self, path: &Path) -> WalResult<Box<dyn StorageFile>>;

    /// Checks if a file exists at the given path.
    async fn exists(&self, path: &Path) -> WalResult<bool>;

    /// Lists files directly inside `dir` whose extension is `extension`,
    /// sorted by path.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    async fn list_files(&self, dir: &Path, extension: &str) -> WalResult<Vec<PathBuf>>;

    /// Removes a file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be removed.
    async fn remove(&self, path: &Path) -> WalResult<()>;

    /// Creates a directory and all parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    async fn create_dir_all(&self, path: &Path) -> WalResult<()>;
}

/// A handle to an open file.
#[async_trait]
pub trait StorageFile: Send + Sync {
    /// Writes data at the specified offset.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    async fn write_at(&self, offset: u64, data: &[u8]) -> WalResult<()>;

    /// Reads up to `len` bytes from the specified offset.
    ///
    /// Returns fewer bytes than requested at end of file.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    async fn read_at(&self, offset: u64, len: usize) -> WalResult<Bytes>;

    /// Reads the entire file contents.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    async fn read_all(&self) -> WalResult<Bytes>;

    /// Syncs all written data to stable storage (fsync).
    ///
    /// # Errors
    /// Returns an error if the sync fails.
    async fn sync(&self) -> WalResult<()>;

    /// Returns the current file size in bytes.
    ///
    /// # Errors
    /// Returns an error if the size cannot be determined.
    async fn size(&self) -> WalResult<u64>;

    /// Truncates the file to the specified length.
    ///
    /// # Errors
    /// Returns an error if the truncation fails.
    async fn truncate(&self, len: u64) -> WalResult<()>;
}

/// Tokio-based file storage.
///
/// `tokio::fs` runs blocking syscalls on a thread pool, which is portable and
/// good enough for the segment sizes the writer node produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioStorage;

impl TokioStorage {
    /// Creates a new Tokio storage instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for TokioStorage {
    async fn create(&self, path: &Path) -> WalResult<Box<dyn StorageFile>> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    WalError::SegmentExists {
                        path: path.to_path_buf(),
                    }
                } else {
                    WalError::io("create", e)
                }
            })?;

        Ok(Box::new(TokioFile {
            file: tokio::sync::Mutex::new(file),
        }))
    }

    async fn open(&self, path: &Path) -> WalResult<Box<dyn StorageFile>> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| WalError::io("open", e))?;

        Ok(Box::new(TokioFile {
            file: tokio::sync::Mutex::new(file),
        }))
    }

    async fn exists(&self, path: &Path) -> WalResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| WalError::io("exists", e))
    }

    async fn list_files(&self, dir: &Path, extension: &str) -> WalResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| WalError::io("read_dir", e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WalError::io("read_dir_entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == extension) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    async fn remove(&self, path: &Path) -> WalResult<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| WalError::io("remove", e))
    }

    async fn create_dir_all(&self, path: &Path) -> WalResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| WalError::io("create_dir_all", e))
    }
}

/// A file handle using `tokio::fs`.
struct TokioFile {
    file: tokio::sync::Mutex<tokio::fs::File>,
}

// Holding the lock for the full seek+io sequence is required for positional io.
#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl StorageFile for TokioFile {
    async fn write_at(&self, offset: u64, data: &[u8]) -> WalResult<()> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| WalError::io("seek", e))?;
        file.write_all(data)
            .await
            .map_err(|e| WalError::io("write", e))?;
        Ok(())
    }

    async fn read_at(&self, offset: u64, len: usize) -> WalResult<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| WalError::io("seek", e))?;

        // A single read may return short; keep going until EOF or `len`.
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| WalError::io("read", e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn read_all(&self) -> WalResult<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(0))
            .await
            .map_err(|e| WalError::io("seek", e))?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| WalError::io("read", e))?;
        Ok(Bytes::from(buf))
    }

    async fn sync(&self) -> WalResult<()> {
        let file = self.file.lock().await;
        file.sync_all().await.map_err(|e| WalError::io("sync", e))
    }

    async fn size(&self) -> WalResult<u64> {
        let file = self.file.lock().await;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| WalError::io("metadata", e))?;
        Ok(metadata.len())
    }

    async fn truncate(&self, len: u64) -> WalResult<()> {
        let file = self.file.lock().await;
        file.set_len(len)
            .await
            .map_err(|e| WalError::io("truncate", e))
    }
}

// ----------------------------------------------------------------------------
// Simulated storage for deterministic simulation testing
// ----------------------------------------------------------------------------

/// Fault injection switches for [`SimulatedStorage`].
///
/// Every `force_*` flag is one-shot: it fires on the next matching call and
/// clears itself.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of fsync failing. Range: 0.0 - 1.0.
    pub fsync_fail_rate: f64,
    /// Next write is torn after this many bytes.
    pub force_torn_write_at: Option<usize>,
    /// Next fsync fails.
    pub force_fsync_fail: bool,
    /// Next write fails with disk full.
    pub force_disk_full: bool,
    /// Next create fails with an I/O error.
    pub force_create_fail: bool,
}

impl FaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the fsync fail rate.
    #[must_use]
    pub const fn with_fsync_fail_rate(mut self, rate: f64) -> Self {
        self.fsync_fail_rate = rate;
        self
    }

    /// Forces the next write to be torn at the specified byte offset.
    #[must_use]
    pub const fn with_force_torn_write_at(mut self, offset: usize) -> Self {
        self.force_torn_write_at = Some(offset);
        self
    }

    /// Forces the next fsync to fail.
    #[must_use]
    pub const fn with_force_fsync_fail(mut self) -> Self {
        self.force_fsync_fail = true;
        self
    }

    /// Forces the next write to fail with disk full error.
    #[must_use]
    pub const fn with_force_disk_full(mut self) -> Self {
        self.force_disk_full = true;
        self
    }

    /// Forces the next file creation to fail.
    #[must_use]
    pub const fn with_force_create_fail(mut self) -> Self {
        self.force_create_fail = true;
        self
    }
}

type FileMap = HashMap<PathBuf, SimulatedContent>;

#[derive(Debug, Default)]
struct SimulatedContent {
    data: Vec<u8>,
    syncs: u64,
}

/// In-memory simulated storage for deterministic testing.
///
/// Clones share the same files and fault configuration, so a test can keep a
/// handle for inspection while the writer node owns another.
///
/// # Panics
///
/// Methods panic if an internal mutex is poisoned, which only happens after a
/// panic inside a critical section. Acceptable for test storage.
#[derive(Debug, Clone)]
#[allow(clippy::missing_panics_doc)]
pub struct SimulatedStorage {
    files: Arc<Mutex<FileMap>>,
    fault_config: Arc<Mutex<FaultConfig>>,
    seed: u64,
}

#[allow(clippy::missing_panics_doc)]
impl SimulatedStorage {
    /// Creates a new simulated storage with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, FaultConfig::default())
    }

    /// Creates a new simulated storage with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: FaultConfig) -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
        }
    }

    /// Returns the fault configuration for modification.
    pub fn fault_config(&self) -> MutexGuard<'_, FaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Gets the raw file content for inspection in tests.
    #[must_use]
    pub fn get_raw_content(&self, path: &Path) -> Option<Vec<u8>> {
        let files = self.files.lock().expect("files lock poisoned");
        files.get(path).map(|c| c.data.clone())
    }

    /// Sets raw file content directly (for simulating corruption).
    pub fn set_raw_content(&self, path: &Path, content: Vec<u8>) {
        let mut files = self.files.lock().expect("files lock poisoned");
        files.entry(path.to_path_buf()).or_default().data = content;
    }

    /// Returns how many successful fsyncs the file has seen.
    #[must_use]
    pub fn sync_count(&self, path: &Path) -> u64 {
        let files = self.files.lock().expect("files lock poisoned");
        files.get(path).map_or(0, |c| c.syncs)
    }

    /// Returns every file path currently stored, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().expect("files lock poisoned");
        let mut paths: Vec<_> = files.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn handle(&self, path: &Path) -> Box<dyn StorageFile> {
        Box::new(SimulatedFile {
            path: path.to_path_buf(),
            files: self.files.clone(),
            fault_config: self.fault_config.clone(),
            seed: self.seed,
            op_counter: AtomicU64::new(0),
        })
    }
}

#[async_trait]
#[allow(clippy::significant_drop_tightening)]
impl Storage for SimulatedStorage {
    async fn create(&self, path: &Path) -> WalResult<Box<dyn StorageFile>> {
        {
            let mut config = self.fault_config.lock().expect("fault config lock poisoned");
            if config.force_create_fail {
                config.force_create_fail = false;
                return Err(WalError::io("create", "create failed (simulated)"));
            }
        }

        let mut files = self.files.lock().expect("files lock poisoned");
        if files.contains_key(path) {
            return Err(WalError::SegmentExists {
                path: path.to_path_buf(),
            });
        }
        files.insert(path.to_path_buf(), SimulatedContent::default());
        drop(files);

        Ok(self.handle(path))
    }

    async fn open(&self, path: &Path) -> WalResult<Box<dyn StorageFile>> {
        let files = self.files.lock().expect("files lock poisoned");
        if !files.contains_key(path) {
            return Err(WalError::io("open", "file not found"));
        }
        drop(files);

        Ok(self.handle(path))
    }

    async fn exists(&self, path: &Path) -> WalResult<bool> {
        let files = self.files.lock().expect("files lock poisoned");
        Ok(files.contains_key(path))
    }

    async fn list_files(&self, dir: &Path, extension: &str) -> WalResult<Vec<PathBuf>> {
        let files = self.files.lock().expect("files lock poisoned");
        let mut result: Vec<_> = files
            .keys()
            .filter(|p| p.parent() == Some(dir) && p.extension().is_some_and(|e| e == extension))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    async fn remove(&self, path: &Path) -> WalResult<()> {
        let mut files = self.files.lock().expect("files lock poisoned");
        files.remove(path);
        Ok(())
    }

    async fn create_dir_all(&self, _path: &Path) -> WalResult<()> {
        // Directories are implicit in simulated storage.
        Ok(())
    }
}

/// A simulated file handle with fault injection.
struct SimulatedFile {
    path: PathBuf,
    files: Arc<Mutex<FileMap>>,
    fault_config: Arc<Mutex<FaultConfig>>,
    seed: u64,
    op_counter: AtomicU64,
}

impl SimulatedFile {
    /// Deterministic coin flip from the seed and an operation counter.
    #[allow(clippy::cast_precision_loss)]
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.op_counter.fetch_add(1, Ordering::Relaxed);
        let hash = self.seed.wrapping_add(counter).wrapping_mul(0x5851_f42d_4c95_7f2d);
        (hash as f64) / (u64::MAX as f64) < rate
    }

    fn not_found(operation: &'static str) -> WalError {
        WalError::io(operation, "file not found")
    }
}

#[async_trait]
#[allow(clippy::significant_drop_tightening, clippy::cast_possible_truncation)]
impl StorageFile for SimulatedFile {
    async fn write_at(&self, offset: u64, data: &[u8]) -> WalResult<()> {
        let torn_at = {
            let mut config = self.fault_config.lock().expect("fault config lock poisoned");
            if config.force_disk_full {
                config.force_disk_full = false;
                return Err(WalError::io("write", "disk full (simulated)"));
            }
            config.force_torn_write_at.take()
        };

        let mut files = self.files.lock().expect("files lock poisoned");
        let content = files
            .get_mut(&self.path)
            .ok_or_else(|| Self::not_found("write"))?;

        let start = offset as usize;
        let write_len = torn_at.unwrap_or(data.len()).min(data.len());
        let end = start + write_len;
        if content.data.len() < end {
            content.data.resize(end, 0);
        }
        content.data[start..end].copy_from_slice(&data[..write_len]);

        // A torn write leaves the file cut at the tear, as after a crash.
        if torn_at.is_some() {
            content.data.truncate(end);
        }

        Ok(())
    }

    async fn read_at(&self, offset: u64, len: usize) -> WalResult<Bytes> {
        let files = self.files.lock().expect("files lock poisoned");
        let content = files.get(&self.path).ok_or_else(|| Self::not_found("read"))?;

        let start = offset as usize;
        if start >= content.data.len() {
            return Ok(Bytes::new());
        }
        let end = std::cmp::min(start + len, content.data.len());
        Ok(Bytes::copy_from_slice(&content.data[start..end]))
    }

    async fn read_all(&self) -> WalResult<Bytes> {
        let files = self.files.lock().expect("files lock poisoned");
        let content = files.get(&self.path).ok_or_else(|| Self::not_found("read"))?;
        Ok(Bytes::copy_from_slice(&content.data))
    }

    async fn sync(&self) -> WalResult<()> {
        let fail = {
            let mut config = self.fault_config.lock().expect("fault config lock poisoned");
            let forced = std::mem::take(&mut config.force_fsync_fail);
            forced || self.should_inject_fault(config.fsync_fail_rate)
        };
        if fail {
            return Err(WalError::io("sync", "fsync failed (simulated)"));
        }

        let mut files = self.files.lock().expect("files lock poisoned");
        let content = files
            .get_mut(&self.path)
            .ok_or_else(|| Self::not_found("sync"))?;
        content.syncs += 1;
        Ok(())
    }

    async fn size(&self) -> WalResult<u64> {
        let files = self.files.lock().expect("files lock poisoned");
        let content = files.get(&self.path).ok_or_else(|| Self::not_found("size"))?;
        Ok(content.data.len() as u64)
    }

    async fn truncate(&self, len: u64) -> WalResult<()> {
        let mut files = self.files.lock().expect("files lock poisoned");
        let content = files
            .get_mut(&self.path)
            .ok_or_else(|| Self::not_found("truncate"))?;
        content.data.truncate(len as usize);
        Ok(())
    }
}
