//! Storage environment
//!
//! An [`Environment`] owns the committed [`Tables`] and hands out
//! transactions. Write transactions are serialized by a single write lock, so
//! two writers never compute positions from the same sibling set; readers take
//! an `Arc` of the last committed tables and never block writers.
//!
//! A file-backed environment rewrites its snapshot on every commit: the body
//! is the JSON encoding of the tables, preceded by a header line carrying a
//! CRC32 of the body.

use crc32fast::Hasher;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{PersistenceError, Result, TransactionId};
use crate::slots::DEFAULT_SENTINEL_FRAME;
use crate::table::Tables;
use crate::txn::{Read, Transaction, Write};

/// Snapshot file name inside the environment directory
pub const SNAPSHOT_FILE: &str = "pagetree.json";

const SNAPSHOT_MAGIC: &str = "PAGETREE1";

/// Durability of file-backed commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Write the snapshot but do not fsync
    NoSync,
    /// fsync the snapshot before it replaces the previous one (default)
    FullSync,
}

/// Shared environment data
pub(crate) struct EnvInner {
    /// Snapshot path, `None` for in-memory environments
    path: Option<PathBuf>,
    /// Last committed transaction ID
    pub(crate) txn_id: AtomicU64,
    /// Write lock
    pub(crate) write_lock: Mutex<()>,
    /// Last committed tables
    pub(crate) committed: RwLock<Arc<Tables>>,
    /// Durability mode
    durability: DurabilityMode,
    /// Frame used to park widget rows during a swap
    sentinel_frame: i32,
    /// Fail the next commit (fault injection)
    fail_next_commit: AtomicBool,
}

impl EnvInner {
    /// Persist `tables` if file-backed. Called with the write lock held.
    pub(crate) fn persist(&self, tables: &Tables) -> std::result::Result<(), PersistenceError> {
        if self.fail_next_commit.swap(false, Ordering::AcqRel) {
            return Err(PersistenceError::Io("injected commit failure".into()));
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_vec(tables)?;
        let mut hasher = Hasher::new();
        hasher.update(&body);
        let header = format!("{} {:08x}\n", SNAPSHOT_MAGIC, hasher.finalize());

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(header.as_bytes())?;
            file.write_all(&body)?;
            if self.durability == DurabilityMode::FullSync {
                file.sync_all()?;
            }
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> std::result::Result<Tables, PersistenceError> {
    let bytes = fs::read(path)?;
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| PersistenceError::Corruption { details: "missing snapshot header".into() })?;
    let header = std::str::from_utf8(&bytes[..split])
        .map_err(|_| PersistenceError::Corruption { details: "snapshot header is not UTF-8".into() })?;
    let body = &bytes[split + 1..];

    let mut parts = header.split(' ');
    if parts.next() != Some(SNAPSHOT_MAGIC) {
        return Err(PersistenceError::Corruption { details: format!("unexpected header '{}'", header) });
    }
    let expected = parts
        .next()
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .ok_or_else(|| PersistenceError::Corruption { details: "missing snapshot checksum".into() })?;
    let mut hasher = Hasher::new();
    hasher.update(body);
    let found = hasher.finalize();
    if found != expected {
        return Err(PersistenceError::Corruption {
            details: format!("checksum mismatch: expected 0x{:08x}, got 0x{:08x}", expected, found),
        });
    }
    Ok(serde_json::from_slice(body)?)
}

/// Builder for creating environments
#[derive(Debug, Clone)]
pub struct EnvBuilder {
    durability: DurabilityMode,
    sentinel_frame: i32,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { durability: DurabilityMode::FullSync, sentinel_frame: DEFAULT_SENTINEL_FRAME }
    }

    /// Set the durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Set the frame used to park widget rows during a swap. Must be negative.
    pub fn sentinel_frame(mut self, frame: i32) -> Self {
        self.sentinel_frame = frame;
        self
    }

    /// Open a file-backed environment in `dir`, loading its snapshot if present
    pub fn open(self, dir: impl AsRef<Path>) -> Result<Environment> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);
        let tables = if path.exists() { load_snapshot(&path)? } else { Tables::default() };
        debug!(path = %path.display(), pages = tables.page_count(), "opened page store");
        self.build(Some(path), tables)
    }

    /// Open an environment that lives only in memory
    pub fn open_in_memory(self) -> Result<Environment> {
        self.build(None, Tables::default())
    }

    fn build(self, path: Option<PathBuf>, tables: Tables) -> Result<Environment> {
        if self.sentinel_frame >= 0 {
            return Err(crate::Error::InvalidOperation("sentinel frame must be negative"));
        }
        let inner = EnvInner {
            path,
            txn_id: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            committed: RwLock::new(Arc::new(tables)),
            durability: self.durability,
            sentinel_frame: self.sentinel_frame,
            fail_next_commit: AtomicBool::new(false),
        };
        Ok(Environment { inner: Arc::new(inner) })
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a page store; cheap to clone
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("path", &self.inner.path)
            .field("txn_id", &self.last_txn_id())
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Begin a read transaction
    pub fn read_txn(&self) -> Result<Transaction<'_, Read>> {
        Ok(Transaction::new_read(self))
    }

    /// Begin a write transaction, blocking until the write lock is free
    pub fn write_txn(&self) -> Result<Transaction<'_, Write>> {
        Ok(Transaction::new_write(self))
    }

    /// Get inner reference (for internal use)
    pub(crate) fn inner(&self) -> &EnvInner {
        &self.inner
    }

    /// ID of the last committed write transaction
    pub fn last_txn_id(&self) -> TransactionId {
        TransactionId(self.inner.txn_id.load(Ordering::Acquire))
    }

    /// Frame used to park widget rows during a swap
    pub fn sentinel_frame(&self) -> i32 {
        self.inner.sentinel_frame
    }

    /// Snapshot path, `None` for in-memory environments
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Make the next commit fail as if the snapshot write failed
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::Release);
    }
}
