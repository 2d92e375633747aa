use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
    result,
    sync::{Mutex, PoisonError},
};

use fs2::FileExt;
use tracing::debug;

use crate::{error::MintPoolError, mint_pool::MintPool};

pub type Result<T> = result::Result<T, MintPoolError>;

/// Default file name of the persisted pool record
pub const DEFAULT_STORE_FILE: &str = "poap-storage.json";

/// Durable home of the pool record.
///
/// Only the pool is stored; the allow-list is rebuilt on every start.
pub trait PoolStore: Send + Sync {
    /// Read the persisted pool, `None` if nothing has been written yet.
    fn load(&self) -> Result<Option<MintPool>>;

    /// Replace the persisted pool unconditionally.
    fn save(&self, pool: &MintPool) -> Result<()>;

    /// Replace the persisted pool only if it still equals `expected`.
    /// Fails with [`MintPoolError::StoreConflict`] otherwise, leaving the record as is.
    /// An empty store accepts any write.
    fn compare_and_swap(&self, expected: &MintPool, new: &MintPool) -> Result<()>;
}

/// Keeps the pool record as a single JSON document on disk.
///
/// Writers serialize on an exclusive advisory lock over `<path>.lock`, so any
/// number of stores (in one process or several) may point at the same file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut lock_path = self.path.as_os_str().to_owned();
        lock_path.push(".lock");
        PathBuf::from(lock_path)
    }

    /// Blocks until this store holds the write lock. Released when the file drops.
    fn lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

impl PoolStore for JsonFileStore {
    fn load(&self) -> Result<Option<MintPool>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(MintPool::new_from_file(&self.path)?))
    }

    fn save(&self, pool: &MintPool) -> Result<()> {
        let _lock = self.lock()?;
        pool.write_to_file(&self.path)
    }

    fn compare_and_swap(&self, expected: &MintPool, new: &MintPool) -> Result<()> {
        let _lock = self.lock()?;
        if let Some(current) = self.load()? {
            if current != *expected {
                return Err(MintPoolError::StoreConflict);
            }
        }

        match new.write_to_file(&self.path) {
            Err(MintPoolError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("staged pool vanished before rename: {}", e);
                Err(MintPoolError::StoreConflict)
            }
            result => result,
        }
    }
}

/// Process-local store, for ephemeral deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pool: Mutex<Option<MintPool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PoolStore for MemoryStore {
    fn load(&self) -> Result<Option<MintPool>> {
        Ok(self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, pool: &MintPool) -> Result<()> {
        *self.pool.lock().unwrap_or_else(PoisonError::into_inner) = Some(pool.clone());
        Ok(())
    }

    fn compare_and_swap(&self, expected: &MintPool, new: &MintPool) -> Result<()> {
        let mut current = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|pool| pool != expected) {
            return Err(MintPoolError::StoreConflict);
        }
        *current = Some(new.clone());
        Ok(())
    }
}
