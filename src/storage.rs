// Manages the on-disk snapshot of the reference repository.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changes to MemoryRepository, Node or CalendarEntry serialization require
// incrementing SNAPSHOT_VERSION below.
use crate::context::AppContext;
use crate::store::MemoryRepository;
use anyhow::Result;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// Version history:
// - v1: initial format
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotData {
    #[serde(default)]
    version: u32,
    repository: MemoryRepository,
}

pub struct SnapshotStorage;

impl SnapshotStorage {
    /// Helper to get a sidecar lock file path
    fn get_lock_path(file_path: &Path) -> PathBuf {
        let mut lock_path = file_path.to_path_buf();
        if let Some(ext) = lock_path.extension() {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".lock");
            lock_path.set_extension(new_ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Runs `f` while holding an exclusive lock on a sidecar `.lock` file.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::get_lock_path(file_path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        file.lock_exclusive()?;
        let result = f();
        file.unlock()?;
        result
    }

    /// Atomic write: Write to .tmp file then rename
    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }

    /// Reads the snapshot at `path`. The caller holds the lock.
    fn read_snapshot(path: &Path) -> Result<MemoryRepository> {
        if !path.exists() {
            return Ok(MemoryRepository::new());
        }
        let json = fs::read_to_string(path)?;
        let data: SnapshotData = serde_json::from_str(&json).map_err(|e| {
            anyhow::anyhow!("Failed to read repository snapshot '{}': {}", path.display(), e)
        })?;
        if data.version > SNAPSHOT_VERSION {
            return Err(anyhow::anyhow!(
                "Repository snapshot version {} is newer than supported version {}",
                data.version,
                SNAPSHOT_VERSION
            ));
        }
        let mut repo = data.repository;
        repo.rebuild_index();
        Ok(repo)
    }

    /// Writes `repo` to `path`. The caller holds the lock.
    fn write_snapshot(path: &Path, repo: &MemoryRepository) -> Result<()> {
        let data = SnapshotData {
            version: SNAPSHOT_VERSION,
            repository: repo.clone(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        Self::atomic_write(path, json)
    }

    /// Load the repository snapshot, or a fresh repository if none exists yet.
    ///
    /// A snapshot that exists but cannot be read is an error, never an empty
    /// repository: saving over it would lose data.
    pub fn load(ctx: &dyn AppContext) -> Result<MemoryRepository> {
        let path = ctx.get_repository_path()?;
        if !path.exists() {
            return Ok(MemoryRepository::new());
        }
        Self::with_lock(&path, || Self::read_snapshot(&path))
    }

    pub fn save(ctx: &dyn AppContext, repo: &MemoryRepository) -> Result<()> {
        let path = ctx.get_repository_path()?;
        Self::with_lock(&path, || Self::write_snapshot(&path, repo))?;
        log::debug!("Repository snapshot written to {}", path.display());
        Ok(())
    }

    /// Load, apply `f` and save under one lock, so concurrent hosts cannot
    /// overwrite each other's changes. Nothing is written if `f` fails.
    pub fn modify<F, T>(ctx: &dyn AppContext, f: F) -> Result<T>
    where
        F: FnOnce(&mut MemoryRepository) -> Result<T>,
    {
        let path = ctx.get_repository_path()?;
        let value = Self::with_lock(&path, || {
            let mut repo = Self::read_snapshot(&path)?;
            let value = f(&mut repo)?;
            Self::write_snapshot(&path, &repo)?;
            Ok(value)
        })?;
        log::debug!("Repository snapshot updated at {}", path.display());
        Ok(value)
    }
}
