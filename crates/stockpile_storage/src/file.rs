//! Directory-backed stores for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::repository::{validate_name, BlobInfo, BlobRepository};
use crate::state::StateStore;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TMP_SUFFIX: &str = ".tmp";
const STATE_SUFFIX: &str = ".state";

/// Writes `data` to `path` through a temporary sibling and a rename.
///
/// The rename makes the replacement atomic: readers see either the old or
/// the new content.
fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A blob repository storing one file per blob in a directory.
///
/// # Durability
///
/// Each `put` writes a temporary file, syncs it, and renames it over the
/// target, so a crash never leaves a half-written snapshot behind.
///
/// # Example
///
/// ```no_run
/// use stockpile_storage::{BlobRepository, FileRepository};
/// use std::path::Path;
///
/// let repo = FileRepository::open(Path::new("backups")).unwrap();
/// repo.put("snapshot-1.bak", b"payload").unwrap();
/// ```
#[derive(Debug)]
pub struct FileRepository {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRepository {
    /// Opens a repository rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the repository directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl BlobRepository for FileRepository {
    fn put(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.blob_path(name)?;
        let _guard = self.write_lock.lock();
        write_atomic(&path, data)?;
        tracing::debug!(name, bytes = data.len(), "stored blob");
        Ok(())
    }

    fn get(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.blob_path(name)?;
        read_optional(&path)?.ok_or_else(|| StorageError::not_found(name))
    }

    fn list(&self) -> StorageResult<Vec<BlobInfo>> {
        let mut blobs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            blobs.push(BlobInfo {
                name,
                size: metadata.len(),
            });
        }
        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }

    fn remove(&self, names: &[String]) -> StorageResult<usize> {
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for name in names {
            let path = self.blob_path(name)?;
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn signed_url(&self, name: &str, ttl: Duration) -> StorageResult<String> {
        let path = self.blob_path(name)?;
        if !path.is_file() {
            return Err(StorageError::not_found(name));
        }
        let expires = SystemTime::now()
            .checked_add(ttl)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(u64::MAX);
        Ok(format!("file://{}?expires={expires}", path.display()))
    }
}

/// A state store keeping one file per key in a directory.
#[derive(Debug)]
pub struct FileStateStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Opens a state store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_name(key)?;
        Ok(self.root.join(format!("{key}{STATE_SUFFIX}")))
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.key_path(key)?)
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock();
        write_atomic(&path, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
