//! Loading, storing and locking the cache file.
//!
//! The cache is a single file guarded by an advisory lock at
//! `<path>.lck`, taken non-blocking so a second running instance fails
//! fast instead of queueing up behind the first. The lock is held for
//! the whole process run: acquired at load (or before the first write,
//! when no file existed yet) and released by [`CacheStore::store`] or by
//! error-driven teardown.

use crate::error::{ErrorKind, Result};
use crate::models::{CacheFeedEntry, FeedId};
use crate::retain;
use crate::version::{CURRENT_VERSION, Snapshot, Version};
use advisory_lock::{AdvisoryFileLock, FileLockMode};
use exn::{OptionExt, ResultExt};
use plumage_feed::Descriptor;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// The held advisory lock. Dropping it without [`release`](Self::release)
/// unlocks the fd but leaves the lock file behind; release also removes
/// the file (its absence is never an error).
#[derive(Debug)]
struct CacheLock {
    file: std::fs::File,
    path: PathBuf,
}

impl CacheLock {
    fn acquire(cache_path: &Path) -> Result<Self> {
        let path = lock_path(cache_path);
        debug!("handling lock file '{}'", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .or_raise(|| ErrorKind::Lock(path.clone()))?;
        // called via the trait so std's own `File::try_lock` cannot shadow it
        AdvisoryFileLock::try_lock(&file, FileLockMode::Exclusive)
            .or_raise(|| ErrorKind::Lock(path.clone()))?;

        Ok(Self { file, path })
    }

    fn release(self) {
        let _ = AdvisoryFileLock::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path(cache_path: &Path) -> PathBuf {
    let mut path = cache_path.as_os_str().to_os_string();
    path.push(".lck");
    path.into()
}

/// Owner of the whole in-memory cache and its file lock.
#[derive(Debug)]
pub struct CacheStore {
    snapshot: Snapshot,
    lock: Option<CacheLock>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// A fresh, empty, current-version cache. No lock is taken; the
    /// first [`store`](Self::store) acquires one before writing.
    pub fn new() -> Self {
        Self { snapshot: Snapshot::new_current(), lock: None }
    }

    /// Load the cache at `path`, taking the advisory lock.
    ///
    /// A missing file is not an error and behaves like [`new`](Self::new).
    /// With `migrate` unset an older-version cache is kept as-is: usable
    /// for inspection, but refused by [`store`](Self::store).
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, migrate: bool) -> Result<Self> {
        if !path.exists() {
            debug!("no cache file yet, starting empty");
            return Ok(Self::new());
        }

        let lock = CacheLock::acquire(path)?;
        match Self::read(path, migrate) {
            Ok(snapshot) => Ok(Self { snapshot, lock: Some(lock) }),
            Err(err) => {
                // never leave the lock behind on a failed load
                lock.release();
                Err(err)
            },
        }
    }

    fn read(path: &Path, migrate: bool) -> Result<Snapshot> {
        info!("loading cache from '{}'", path.display());

        let bytes = fs::read(path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let (&version_byte, payload) =
            bytes.split_first().ok_or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let version = Version::from_byte(version_byte)?;

        let snapshot =
            Snapshot::decode(version, payload).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;

        if migrate && snapshot.version() != CURRENT_VERSION {
            let snapshot = snapshot.transform_to(CURRENT_VERSION)?;
            info!("loaded cache (version {version}), transformed to version {CURRENT_VERSION}");
            Ok(snapshot)
        } else {
            info!("loaded cache (version {version})");
            Ok(snapshot)
        }
    }

    /// Write the cache to `path` and release the lock.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn store(&mut self, path: &Path) -> Result<()> {
        if self.snapshot.version() != CURRENT_VERSION {
            exn::bail!(ErrorKind::StoreVersion(self.snapshot.version().as_byte()));
        }
        if self.lock.is_none() {
            self.lock = Some(CacheLock::acquire(path)?);
        }

        let mut bytes = vec![CURRENT_VERSION.as_byte()];
        bytes.extend(self.snapshot.encode()?);
        fs::write(path, &bytes).or_raise(|| ErrorKind::Write(path.to_path_buf()))?;

        info!("stored cache to '{}'", path.display());
        self.unlock();
        Ok(())
    }

    /// Release the lock without storing. Idempotent.
    pub fn unlock(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }

    pub fn version(&self) -> Version {
        self.snapshot.version()
    }

    /// Resolve a descriptor to its feed id, allocating or reassigning
    /// one as needed (renames and url changes keep the old id).
    pub fn resolve(&mut self, descriptor: &Descriptor) -> FeedId {
        self.snapshot.data_mut().resolve(descriptor)
    }

    /// The entry for a resolved feed, created on first touch.
    pub fn entry(&mut self, id: FeedId) -> &mut CacheFeedEntry {
        self.snapshot.data_mut().entry(id)
    }

    /// Drop feeds that are stale and no longer configured.
    pub fn evict_stale(&mut self, known: &HashSet<Descriptor>) {
        retain::evict_stale(self.snapshot.data_mut(), known);
    }

    pub fn summary(&self) -> String {
        self.snapshot.data().summary()
    }

    pub fn feed_info(&self, hex_id: &str) -> Option<String> {
        self.snapshot.data().feed_info(hex_id)
    }

    #[cfg(test)]
    pub(crate) fn data(&self) -> &crate::data::CacheData {
        self.snapshot.data()
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plumage_feed::Item;
    use tempfile::tempdir;

    fn descriptor(name: &str) -> Descriptor {
        Descriptor { name: name.into(), url: format!("https://example.org/{name}") }
    }

    fn populated_store() -> CacheStore {
        let mut store = CacheStore::new();
        let id = store.resolve(&descriptor("a"));
        let entry = store.entry(id);
        entry.checked(false);
        let diff = entry.diff(vec![Item::new("g1", "one", "https://example.org/1")], false, false);
        entry.stage(diff);
        entry.commit();
        store
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = CacheStore::load(&dir.path().join("feed.cache"), true).unwrap();
        assert_eq!(store.version(), CURRENT_VERSION);
        assert!(store.data().ids.is_empty());
    }

    #[test]
    fn store_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.cache");

        let mut store = populated_store();
        let expected = store.data().clone();
        store.store(&path).unwrap();

        let loaded = CacheStore::load(&path, true).unwrap();
        assert_eq!(loaded.data(), &expected);
    }

    #[test]
    fn store_removes_the_lock_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.cache");
        populated_store().store(&path).unwrap();
        assert!(path.exists());
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn second_open_fails_fast_while_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.cache");
        populated_store().store(&path).unwrap();

        let first = CacheStore::load(&path, true).unwrap();
        let err = CacheStore::load(&path, true).unwrap_err();
        assert!(matches!(*err, ErrorKind::Lock(_)));
        drop(first);

        // releasing the first lock frees the path again
        CacheStore::load(&path, true).unwrap();
    }

    #[test]
    fn failed_load_releases_the_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.cache");
        fs::write(&path, [9u8, 0, 0]).unwrap();

        let err = CacheStore::load(&path, true).unwrap_err();
        assert!(matches!(*err, ErrorKind::UnknownVersion(9)));
        // the lock must have been released despite the error
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn truncated_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.cache");
        fs::write(&path, []).unwrap();
        let err = CacheStore::load(&path, true).unwrap_err();
        assert!(matches!(*err, ErrorKind::Read(_)));
    }

    #[test]
    fn v1_file_is_migrated_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.cache");

        let store = populated_store();
        let mut bytes = vec![Version::V1.as_byte()];
        bytes.extend(Snapshot::V1(store.data().clone()).encode().unwrap());
        fs::write(&path, &bytes).unwrap();

        let migrated = CacheStore::load(&path, true).unwrap();
        assert_eq!(migrated.version(), Version::V2);
        assert_eq!(migrated.data(), store.data());
        drop(migrated);

        let mut unmigrated = CacheStore::load(&path, false).unwrap();
        assert_eq!(unmigrated.version(), Version::V1);
        let err = unmigrated.store(&path).unwrap_err();
        assert!(matches!(*err, ErrorKind::StoreVersion(1)));
    }
}
