//! Keyed storage of processed GIFs
//!
//! [`ArtifactStore`] owns the current bytes of every artifact and serializes
//! read-modify-write cycles per key. Where the bytes actually live is up to a
//! [`Backend`]: a map in memory, or one file per key in a directory.

use crate::error::{Error, GifResult};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Raw byte storage behind an [`ArtifactStore`]
///
/// Implementations don't need to do any locking of their own beyond keeping
/// individual calls atomic; the store never runs two calls for the same key at once.
pub trait Backend: Send + Sync {
    fn get(&self, key: &str) -> GifResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, data: &[u8]) -> GifResult<()>;
    fn remove(&self, key: &str) -> GifResult<()>;
    fn contains(&self, key: &str) -> GifResult<bool>;
    fn keys(&self) -> GifResult<Vec<String>>;
}

/// Keeps everything in RAM
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> GifResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> GifResult<()> {
        self.blobs.write().insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> GifResult<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> GifResult<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    fn keys(&self) -> GifResult<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }
}

/// One file per key in a directory
pub struct DirBackend {
    dir: PathBuf,
}

impl DirBackend {
    /// Creates the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> GifResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl Backend for DirBackend {
    fn get(&self, key: &str) -> GifResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a temporary file first and renames it over the old one,
    /// so a concurrent reader sees either the old or the new file
    fn put(&self, key: &str, data: &[u8]) -> GifResult<()> {
        let tmp = self.dir.join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, self.path_of(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> GifResult<()> {
        match fs::remove_file(self.path_of(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn contains(&self, key: &str) -> GifResult<bool> {
        Ok(self.path_of(key).is_file())
    }

    fn keys(&self) -> GifResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// New unique artifact key, `{uuid}.gif`
pub fn new_key() -> String {
    format!("{}.gif", uuid::Uuid::new_v4())
}

/// Keys double as file names, so they must be a single plain path component
pub fn check_key(key: &str) -> GifResult<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidParameter(format!("Invalid artifact key '{}'", key.escape_debug())));
    }
    Ok(())
}

/// Current bytes of every artifact, with one lock per key
pub struct ArtifactStore {
    backend: Box<dyn Backend>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

impl ArtifactStore {
    pub fn new(backend: impl Backend + 'static, lock_timeout: Duration) -> Self {
        Self {
            backend: Box::new(backend),
            locks: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub fn in_memory(lock_timeout: Duration) -> Self {
        Self::new(MemoryBackend::new(), lock_timeout)
    }

    pub fn in_dir(dir: impl Into<PathBuf>, lock_timeout: Duration) -> GifResult<Self> {
        Ok(Self::new(DirBackend::new(dir)?, lock_timeout))
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(key) {
            return lock.clone();
        }
        self.locks.write().entry(key.to_owned()).or_default().clone()
    }

    /// Runs `f` while holding the key's lock, waiting at most `lock_timeout` for it
    fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> GifResult<T>) -> GifResult<T> {
        let lock = self.key_lock(key);
        let _guard = lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!("gave up waiting {:?} for the lock on {}", self.lock_timeout, key);
            Error::LockTimeout(key.to_owned())
        })?;
        f()
    }

    /// Drops the key's lock if nothing but the map refers to it.
    ///
    /// Any thread holding or waiting on the lock owns a clone of the `Arc`,
    /// and new clones can't be taken while the map is write-locked, so an
    /// evicted lock is never replaced by a second one still in use.
    fn evict_idle_lock(&self, key: &str) {
        let mut locks = self.locks.write();
        if locks.get(key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Fails early for unknown keys, so no locks are made for them
    fn check_known(&self, key: &str) -> GifResult<()> {
        check_key(key)?;
        if !self.backend.contains(key)? {
            // the file may have been deleted behind our back
            self.evict_idle_lock(key);
            return Err(Error::NotFound(key.to_owned()));
        }
        Ok(())
    }

    /// Stores a brand-new artifact. The key must not exist yet.
    pub fn create(&self, key: &str, data: &[u8]) -> GifResult<()> {
        check_key(key)?;
        self.with_lock(key, || {
            if self.backend.contains(key)? {
                return Err(Error::InvalidParameter(format!("Artifact {} already exists", key)));
            }
            self.backend.put(key, data)
        })?;
        debug!("created {} ({} bytes)", key, data.len());
        Ok(())
    }

    pub fn read(&self, key: &str) -> GifResult<Vec<u8>> {
        self.check_known(key)?;
        self.with_lock(key, || {
            self.backend.get(key)?.ok_or_else(|| Error::NotFound(key.to_owned()))
        })
    }

    /// Replaces the bytes of an existing artifact
    pub fn write(&self, key: &str, data: &[u8]) -> GifResult<()> {
        self.check_known(key)?;
        self.with_lock(key, || {
            if !self.backend.contains(key)? {
                return Err(Error::NotFound(key.to_owned()));
            }
            self.backend.put(key, data)
        })
    }

    /// Read, transform, write as one step for this key.
    ///
    /// Nothing is written if `f` fails.
    pub fn update<F>(&self, key: &str, f: F) -> GifResult<()> where F: FnOnce(Vec<u8>) -> GifResult<Vec<u8>> {
        self.check_known(key)?;
        self.with_lock(key, || {
            let current = self.backend.get(key)?.ok_or_else(|| Error::NotFound(key.to_owned()))?;
            let updated = f(current)?;
            self.backend.put(key, &updated)
        })
    }

    /// Drops an artifact. Used to roll back uploads that failed halfway.
    pub fn remove(&self, key: &str) -> GifResult<()> {
        check_key(key)?;
        self.with_lock(key, || self.backend.remove(key))?;
        self.evict_idle_lock(key);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> GifResult<bool> {
        if check_key(key).is_err() {
            return Ok(false);
        }
        self.backend.contains(key)
    }

    pub fn keys(&self) -> GifResult<Vec<String>> {
        self.backend.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn store() -> ArtifactStore {
        ArtifactStore::in_memory(Duration::from_secs(5))
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gifsplit-{}-{}", name, uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_read_write() {
        let s = store();
        s.create("a.gif", b"one").unwrap();
        assert_eq!(s.read("a.gif").unwrap(), b"one");
        s.write("a.gif", b"two").unwrap();
        assert_eq!(s.read("a.gif").unwrap(), b"two");
        assert!(matches!(s.create("a.gif", b"three"), Err(Error::InvalidParameter(_))));
        assert_eq!(s.read("a.gif").unwrap(), b"two");
    }

    #[test]
    fn unknown_keys() {
        let s = store();
        assert!(matches!(s.read("nope.gif"), Err(Error::NotFound(_))));
        assert!(matches!(s.write("nope.gif", b"x"), Err(Error::NotFound(_))));
        assert!(matches!(s.update("nope.gif", |b| Ok(b)), Err(Error::NotFound(_))));
        assert!(s.keys().unwrap().is_empty());
        assert!(s.locks.read().is_empty());
    }

    #[test]
    fn bad_keys() {
        let s = store();
        for key in ["", ".", "..", "../etc/passwd", "a/b.gif", "a\\b.gif", ".hidden"] {
            assert!(matches!(s.create(key, b"x"), Err(Error::InvalidParameter(_))), "{}", key);
            assert!(!s.contains(key).unwrap());
        }
    }

    #[test]
    fn failed_update_keeps_bytes() {
        let s = store();
        s.create("a.gif", b"keep").unwrap();
        let res = s.update("a.gif", |_| Err(Error::Decode("bad".into())));
        assert!(matches!(res, Err(Error::Decode(_))));
        assert_eq!(s.read("a.gif").unwrap(), b"keep");
    }

    #[test]
    fn updates_on_one_key_are_serialized() {
        let s = Arc::new(store());
        s.create("n.gif", b"0").unwrap();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8).map(|_| {
            let s = s.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..25 {
                    s.update("n.gif", |b| {
                        let n: u32 = std::str::from_utf8(&b).unwrap().parse().unwrap();
                        thread::yield_now();
                        Ok((n + 1).to_string().into_bytes())
                    }).unwrap();
                }
            })
        }).collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.read("n.gif").unwrap(), b"200");
    }

    #[test]
    fn lock_wait_is_bounded() {
        let s = Arc::new(ArtifactStore::in_memory(Duration::from_millis(50)));
        s.create("slow.gif", b"x").unwrap();
        let (started_s, started_r) = crossbeam_channel::bounded(0);
        let s2 = s.clone();
        let holder = thread::spawn(move || {
            s2.update("slow.gif", |b| {
                started_s.send(()).unwrap();
                thread::sleep(Duration::from_millis(500));
                Ok(b)
            }).unwrap();
        });
        started_r.recv().unwrap();
        assert!(matches!(s.read("slow.gif"), Err(Error::LockTimeout(_))));
        holder.join().unwrap();
        assert_eq!(s.read("slow.gif").unwrap(), b"x");
    }

    #[test]
    fn removed_keys_drop_their_locks() {
        let s = store();
        s.create("a.gif", b"x").unwrap();
        s.remove("a.gif").unwrap();
        assert!(s.locks.read().is_empty());
        assert!(matches!(s.read("a.gif"), Err(Error::NotFound(_))));
    }

    #[test]
    fn busy_locks_are_not_evicted() {
        let s = Arc::new(store());
        s.create("busy.gif", b"x").unwrap();
        let (started_s, started_r) = crossbeam_channel::bounded(0);
        let (release_s, release_r) = crossbeam_channel::bounded::<()>(0);
        let s2 = s.clone();
        let holder = thread::spawn(move || {
            s2.update("busy.gif", |b| {
                started_s.send(()).unwrap();
                release_r.recv().unwrap();
                Ok(b)
            }).unwrap();
        });
        started_r.recv().unwrap();
        s.evict_idle_lock("busy.gif");
        let held = s.locks.read().get("busy.gif").cloned().unwrap();
        assert!(held.is_locked());
        release_s.send(()).unwrap();
        holder.join().unwrap();
        drop(held);
        s.evict_idle_lock("busy.gif");
        assert!(s.locks.read().is_empty());
    }

    #[test]
    fn externally_deleted_files_drop_their_locks() {
        let dir = temp_dir("gone");
        let s = ArtifactStore::in_dir(&dir, Duration::from_secs(1)).unwrap();
        s.create("g.gif", b"x").unwrap();
        assert_eq!(s.read("g.gif").unwrap(), b"x");
        fs::remove_file(dir.join("g.gif")).unwrap();
        assert!(matches!(s.read("g.gif"), Err(Error::NotFound(_))));
        assert!(s.locks.read().is_empty());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn dir_backend_round_trip() {
        let dir = temp_dir("store");
        let s = ArtifactStore::in_dir(&dir, Duration::from_secs(1)).unwrap();
        s.create("x.gif", b"abc").unwrap();
        s.update("x.gif", |mut b| { b.push(b'd'); Ok(b) }).unwrap();
        assert_eq!(fs::read(dir.join("x.gif")).unwrap(), b"abcd");
        assert_eq!(s.keys().unwrap(), ["x.gif"]);

        // a fresh store over the same directory sees the artifact
        let reopened = ArtifactStore::in_dir(&dir, Duration::from_secs(1)).unwrap();
        assert_eq!(reopened.read("x.gif").unwrap(), b"abcd");
        reopened.remove("x.gif").unwrap();
        assert!(matches!(reopened.read("x.gif"), Err(Error::NotFound(_))));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn new_keys_are_valid_and_unique() {
        let a = new_key();
        let b = new_key();
        assert_ne!(a, b);
        assert!(a.ends_with(".gif"));
        check_key(&a).unwrap();
    }
}
