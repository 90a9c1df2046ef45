//! Reference implementations of the `Cache` collaborator (SPEC_FULL.md
//! §4.7): a local, best-effort store of previously-seen index bytes keyed by
//! snapshot UUID, consulted before falling back to the repository itself.
//! Misses and absent entries are not errors in themselves — callers decide
//! whether a miss means "fetch from the store" or "not found".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::Error;
use crate::tools;

pub trait Cache: Send + Sync {
    /// Look up previously cached index bytes for `uuid`. Returns
    /// `Error::NotFound` if nothing is cached.
    fn get_snapshot(&self, uuid: &Uuid) -> Result<Vec<u8>, Error>;

    /// Record index bytes for `uuid`, overwriting any previous entry.
    fn put_snapshot(&self, uuid: &Uuid, data: &[u8]) -> Result<(), Error>;
}

/// Process-local cache, lost on restart. Grounded on the same
/// `Mutex<BTreeMap<...>>` discipline used throughout `Index`.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get_snapshot(&self, uuid: &Uuid) -> Result<Vec<u8>, Error> {
        self.entries
            .lock()
            .unwrap()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no cached snapshot {}", uuid)))
    }

    fn put_snapshot(&self, uuid: &Uuid, data: &[u8]) -> Result<(), Error> {
        self.entries.lock().unwrap().insert(*uuid, data.to_vec());
        Ok(())
    }
}

/// On-disk write-through cache: one file per snapshot UUID under `root`,
/// written atomically via [`tools::replace_file`].
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirCache { root: root.into() }
    }

    fn path_for(&self, uuid: &Uuid) -> PathBuf {
        self.root.join(uuid.to_string())
    }
}

impl Cache for DirCache {
    fn get_snapshot(&self, uuid: &Uuid) -> Result<Vec<u8>, Error> {
        let path = self.path_for(uuid);
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("no cached snapshot {}", uuid))
            } else {
                Error::Io(e)
            }
        })
    }

    fn put_snapshot(&self, uuid: &Uuid, data: &[u8]) -> Result<(), Error> {
        tools::replace_file(&self.path_for(uuid), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_miss_is_not_found() {
        let cache = MemoryCache::new();
        let err = cache.get_snapshot(&Uuid::new_v4()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn memory_cache_roundtrips() {
        let cache = MemoryCache::new();
        let uuid = Uuid::new_v4();
        cache.put_snapshot(&uuid, b"hello").unwrap();
        assert_eq!(cache.get_snapshot(&uuid).unwrap(), b"hello");
    }

    #[test]
    fn dir_cache_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::new(dir.path());
        let uuid = Uuid::new_v4();
        cache.put_snapshot(&uuid, b"payload").unwrap();
        assert_eq!(cache.get_snapshot(&uuid).unwrap(), b"payload");
    }

    #[test]
    fn dir_cache_miss_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::new(dir.path());
        let err = cache.get_snapshot(&Uuid::new_v4()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn dir_cache_overwrites_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::new(dir.path());
        let uuid = Uuid::new_v4();
        cache.put_snapshot(&uuid, b"first").unwrap();
        cache.put_snapshot(&uuid, b"second").unwrap();
        assert_eq!(cache.get_snapshot(&uuid).unwrap(), b"second");
    }
}
