//! Local filesystem backend (SPEC_FULL.md §4.2, "Local backend layout").
//!
//! ```text
//! <repo>/CONFIG
//! <repo>/chunks/<aa>/<bb>/<sum>
//! <repo>/objects/<aa>/<bb>/<sum>
//! <repo>/indexes/<uuid>
//! <repo>/keypair
//! ```
//! All writes go through [`crate::tools::replace_file`] (temp file + atomic
//! rename); a rename that loses a race against an identical, already-present
//! content-addressed blob is folded into success.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::backup::{Cache, MemoryCache};
use crate::checksum::Checksum;
use crate::codec::{derive_key, Keypair, Secret};
use crate::config::RepositoryConfig;
use crate::error::Error;
use crate::store::{Store, Transaction};
use crate::tools;

const KEYPAIR_FILE_NAME: &str = "keypair";
const CHUNKS_DIR: &str = "chunks";
const OBJECTS_DIR: &str = "objects";
const INDEXES_DIR: &str = "indexes";

pub struct LocalStore {
    root: PathBuf,
    config: RepositoryConfig,
    secret: Option<Secret>,
    keypair: Option<Arc<Keypair>>,
    cache: Arc<dyn Cache>,
}

impl LocalStore {
    /// Open `root`, initializing it first if it is empty or does not yet
    /// exist (SPEC_FULL.md §4.8). Encryption and signing both default to
    /// "on whenever a passphrase is given" — use [`LocalStore::open_with`]
    /// to select them independently.
    pub fn open(root: &Path, passphrase: Option<&str>) -> Result<Self, Error> {
        let enabled = passphrase.is_some();
        Self::open_with(root, passphrase, enabled, enabled)
    }

    /// Open `root` like [`LocalStore::open`], but with `encryption` and
    /// `signing` selected independently (SPEC_FULL.md §4.1: the codec
    /// transforms are orthogonal). Only consulted on first initialization —
    /// an existing repository's `CONFIG` already records which stages it
    /// uses and `encryption`/`signing` are ignored on reload.
    pub fn open_with(
        root: &Path,
        passphrase: Option<&str>,
        encryption: bool,
        signing: bool,
    ) -> Result<Self, Error> {
        let is_empty = !root.exists()
            || std::fs::read_dir(root)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true);

        if is_empty {
            Self::init(root, passphrase, encryption, signing)
        } else {
            Self::load(root, passphrase)
        }
    }

    fn init(
        root: &Path,
        passphrase: Option<&str>,
        encryption: bool,
        signing: bool,
    ) -> Result<Self, Error> {
        std::fs::create_dir_all(root.join(CHUNKS_DIR))?;
        std::fs::create_dir_all(root.join(OBJECTS_DIR))?;
        std::fs::create_dir_all(root.join(INDEXES_DIR))?;

        let config = RepositoryConfig {
            encryption: encryption && passphrase.is_some(),
            signing: signing && passphrase.is_some(),
            ..RepositoryConfig::default()
        };
        config.save(root)?;
        log::debug!("local store: initialized new repository at {:?}", root);

        let secret = derive_secret(&config, passphrase)?;
        let signing_secret = derive_signing_secret(&config, passphrase)?;
        let keypair = match signing_secret {
            Some(seal_secret) => {
                let keypair = Keypair::generate()?;
                tools::replace_file(&root.join(KEYPAIR_FILE_NAME), &keypair.seal(&seal_secret)?)?;
                Some(Arc::new(keypair))
            }
            None => None,
        };

        Ok(LocalStore {
            root: root.to_path_buf(),
            config,
            secret,
            keypair,
            cache: Arc::new(MemoryCache::new()),
        })
    }

    fn load(root: &Path, passphrase: Option<&str>) -> Result<Self, Error> {
        let config = RepositoryConfig::load(root)?;

        let secret = derive_secret(&config, passphrase)?;
        let signing_secret = derive_signing_secret(&config, passphrase)?;
        let keypair_path = root.join(KEYPAIR_FILE_NAME);
        let keypair = match (signing_secret, keypair_path.exists()) {
            (Some(seal_secret), true) => {
                let sealed = std::fs::read(&keypair_path)?;
                Some(Arc::new(Keypair::unseal(&sealed, &seal_secret)?))
            }
            _ => None,
        };

        Ok(LocalStore {
            root: root.to_path_buf(),
            config,
            secret,
            keypair,
            cache: Arc::new(MemoryCache::new()),
        })
    }

    fn chunk_path(&self, sum: &Checksum) -> PathBuf {
        shard_path(&self.root, CHUNKS_DIR, sum)
    }

    fn object_path(&self, sum: &Checksum) -> PathBuf {
        shard_path(&self.root, OBJECTS_DIR, sum)
    }

    fn index_path(&self, uuid: &Uuid) -> PathBuf {
        self.root.join(INDEXES_DIR).join(uuid.to_string())
    }
}

/// The blob/index encryption secret, present only when `config.encryption`
/// is set and a passphrase was given.
fn derive_secret(config: &RepositoryConfig, passphrase: Option<&str>) -> Result<Option<Secret>, Error> {
    if !config.encryption {
        return Ok(None);
    }
    match passphrase {
        Some(p) => Ok(Some(derive_key(p, config.repository_id.as_bytes())?)),
        None => Ok(None),
    }
}

/// The keypair-sealing secret, present only when `config.signing` is set and
/// a passphrase was given. Salted separately from `derive_secret` so the
/// same passphrase yields independent key material for each stage — one
/// cannot be derived from the other, and encryption being off doesn't weaken
/// signing or vice versa.
fn derive_signing_secret(config: &RepositoryConfig, passphrase: Option<&str>) -> Result<Option<Secret>, Error> {
    if !config.signing {
        return Ok(None);
    }
    match passphrase {
        Some(p) => Ok(Some(derive_key(p, &keypair_salt(&config.repository_id))?)),
        None => Ok(None),
    }
}

fn keypair_salt(repository_id: &Uuid) -> Vec<u8> {
    let mut salt = repository_id.as_bytes().to_vec();
    salt.extend_from_slice(b"keypair");
    salt
}

fn shard_path(root: &Path, kind: &str, sum: &Checksum) -> PathBuf {
    let (aa, bb) = sum.shard();
    root.join(kind).join(aa).join(bb).join(sum.to_string())
}

fn get_or_not_found(path: &Path, what: &str) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(what.to_string())
        } else {
            Error::Io(e)
        }
    })
}

impl Store for LocalStore {
    fn configuration(&self) -> RepositoryConfig {
        self.config.clone()
    }

    fn get_keypair(&self) -> Option<Arc<Keypair>> {
        self.keypair.clone()
    }

    fn get_secret(&self) -> Option<Secret> {
        self.secret.clone()
    }

    fn get_cache(&self) -> Option<Arc<dyn Cache>> {
        Some(self.cache.clone())
    }

    fn transaction(&self) -> Result<Box<dyn Transaction>, Error> {
        let uuid = Uuid::new_v4();
        log::trace!("local store: new transaction {}", uuid);
        Ok(Box::new(LocalTransaction {
            uuid,
            root: self.root.clone(),
            index_staged: Mutex::new(None),
        }))
    }

    fn get_indexes(&self) -> Result<Vec<Uuid>, Error> {
        let dir = self.root.join(INDEXES_DIR);
        let mut uuids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(uuid) = name.parse() {
                    uuids.push(uuid);
                }
            }
        }
        Ok(uuids)
    }

    fn get_index(&self, uuid: &Uuid) -> Result<Vec<u8>, Error> {
        log::trace!("local store: GetIndex({})", uuid);
        get_or_not_found(&self.index_path(uuid), &format!("index {}", uuid))
    }

    fn put_chunk(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        log::trace!("local store: PutChunk({})", sum);
        tools::replace_file(&self.chunk_path(sum), buf)
    }

    fn put_object(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        log::trace!("local store: PutObject({})", sum);
        tools::replace_file(&self.object_path(sum), buf)
    }

    fn get_chunk(&self, sum: &Checksum) -> Result<Vec<u8>, Error> {
        get_or_not_found(&self.chunk_path(sum), &format!("chunk {}", sum))
    }

    fn get_object(&self, sum: &Checksum) -> Result<Vec<u8>, Error> {
        get_or_not_found(&self.object_path(sum), &format!("object {}", sum))
    }

    fn check_chunk(&self, sum: &Checksum) -> Result<bool, Error> {
        Ok(self.chunk_path(sum).exists())
    }

    fn check_object(&self, sum: &Checksum) -> Result<bool, Error> {
        Ok(self.object_path(sum).exists())
    }

    fn purge(&self, uuid: &Uuid) -> Result<(), Error> {
        log::trace!("local store: Purge({})", uuid);
        let path = self.index_path(uuid);
        std::fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("index {}", uuid))
            } else {
                Error::Io(e)
            }
        })
    }
}

pub struct LocalTransaction {
    uuid: Uuid,
    root: PathBuf,
    index_staged: Mutex<Option<Vec<u8>>>,
}

impl LocalTransaction {
    fn chunk_path(&self, sum: &Checksum) -> PathBuf {
        shard_path(&self.root, CHUNKS_DIR, sum)
    }

    fn object_path(&self, sum: &Checksum) -> PathBuf {
        shard_path(&self.root, OBJECTS_DIR, sum)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEXES_DIR).join(self.uuid.to_string())
    }
}

impl Transaction for LocalTransaction {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn put_chunk(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        log::trace!("transaction {}: PutChunk({})", self.uuid, sum);
        tools::replace_file(&self.chunk_path(sum), buf)
    }

    fn put_object(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        log::trace!("transaction {}: PutObject({})", self.uuid, sum);
        tools::replace_file(&self.object_path(sum), buf)
    }

    fn put_index(&self, buf: &[u8]) -> Result<(), Error> {
        log::trace!("transaction {}: PutIndex", self.uuid);
        *self.index_staged.lock().unwrap() = Some(buf.to_vec());
        Ok(())
    }

    fn reference_chunks(&self, keys: &[Checksum]) -> Result<BTreeMap<Checksum, bool>, Error> {
        let mut out = BTreeMap::new();
        for key in keys {
            out.insert(*key, self.chunk_path(key).exists());
        }
        Ok(out)
    }

    fn reference_objects(&self, keys: &[Checksum]) -> Result<BTreeMap<Checksum, bool>, Error> {
        let mut out = BTreeMap::new();
        for key in keys {
            out.insert(*key, self.object_path(key).exists());
        }
        Ok(out)
    }

    fn commit(&self) -> Result<(), Error> {
        let staged = self.index_staged.lock().unwrap().take();
        match staged {
            Some(bytes) => {
                tools::replace_file(&self.index_path(), &bytes)?;
                log::debug!("transaction {}: committed", self.uuid);
                Ok(())
            }
            None => Err(Error::State(format!(
                "transaction {}: commit without PutIndex",
                self.uuid
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(bytes: &[u8]) -> Checksum {
        Checksum::of(bytes).unwrap()
    }

    #[test]
    fn open_initializes_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        assert!(dir.path().join("CONFIG").exists());
        assert!(dir.path().join(CHUNKS_DIR).is_dir());
        assert!(store.get_secret().is_none());
        assert!(store.get_keypair().is_none());
    }

    #[test]
    fn open_with_passphrase_generates_sealed_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), Some("hunter2")).unwrap();
        assert!(dir.path().join("keypair").exists());
        assert!(store.get_secret().is_some());
        assert!(store.get_keypair().is_some());
    }

    #[test]
    fn reopen_recovers_same_keypair_and_secret() {
        let dir = tempfile::tempdir().unwrap();
        let pub1 = {
            let store = LocalStore::open(dir.path(), Some("hunter2")).unwrap();
            store.get_keypair().unwrap().public_key().to_vec()
        };
        let store = LocalStore::open(dir.path(), Some("hunter2")).unwrap();
        let pub2 = store.get_keypair().unwrap().public_key().to_vec();
        assert_eq!(pub1, pub2);
    }

    #[test]
    fn reopen_with_wrong_passphrase_fails_to_unseal_keypair() {
        let dir = tempfile::tempdir().unwrap();
        LocalStore::open(dir.path(), Some("correct")).unwrap();
        assert!(LocalStore::open(dir.path(), Some("incorrect")).is_err());
    }

    #[test]
    fn open_with_can_sign_without_encrypting() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open_with(dir.path(), Some("hunter2"), false, true).unwrap();
        assert!(store.get_secret().is_none());
        assert!(store.get_keypair().is_some());
        assert!(!store.configuration().encryption);
        assert!(store.configuration().signing);
    }

    #[test]
    fn open_with_can_encrypt_without_signing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open_with(dir.path(), Some("hunter2"), true, false).unwrap();
        assert!(store.get_secret().is_some());
        assert!(store.get_keypair().is_none());
        assert!(!dir.path().join(KEYPAIR_FILE_NAME).exists());
    }

    #[test]
    fn put_chunk_then_get_chunk_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let checksum = sum(b"hello");
        store.put_chunk(&checksum, b"hello").unwrap();
        assert_eq!(store.get_chunk(&checksum).unwrap(), b"hello");
        assert!(store.check_chunk(&checksum).unwrap());
    }

    #[test]
    fn get_chunk_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let err = store.get_chunk(&sum(b"missing")).unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.check_chunk(&sum(b"missing")).unwrap());
    }

    #[test]
    fn put_chunk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let checksum = sum(b"hello");
        store.put_chunk(&checksum, b"hello").unwrap();
        store.put_chunk(&checksum, b"hello").unwrap();
        assert_eq!(store.get_chunk(&checksum).unwrap(), b"hello");
    }

    #[test]
    fn transaction_commit_without_put_index_fails_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let txn = store.transaction().unwrap();
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn transaction_commit_publishes_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let txn = store.transaction().unwrap();
        txn.put_index(b"index bytes").unwrap();
        txn.commit().unwrap();
        assert_eq!(store.get_index(&txn.uuid()).unwrap(), b"index bytes");
        assert!(store.get_indexes().unwrap().contains(&txn.uuid()));
    }

    #[test]
    fn reference_chunks_reports_presence_before_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let txn = store.transaction().unwrap();
        let checksum = sum(b"novel");

        let before = txn.reference_chunks(&[checksum]).unwrap();
        assert_eq!(before[&checksum], false);

        txn.put_chunk(&checksum, b"novel").unwrap();
        let after = txn.reference_chunks(&[checksum]).unwrap();
        assert_eq!(after[&checksum], true);
    }

    #[test]
    fn purge_removes_index_but_leaves_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let checksum = sum(b"hello");
        store.put_chunk(&checksum, b"hello").unwrap();

        let txn = store.transaction().unwrap();
        txn.put_index(b"index bytes").unwrap();
        txn.commit().unwrap();
        let uuid = txn.uuid();

        store.purge(&uuid).unwrap();
        assert!(store.get_index(&uuid).unwrap_err().is_not_found());
        assert_eq!(store.get_chunk(&checksum).unwrap(), b"hello");
    }
}
