//! The `Snapshot` root entity (SPEC_FULL.md §3, §4.4): metadata plus index,
//! a transaction during the build phase, and a non-owning handle to the
//! store that outlives it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::backup::{Chunk, Chunker, FileInfo, Index, IndexData, Metadata, Object};
use crate::checksum::Checksum;
use crate::codec;
use crate::error::Error;
use crate::store::{Store, Transaction};

/// An in-progress or loaded snapshot. Writable snapshots (from [`Snapshot::new`])
/// hold a live `Transaction`; loaded snapshots (from [`Snapshot::load`]) do not.
pub struct Snapshot {
    metadata: Metadata,
    index: Index,
    store: Arc<dyn Store>,
    transaction: Option<Box<dyn Transaction>>,
}

impl Snapshot {
    /// `New(store)` (SPEC_FULL.md §4.4.1): acquire a transaction, capture
    /// host identity metadata, and return a writable, empty snapshot.
    pub fn new(store: Arc<dyn Store>) -> Result<Self, Error> {
        let transaction = store.transaction()?;
        let uuid = transaction.uuid();
        let public_key = store.get_keypair();
        let metadata = Metadata::capture(uuid, public_key.as_deref().map(|k| k.public_key()));
        log::debug!("snapshot {}: created", uuid);
        Ok(Snapshot {
            metadata,
            index: Index::new(),
            store,
            transaction: Some(transaction),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.metadata.uuid
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    // ---- 4.4.2: populating the index -----------------------------------

    /// Record one regular file's content: chunk it, dedup chunks and the
    /// resulting object against the transaction, and record the pathname.
    /// `content_type` is caller-supplied (MIME sniffing is out of scope).
    pub fn record_file(
        &self,
        pathname: &str,
        data: &[u8],
        info: FileInfo,
        content_type: Option<String>,
        chunker: &mut dyn Chunker,
    ) -> Result<(), Error> {
        let config = self.store.configuration();
        let secret = self.store.get_secret();
        let transaction = self.transaction_ref()?;

        let pieces = chunker.chunk(data);
        let mut chunk_checksums = Vec::with_capacity(pieces.len());
        let mut novel_chunks: Vec<(Checksum, u64, u64, Vec<u8>)> = Vec::new();

        for piece in &pieces {
            let checksum = Checksum::of(&piece.data)?;
            chunk_checksums.push(checksum);
            if self.index.get_chunk_info(&checksum).is_none() {
                novel_chunks.push((checksum, piece.start, piece.data.len() as u64, piece.data.clone()));
            }
        }

        if !novel_chunks.is_empty() {
            let keys: Vec<Checksum> = novel_chunks.iter().map(|(c, ..)| *c).collect();
            let presence = transaction.reference_chunks(&keys)?;
            for (checksum, start, length, bytes) in novel_chunks {
                self.index.add_chunk(Chunk::new(checksum, start, length));
                if !presence.get(&checksum).copied().unwrap_or(false) {
                    let encoded = codec::encode_blob(&bytes, &config, secret.as_ref())?;
                    transaction.put_chunk(&checksum, &encoded)?;
                }
            }
        }

        let object = Object::new(chunk_checksums, content_type.clone(), data.len() as u64)?;
        if self.index.get_object(&object.checksum).is_none() {
            let present = transaction
                .reference_objects(&[object.checksum])?
                .get(&object.checksum)
                .copied()
                .unwrap_or(false);
            if !present {
                let serialized = serde_json::to_vec(&object)
                    .map_err(|e| Error::Codec(format!("object serialization: {}", e)))?;
                let encoded = codec::encode_blob(&serialized, &config, secret.as_ref())?;
                transaction.put_object(&object.checksum, &encoded)?;
            }
            let object_checksum = object.checksum;
            self.index.add_object(object);
            for chunk in &chunk_checksums {
                self.index.state_set_chunk_to_object(*chunk, object_checksum);
            }
            if let Some(ct) = content_type {
                self.index.state_set_content_type_to_object(ct, object_checksum);
            }
        }

        self.index.add_pathname(pathname.to_string(), object.checksum);
        self.index.add_file(pathname.to_string(), info);
        self.index
            .state_set_object_to_pathname(object.checksum, pathname.to_string());

        Ok(())
    }

    pub fn record_directory(&self, pathname: &str, info: FileInfo) {
        self.index.add_directory(pathname.to_string(), info);
    }

    pub fn record_non_regular(&self, pathname: &str, info: FileInfo) {
        self.index.add_non_regular(pathname.to_string(), info);
    }

    /// Convenience driver (SPEC_FULL.md §4.4.2): walk `root`, chunking
    /// regular files with `chunker` and recording directories/symlinks via
    /// `std::fs::symlink_metadata`. Checked against `cancel` between files
    /// so a long backup can be aborted cooperatively; on cancellation the
    /// transaction is simply dropped without `Commit` (SPEC_FULL.md §5).
    pub fn backup_path(
        &self,
        root: &Path,
        chunker: &mut dyn Chunker,
        cancel: &AtomicBool,
    ) -> Result<(), Error> {
        for entry in walkdir::WalkDir::new(root) {
            if cancel.load(Ordering::Relaxed) {
                log::debug!("snapshot {}: backup_path cancelled", self.uuid());
                return Ok(());
            }

            let entry = entry.map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            let pathname = entry.path().to_string_lossy().to_string();
            let meta = std::fs::symlink_metadata(entry.path())?;
            let file_type = meta.file_type();

            if file_type.is_dir() {
                if entry.path() != root {
                    self.record_directory(&pathname, FileInfo::from_metadata(&meta, None));
                }
            } else if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path())
                    .ok()
                    .map(|t| t.to_string_lossy().to_string());
                self.record_non_regular(&pathname, FileInfo::from_metadata(&meta, target));
            } else if file_type.is_file() {
                let data = std::fs::read(entry.path())?;
                let info = FileInfo::from_metadata(&meta, None);
                self.record_file(&pathname, &data, info, None, chunker)?;
            } else {
                self.record_non_regular(&pathname, FileInfo::from_metadata(&meta, None));
            }
        }
        Ok(())
    }

    // ---- 4.4.3: Commit ---------------------------------------------------

    /// Serialize, compress, optionally sign and encrypt, `PutIndex`, write
    /// through to the cache, and `Commit` the transaction. Consumes the
    /// snapshot: a committed snapshot has no further writable lifecycle.
    pub fn commit(mut self) -> Result<Uuid, Error> {
        let uuid = self.uuid();
        let config = self.store.configuration();
        let secret = self.store.get_secret();
        let keypair = self.store.get_keypair();

        let document = SerializedSnapshot {
            metadata: self.metadata.clone(),
            index: self.index.to_data(),
        };
        let plaintext = serde_json::to_vec(&document)
            .map_err(|e| Error::Codec(format!("snapshot serialization: {}", e)))?;

        let encoded = codec::encode_index(&plaintext, &config, secret.as_ref(), keypair.as_deref())?;

        let transaction = self.transaction.take().ok_or_else(|| {
            Error::State(format!("snapshot {}: commit called twice", uuid))
        })?;
        transaction.put_index(&encoded)?;

        if let Some(cache) = self.store.get_cache() {
            cache.put_snapshot(&uuid, &encoded)?;
        }

        transaction.commit()?;
        log::debug!("snapshot {}: committed", uuid);
        Ok(uuid)
    }

    // ---- 4.4.4: Load ------------------------------------------------------

    /// `Load(store, uuid)`: fetch (cache first, store on miss), decrypt,
    /// verify signature, decompress, and deserialize. Returns a read-only
    /// snapshot with no live transaction.
    pub fn load(store: Arc<dyn Store>, uuid: Uuid) -> Result<Self, Error> {
        let config = store.configuration();
        let secret = store.get_secret();
        let keypair = store.get_keypair();
        let cache = store.get_cache();

        let (raw, from_cache) = match &cache {
            Some(cache) => match cache.get_snapshot(&uuid) {
                Ok(bytes) => (bytes, true),
                Err(e) if e.is_not_found() => (store.get_index(&uuid)?, false),
                Err(e) => return Err(e),
            },
            None => (store.get_index(&uuid)?, false),
        };

        let signed = keypair.is_some();
        let (payload, signed_info) = codec::decode_index(&raw, &config, secret.as_ref(), signed)?;

        let document: SerializedSnapshot = serde_json::from_slice(&payload)
            .map_err(|e| Error::Codec(format!("snapshot deserialization: {}", e)))?;

        if let Some((signed_payload, signature)) = signed_info {
            let public_key = base64::decode(&document.metadata.public_key)
                .map_err(|e| Error::Signature(format!("malformed public key: {}", e)))?;
            codec::verify_with_public_key(&public_key, &signed_payload, &signature)?;
        }

        if !from_cache {
            if let Some(cache) = &cache {
                cache.put_snapshot(&uuid, &raw)?;
            }
        }

        log::trace!("snapshot {}: loaded", uuid);

        Ok(Snapshot {
            metadata: document.metadata,
            index: Index::from_data(document.index),
            store,
            transaction: None,
        })
    }

    /// `Purge(uuid)` (SPEC_FULL.md §4.4.5): delete only the index blob.
    pub fn purge(store: &dyn Store, uuid: Uuid) -> Result<(), Error> {
        store.purge(&uuid)
    }

    fn transaction_ref(&self) -> Result<&dyn Transaction, Error> {
        self.transaction
            .as_deref()
            .ok_or_else(|| Error::State(format!("snapshot {}: no active transaction", self.uuid())))
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedSnapshot {
    #[serde(rename = "Metadata")]
    metadata: Metadata,
    #[serde(rename = "Index")]
    index: IndexData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::FixedSizeChunker;
    use crate::store::LocalStore;
    use std::sync::Arc;

    fn store(passphrase: Option<&str>) -> (Arc<dyn Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::open(dir.path(), passphrase).unwrap();
        (Arc::new(local) as Arc<dyn Store>, dir)
    }

    fn file_info() -> FileInfo {
        FileInfo {
            mode: 0o644,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            symlink_target: None,
        }
    }

    #[test]
    fn empty_snapshot_commits_and_reloads() {
        let (store, _dir) = store(None);
        let snapshot = Snapshot::new(store.clone()).unwrap();
        let uuid = snapshot.commit().unwrap();

        let loaded = Snapshot::load(store, uuid).unwrap();
        assert_eq!(loaded.uuid(), uuid);
        assert_eq!(loaded.index().object_count(), 0);
    }

    #[test]
    fn backup_and_reload_roundtrips_a_file() {
        let (store, _dir) = store(None);
        let snapshot = Snapshot::new(store.clone()).unwrap();
        let mut chunker = FixedSizeChunker::new(1024);
        snapshot
            .record_file("greeting.txt", b"hello", file_info(), None, &mut chunker)
            .unwrap();
        let uuid = snapshot.commit().unwrap();

        let loaded = Snapshot::load(store, uuid).unwrap();
        assert_eq!(loaded.index().object_count(), 1);
    }

    #[test]
    fn two_identical_files_dedup_to_one_object() {
        let (store, _dir) = store(None);
        let snapshot = Snapshot::new(store.clone()).unwrap();
        let mut chunker = FixedSizeChunker::new(1024);
        snapshot
            .record_file("a.txt", b"same content", file_info(), None, &mut chunker)
            .unwrap();
        snapshot
            .record_file("b.txt", b"same content", file_info(), None, &mut chunker)
            .unwrap();
        assert_eq!(snapshot.index().object_count(), 1);
        snapshot.commit().unwrap();
    }

    #[test]
    fn wrong_passphrase_fails_before_deserialization() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = {
            let local = LocalStore::open(dir.path(), Some("correct-horse")).unwrap();
            let store: Arc<dyn Store> = Arc::new(local);
            let snapshot = Snapshot::new(store).unwrap();
            snapshot.commit().unwrap()
        };

        let local = LocalStore::open(dir.path(), Some("wrong-horse"));
        // reopening with a different passphrase fails to unseal the keypair
        assert!(local.is_err());
        let _ = uuid;
    }

    #[test]
    fn purge_deletes_index_only() {
        let (store, _dir) = store(None);
        let snapshot = Snapshot::new(store.clone()).unwrap();
        let mut chunker = FixedSizeChunker::new(1024);
        snapshot
            .record_file("f.txt", b"payload", file_info(), None, &mut chunker)
            .unwrap();
        let uuid = snapshot.commit().unwrap();

        Snapshot::purge(store.as_ref(), uuid).unwrap();
        assert!(Snapshot::load(store, uuid).is_err());
    }
}
