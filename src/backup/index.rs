//! The dedup index: six independently-locked maps plus three path-entry
//! maps, matching SPEC_FULL.md §3 and the concurrency discipline of §5.
//!
//! Each map gets its own `Mutex`; callers never hold one map's lock while
//! acquiring another's, so there is no lock ordering to get wrong. For
//! serialization (and thus signing) the live, mutex-guarded `Index` is
//! snapshotted into a plain `IndexData` of `BTreeMap`/`BTreeSet`s, which
//! `serde_json` renders with deterministic, sorted output — the canonical
//! encoding SPEC_FULL.md §9 requires for reproducible signatures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::backup::{Chunk, FileInfo, Object};
use crate::checksum::Checksum;
use crate::error::Error;

/// Plain, serializable snapshot of an [`Index`]'s contents. This is what
/// actually gets compressed/signed/encrypted and written as the index blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexData {
    #[serde(rename = "Chunks")]
    pub chunks: BTreeMap<Checksum, Chunk>,
    #[serde(rename = "Objects")]
    pub objects: BTreeMap<Checksum, Object>,
    #[serde(rename = "Pathnames")]
    pub pathnames: BTreeMap<String, Checksum>,
    #[serde(rename = "Files")]
    pub files: BTreeMap<String, FileInfo>,
    #[serde(rename = "Directories")]
    pub directories: BTreeMap<String, FileInfo>,
    #[serde(rename = "NonRegular")]
    pub non_regular: BTreeMap<String, FileInfo>,
    #[serde(rename = "ChunkToObjects")]
    pub chunk_to_objects: BTreeMap<Checksum, BTreeSet<Checksum>>,
    #[serde(rename = "ObjectToPathnames")]
    pub object_to_pathnames: BTreeMap<Checksum, BTreeSet<String>>,
    #[serde(rename = "ContentTypeToObjects")]
    pub content_type_to_objects: BTreeMap<String, BTreeSet<Checksum>>,
}

impl IndexData {
    /// Check the invariants of SPEC_FULL.md §3/§8 (I1-I4). Returns the first
    /// violation found, if any.
    pub fn validate(&self) -> Result<(), String> {
        for object_sum in self.pathnames.values() {
            if !self.objects.contains_key(object_sum) {
                return Err(format!("pathname references unknown object {}", object_sum));
            }
        }
        for object in self.objects.values() {
            for chunk_sum in &object.chunks {
                if !self.chunks.contains_key(chunk_sum) {
                    return Err(format!("object references unknown chunk {}", chunk_sum));
                }
            }
        }
        for object in self.objects.values() {
            for chunk_sum in &object.chunks {
                let back = self.chunk_to_objects.get(chunk_sum);
                if !back.map(|s| s.contains(&object.checksum)).unwrap_or(false) {
                    return Err(format!(
                        "ChunkToObjects[{}] missing object {}",
                        chunk_sum, object.checksum
                    ));
                }
            }
        }
        for (pathname, object_sum) in &self.pathnames {
            let back = self.object_to_pathnames.get(object_sum);
            if !back.map(|s| s.contains(pathname)).unwrap_or(false) {
                return Err(format!(
                    "ObjectToPathnames[{}] missing pathname {}",
                    object_sum, pathname
                ));
            }
        }
        Ok(())
    }
}

/// The live, concurrently-mutable dedup index owned by an in-progress
/// `Snapshot`. Six maps from SPEC_FULL.md §5 plus the three path-entry maps
/// of §3, each behind its own mutex.
#[derive(Default)]
pub struct Index {
    chunks: Mutex<BTreeMap<Checksum, Chunk>>,
    objects: Mutex<BTreeMap<Checksum, Object>>,
    pathnames: Mutex<BTreeMap<String, Checksum>>,
    files: Mutex<BTreeMap<String, FileInfo>>,
    directories: Mutex<BTreeMap<String, FileInfo>>,
    non_regular: Mutex<BTreeMap<String, FileInfo>>,
    chunk_to_objects: Mutex<BTreeMap<Checksum, BTreeSet<Checksum>>>,
    object_to_pathnames: Mutex<BTreeMap<Checksum, BTreeSet<String>>>,
    content_type_to_objects: Mutex<BTreeMap<String, BTreeSet<Checksum>>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: IndexData) -> Self {
        Index {
            chunks: Mutex::new(data.chunks),
            objects: Mutex::new(data.objects),
            pathnames: Mutex::new(data.pathnames),
            files: Mutex::new(data.files),
            directories: Mutex::new(data.directories),
            non_regular: Mutex::new(data.non_regular),
            chunk_to_objects: Mutex::new(data.chunk_to_objects),
            object_to_pathnames: Mutex::new(data.object_to_pathnames),
            content_type_to_objects: Mutex::new(data.content_type_to_objects),
        }
    }

    pub fn to_data(&self) -> IndexData {
        IndexData {
            chunks: self.chunks.lock().unwrap().clone(),
            objects: self.objects.lock().unwrap().clone(),
            pathnames: self.pathnames.lock().unwrap().clone(),
            files: self.files.lock().unwrap().clone(),
            directories: self.directories.lock().unwrap().clone(),
            non_regular: self.non_regular.lock().unwrap().clone(),
            chunk_to_objects: self.chunk_to_objects.lock().unwrap().clone(),
            object_to_pathnames: self.object_to_pathnames.lock().unwrap().clone(),
            content_type_to_objects: self.content_type_to_objects.lock().unwrap().clone(),
        }
    }

    // ---- Chunks ---------------------------------------------------------

    /// Cheap in-memory lookup, used before deciding whether a chunk needs to
    /// be hashed/compressed/encrypted/put at all (SPEC_FULL.md §4.4.2).
    pub fn get_chunk_info(&self, checksum: &Checksum) -> Option<Chunk> {
        self.chunks.lock().unwrap().get(checksum).cloned()
    }

    /// Idempotent insert: a second insert of the same checksum is a no-op.
    pub fn add_chunk(&self, chunk: Chunk) {
        self.chunks.lock().unwrap().entry(chunk.checksum).or_insert(chunk);
    }

    // ---- Objects ----------------------------------------------------------

    pub fn get_object(&self, checksum: &Checksum) -> Option<Object> {
        self.objects.lock().unwrap().get(checksum).cloned()
    }

    pub fn add_object(&self, object: Object) {
        self.objects
            .lock()
            .unwrap()
            .entry(object.checksum)
            .or_insert(object);
    }

    // ---- Path entries -------------------------------------------------

    pub fn add_pathname(&self, pathname: String, object_checksum: Checksum) {
        self.pathnames.lock().unwrap().insert(pathname, object_checksum);
    }

    pub fn add_file(&self, pathname: String, info: FileInfo) {
        self.files.lock().unwrap().insert(pathname, info);
    }

    pub fn add_directory(&self, pathname: String, info: FileInfo) {
        self.directories.lock().unwrap().insert(pathname, info);
    }

    pub fn add_non_regular(&self, pathname: String, info: FileInfo) {
        self.non_regular.lock().unwrap().insert(pathname, info);
    }

    // ---- Reverse maps (StateSet*, idempotent set inserts) ----------------

    pub fn state_set_chunk_to_object(&self, chunk: Checksum, object: Checksum) {
        self.chunk_to_objects
            .lock()
            .unwrap()
            .entry(chunk)
            .or_insert_with(BTreeSet::new)
            .insert(object);
    }

    pub fn state_set_object_to_pathname(&self, object: Checksum, pathname: String) {
        self.object_to_pathnames
            .lock()
            .unwrap()
            .entry(object)
            .or_insert_with(BTreeSet::new)
            .insert(pathname);
    }

    pub fn state_set_content_type_to_object(&self, content_type: String, object: Checksum) {
        self.content_type_to_objects
            .lock()
            .unwrap()
            .entry(content_type)
            .or_insert_with(BTreeSet::new)
            .insert(object);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(bytes: &[u8]) -> Checksum {
        Checksum::of(bytes).unwrap()
    }

    #[test]
    fn chunk_insert_is_idempotent() {
        let index = Index::new();
        let c = Chunk::new(sum(b"a"), 0, 1);
        index.add_chunk(c.clone());
        index.add_chunk(c);
        assert_eq!(index.chunk_count(), 1);
    }

    #[test]
    fn state_set_chunk_to_object_has_no_duplicates() {
        let index = Index::new();
        let chunk = sum(b"a");
        let object = sum(b"obj");
        index.state_set_chunk_to_object(chunk, object);
        index.state_set_chunk_to_object(chunk, object);
        let data = index.to_data();
        assert_eq!(data.chunk_to_objects.get(&chunk).unwrap().len(), 1);
    }

    #[test]
    fn validate_rejects_dangling_object_reference() {
        let mut data = IndexData::default();
        let object = sum(b"missing");
        data.pathnames.insert("file.txt".into(), object);
        assert!(data.validate().is_err());
    }

    #[test]
    fn validate_accepts_consistent_index() {
        let chunk = sum(b"a");
        let object = Object::new(vec![chunk], None, 1).unwrap();

        let mut data = IndexData::default();
        data.chunks.insert(chunk, Chunk::new(chunk, 0, 1));
        data.chunk_to_objects
            .entry(chunk)
            .or_default()
            .insert(object.checksum);
        data.object_to_pathnames
            .entry(object.checksum)
            .or_default()
            .insert("file.txt".into());
        data.pathnames.insert("file.txt".into(), object.checksum);
        data.objects.insert(object.checksum, object);

        assert!(data.validate().is_ok());
    }

    #[test]
    fn canonical_serialization_is_deterministic() {
        let index = Index::new();
        index.add_chunk(Chunk::new(sum(b"z"), 0, 1));
        index.add_chunk(Chunk::new(sum(b"a"), 1, 1));

        let first = serde_json::to_vec(&index.to_data()).unwrap();
        let second = serde_json::to_vec(&index.to_data()).unwrap();
        assert_eq!(first, second);
    }
}
