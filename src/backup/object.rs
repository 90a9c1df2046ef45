use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::Error;

/// The descriptor of a single regular file's content: an ordered list of
/// chunk checksums plus a checksum of its own, computed over the
/// concatenation of those chunk checksums in order. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Object {
    pub checksum: Checksum,
    pub chunks: Vec<Checksum>,
    pub content_type: Option<String>,
    pub size: u64,
}

impl Object {
    /// Build an object from its ordered chunk checksums and total size,
    /// deriving `checksum` from the concatenation of the chunk checksums.
    pub fn new(
        chunks: Vec<Checksum>,
        content_type: Option<String>,
        size: u64,
    ) -> Result<Self, Error> {
        let checksum = Self::checksum_of(&chunks)?;
        Ok(Object {
            checksum,
            chunks,
            content_type,
            size,
        })
    }

    fn checksum_of(chunks: &[Checksum]) -> Result<Checksum, Error> {
        let mut buf = Vec::with_capacity(chunks.len() * crate::checksum::CHECKSUM_LEN);
        for chunk in chunks {
            buf.extend_from_slice(chunk.as_bytes());
        }
        Checksum::of(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_zero_chunks() {
        let object = Object::new(vec![], None, 0).unwrap();
        assert!(object.chunks.is_empty());
    }

    #[test]
    fn checksum_is_derived_from_chunk_order() {
        let a = Checksum::of(b"a").unwrap();
        let b = Checksum::of(b"b").unwrap();
        let forward = Object::new(vec![a, b], None, 2).unwrap();
        let backward = Object::new(vec![b, a], None, 2).unwrap();
        assert_ne!(forward.checksum, backward.checksum);
    }

    #[test]
    fn identical_chunk_lists_produce_identical_checksum() {
        let a = Checksum::of(b"a").unwrap();
        let one = Object::new(vec![a], None, 1).unwrap();
        let two = Object::new(vec![a], None, 1).unwrap();
        assert_eq!(one.checksum, two.checksum);
    }
}
