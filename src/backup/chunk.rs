use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

/// Metadata for a variable-size byte range of a file. The blob on disk
/// stores only the bytes; `length`/`start` live here, in the owning
/// object's index entry, not in the blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub checksum: Checksum,
    pub length: u64,
    pub start: u64,
}

impl Chunk {
    pub fn new(checksum: Checksum, start: u64, length: u64) -> Self {
        Chunk {
            checksum,
            length,
            start,
        }
    }
}
