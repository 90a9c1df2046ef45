//! The snapshot data model: chunks, objects, file entries, and the
//! dedup index that ties them together (SPEC_FULL.md §3).
//!
//! A chunk is a variable-size byte range of a file, identified by its
//! checksum. An object aggregates one regular file's ordered chunk
//! checksums under a checksum of its own. The index maps pathnames to
//! objects to chunks, plus reverse lookups so that purging or listing
//! by content-type doesn't require a full scan.
//!
//! Two further submodules round out the data model as external
//! collaborators with minimal reference implementations: `chunker`
//! (splitting file bytes into chunks) and `cache` (client-side
//! read-through storage of decoded index blobs).

mod chunk;
pub use chunk::Chunk;

mod object;
pub use object::Object;

mod file_info;
pub use file_info::FileInfo;

mod metadata;
pub use metadata::Metadata;

mod index;
pub use index::{Index, IndexData};

mod chunker;
pub use chunker::{Chunker, FixedSizeChunker, RollingHashChunker};

mod cache;
pub use cache::{Cache, DirCache, MemoryCache};
