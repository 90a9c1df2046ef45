//! Content-addressed, deduplicating snapshot engine.
//!
//! A [`Snapshot`] walks a filesystem tree, splits regular files into chunks,
//! groups chunks into content-addressed objects, and records the result in
//! an in-memory [`backup::Index`]. Chunks and objects are deduplicated
//! against a [`store::Store`] — a local sharded filesystem tree or a remote
//! daemon speaking the line-delimited protocol in `store::remote` — before
//! the index itself is serialized, optionally signed and encrypted, and
//! committed as the snapshot's durable record.
//!
//! `checksum`, `codec`, `config`, and `error` are the supporting primitives;
//! `tools` holds small filesystem and host-identity helpers shared across
//! the store backends.

pub mod backup;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod tools;

pub use backup::{Cache, Chunker, FixedSizeChunker, Index, RollingHashChunker};
pub use checksum::Checksum;
pub use config::RepositoryConfig;
pub use error::Error;
pub use snapshot::Snapshot;
pub use store::{open_repository, Store, Transaction};
