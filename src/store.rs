//! The repository abstraction (SPEC_FULL.md §4.2): a `Store` puts, gets,
//! checks, and purges chunk/object/index blobs, lists snapshot UUIDs, and
//! hands out write-scoped `Transaction`s. Two backends implement it: a local
//! sharded filesystem tree and a remote client over the line-delimited wire
//! protocol of §6.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::backup::Cache;
use crate::checksum::Checksum;
use crate::codec::{Keypair, Secret};
use crate::config::RepositoryConfig;
use crate::error::Error;

mod local;
pub use local::LocalStore;

mod remote;
pub use remote::{RemoteServer, RemoteStore};

/// The capability set a repository backend exposes, independent of whether
/// it is local or remote (SPEC_FULL.md §9, "Polymorphic store").
pub trait Store: Send + Sync {
    fn configuration(&self) -> RepositoryConfig;
    fn get_keypair(&self) -> Option<Arc<Keypair>>;
    fn get_secret(&self) -> Option<Secret>;
    fn get_cache(&self) -> Option<Arc<dyn Cache>>;

    fn transaction(&self) -> Result<Box<dyn Transaction>, Error>;

    fn get_indexes(&self) -> Result<Vec<Uuid>, Error>;
    fn get_index(&self, uuid: &Uuid) -> Result<Vec<u8>, Error>;

    fn put_chunk(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error>;
    fn put_object(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error>;
    fn get_chunk(&self, sum: &Checksum) -> Result<Vec<u8>, Error>;
    fn get_object(&self, sum: &Checksum) -> Result<Vec<u8>, Error>;
    fn check_chunk(&self, sum: &Checksum) -> Result<bool, Error>;
    fn check_object(&self, sum: &Checksum) -> Result<bool, Error>;

    fn purge(&self, uuid: &Uuid) -> Result<(), Error>;
}

/// A per-snapshot write scope (SPEC_FULL.md §4.3). Exactly one `Transaction`
/// is live per in-progress `Snapshot`; the backing `Store` may be shared.
pub trait Transaction: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn put_chunk(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error>;
    fn put_object(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error>;
    fn put_index(&self, buf: &[u8]) -> Result<(), Error>;

    /// Returns, for each input key in order, whether the repository already
    /// held that blob *before* this call. `false` entries are the ones the
    /// caller still needs to `Put`.
    fn reference_chunks(&self, keys: &[Checksum]) -> Result<BTreeMap<Checksum, bool>, Error>;
    fn reference_objects(&self, keys: &[Checksum]) -> Result<BTreeMap<Checksum, bool>, Error>;

    fn commit(&self) -> Result<(), Error>;
}

/// Open (or, on an empty directory, initialize) a repository identified by
/// `url`, per SPEC_FULL.md §4.8.
pub fn open_repository(url: &str, passphrase: Option<&str>) -> Result<Box<dyn Store>, Error> {
    match crate::config::parse_repository_url(url)? {
        crate::config::RepositoryLocation::Local(path) => {
            Ok(Box::new(LocalStore::open(&path, passphrase)?))
        }
        crate::config::RepositoryLocation::Remote { host, port } => {
            Ok(Box::new(RemoteStore::connect(&host, port)?))
        }
    }
}
