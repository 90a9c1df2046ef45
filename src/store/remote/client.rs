//! Remote `Store`/`Transaction` client (SPEC_FULL.md §4.2, "Remote
//! backend"). A single TCP connection is shared by the `RemoteStore` and
//! every `RemoteTransaction` it issues, serialized by one `Mutex` so that
//! request/response pairs are never interleaved — pipelining is explicitly
//! disallowed by the protocol.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::protocol::{
    read_line, write_line, ChecksumsPayload, DataPayload, IndexPayload, Response,
};
use crate::backup::Cache;
use crate::checksum::Checksum;
use crate::codec::{Keypair, Secret};
use crate::config::RepositoryConfig;
use crate::error::Error;
use crate::store::{Store, Transaction};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn roundtrip(&mut self, command: &str, payload: Option<&str>) -> Result<Response, Error> {
        write_line(&mut self.writer, command)?;
        if let Some(p) = payload {
            write_line(&mut self.writer, p)?;
        }
        let line = read_line(&mut self.reader)?;
        serde_json::from_str(&line).map_err(|e| Error::Protocol(format!("malformed response: {}", e)))
    }
}

/// `Store` implementation over the line-delimited remote protocol. Codec
/// configuration and signing live entirely with the caller — the remote
/// backend only moves already-codec'd bytes (SPEC_FULL.md §4.2/§4.3), so
/// `get_secret`/`get_keypair` return `None`: a remote repository's
/// passphrase and keypair are a client-local concern, set up the same way
/// the local backend's are, independently of this connection.
pub struct RemoteStore {
    conn: Arc<Mutex<Connection>>,
    cache: Arc<dyn Cache>,
}

impl RemoteStore {
    pub fn connect(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port))?;
        let reader = BufReader::new(stream.try_clone()?);
        log::debug!("remote store: connected to {}:{}", host, port);
        Ok(RemoteStore {
            conn: Arc::new(Mutex::new(Connection { reader, writer: stream })),
            cache: Arc::new(crate::backup::MemoryCache::new()),
        })
    }
}

fn checked(resp: Response) -> Result<Response, Error> {
    if resp.error.is_some() {
        Err(resp.into_error().unwrap())
    } else {
        Ok(resp)
    }
}

fn decode_payload(field: Option<String>, what: &str) -> Result<Vec<u8>, Error> {
    let field = field.ok_or_else(|| Error::Protocol(format!("response missing {} field", what)))?;
    base64::decode(field).map_err(|e| Error::Protocol(format!("invalid base64 in {}: {}", what, e)))
}

impl Store for RemoteStore {
    fn configuration(&self) -> RepositoryConfig {
        // Not negotiated over the wire (no such request form in SPEC_FULL.md
        // §6); the caller configures codec behavior locally and the remote
        // backend only ever sees already-codec'd bytes.
        RepositoryConfig::default()
    }

    fn get_keypair(&self) -> Option<Arc<Keypair>> {
        None
    }

    fn get_secret(&self) -> Option<Secret> {
        None
    }

    fn get_cache(&self) -> Option<Arc<dyn Cache>> {
        Some(self.cache.clone())
    }

    fn transaction(&self) -> Result<Box<dyn Transaction>, Error> {
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip("Transaction", None)?)?;
        let uuid: Uuid = resp
            .uuid
            .ok_or_else(|| Error::Protocol("Transaction response missing Uuid".into()))?
            .parse()
            .map_err(|_| Error::Protocol("Transaction response has malformed Uuid".into()))?;
        log::trace!("remote store: new transaction {}", uuid);
        Ok(Box::new(RemoteTransaction {
            uuid,
            conn: self.conn.clone(),
            index_put: AtomicBool::new(false),
        }))
    }

    fn get_indexes(&self) -> Result<Vec<Uuid>, Error> {
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip("Snapshots", None)?)?;
        resp.snapshots
            .unwrap_or_default()
            .into_iter()
            .map(|s| {
                s.parse()
                    .map_err(|_| Error::Protocol(format!("malformed snapshot uuid {:?}", s)))
            })
            .collect()
    }

    fn get_index(&self, uuid: &Uuid) -> Result<Vec<u8>, Error> {
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip(&format!("IndexGet:{}", uuid), None)?)?;
        decode_payload(resp.index, "Index")
    }

    fn put_chunk(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        let payload = serde_json::to_string(&DataPayload {
            data: base64::encode(buf),
        })
        .unwrap();
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip(&format!("ChunkPut:{}", sum), Some(&payload))?)?;
        Ok(())
    }

    fn put_object(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        let payload = serde_json::to_string(&DataPayload {
            data: base64::encode(buf),
        })
        .unwrap();
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip(&format!("ObjectPut:{}", sum), Some(&payload))?)?;
        Ok(())
    }

    fn get_chunk(&self, sum: &Checksum) -> Result<Vec<u8>, Error> {
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip(&format!("ChunkGet:{}", sum), None)?)?;
        decode_payload(resp.chunk, "Chunk")
    }

    fn get_object(&self, sum: &Checksum) -> Result<Vec<u8>, Error> {
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip(&format!("ObjectGet:{}", sum), None)?)?;
        decode_payload(resp.object, "Object")
    }

    fn check_chunk(&self, _sum: &Checksum) -> Result<bool, Error> {
        // `ChunkExists` has no wire form in SPEC_FULL.md §6 and the source
        // this protocol mirrors returns false unconditionally for it over
        // the network (treated as a known bug, see DESIGN.md); dedup goes
        // through `reference_chunks` instead, which this does not replace.
        Ok(false)
    }

    fn check_object(&self, sum: &Checksum) -> Result<bool, Error> {
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip(&format!("ObjectMark:{}", sum), None)?)?;
        Ok(resp.res.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn purge(&self, uuid: &Uuid) -> Result<(), Error> {
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip(&format!("Purge:{}", uuid), None)?)?;
        Ok(())
    }
}

pub struct RemoteTransaction {
    uuid: Uuid,
    conn: Arc<Mutex<Connection>>,
    /// Mirrors the server's "PutIndex must precede Commit" rule locally, so
    /// a doomed `Commit` never crosses the wire (SPEC_FULL.md §9).
    index_put: AtomicBool,
}

impl Transaction for RemoteTransaction {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn put_chunk(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        let payload = serde_json::to_string(&DataPayload {
            data: base64::encode(buf),
        })
        .unwrap();
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip(&format!("ChunkPut:{}", sum), Some(&payload))?)?;
        Ok(())
    }

    fn put_object(&self, sum: &Checksum, buf: &[u8]) -> Result<(), Error> {
        let payload = serde_json::to_string(&DataPayload {
            data: base64::encode(buf),
        })
        .unwrap();
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip(&format!("ObjectPut:{}", sum), Some(&payload))?)?;
        Ok(())
    }

    fn put_index(&self, buf: &[u8]) -> Result<(), Error> {
        let payload = serde_json::to_string(&IndexPayload {
            index: base64::encode(buf),
        })
        .unwrap();
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip("IndexPut", Some(&payload))?)?;
        self.index_put.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn reference_chunks(&self, keys: &[Checksum]) -> Result<BTreeMap<Checksum, bool>, Error> {
        let payload = serde_json::to_string(&ChecksumsPayload {
            checksums: keys.iter().map(|k| k.to_string()).collect(),
        })
        .unwrap();
        let mut conn = self.conn.lock().unwrap();
        let resp = checked(conn.roundtrip("ChunksMark", Some(&payload))?)?;
        parse_presence_map(resp)
    }

    fn reference_objects(&self, keys: &[Checksum]) -> Result<BTreeMap<Checksum, bool>, Error> {
        // The wire protocol only defines a per-key `ObjectMark`, not a
        // batched form, so this issues one request per key (SPEC_FULL.md
        // §6 lists `ObjectMark:<sum>` singular where `ChunksMark` is
        // batched — an asymmetry preserved from the source protocol).
        let mut conn = self.conn.lock().unwrap();
        let mut out = BTreeMap::new();
        for key in keys {
            let resp = checked(conn.roundtrip(&format!("ObjectMark:{}", key), None)?)?;
            let present = resp.res.and_then(|v| v.as_bool()).unwrap_or(false);
            out.insert(*key, present);
        }
        Ok(out)
    }

    fn commit(&self) -> Result<(), Error> {
        if !self.index_put.load(Ordering::SeqCst) {
            return Err(Error::State(format!(
                "transaction {}: commit without PutIndex",
                self.uuid
            )));
        }
        let mut conn = self.conn.lock().unwrap();
        checked(conn.roundtrip("Commit", None)?)?;
        Ok(())
    }
}

fn parse_presence_map(resp: Response) -> Result<BTreeMap<Checksum, bool>, Error> {
    let value = resp
        .res
        .ok_or_else(|| Error::Protocol("ChunksMark response missing Res".into()))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::Protocol("ChunksMark Res is not a JSON object".into()))?;
    let mut out = BTreeMap::new();
    for (key, present) in object {
        let checksum: Checksum = key
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed checksum {:?} in ChunksMark response", key)))?;
        out.insert(checksum, present.as_bool().unwrap_or(false));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::remote::RemoteServer;
    use crate::store::LocalStore;

    fn spawn_server() -> (std::net::SocketAddr, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path(), None).unwrap());
        let server = RemoteServer::bind("127.0.0.1:0", store).unwrap();
        let addr = server.local_addr().unwrap();
        std::thread::spawn(move || server.serve());
        (addr, dir)
    }

    #[test]
    fn commit_without_put_index_fails_locally_without_a_round_trip() {
        let (addr, _dir) = spawn_server();
        let client = RemoteStore::connect(&addr.ip().to_string(), addr.port()).unwrap();
        let txn = client.transaction().unwrap();
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn commit_after_put_index_succeeds() {
        let (addr, _dir) = spawn_server();
        let client = RemoteStore::connect(&addr.ip().to_string(), addr.port()).unwrap();
        let txn = client.transaction().unwrap();
        txn.put_index(b"index bytes").unwrap();
        txn.commit().unwrap();
    }
}
