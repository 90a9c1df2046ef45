//! Reference `RemoteServer` (SPEC_FULL.md §4.2): the counterpart the
//! `RemoteStore` client talks to. Single-threaded and blocking *per
//! connection* — each connection gets its own thread (SPEC_FULL.md §5's
//! "parallel OS threads" model), and within a connection every request is
//! handled to completion before the next line is read, matching the
//! protocol's no-pipelining invariant.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use uuid::Uuid;

use super::protocol::{read_line, write_line, ChecksumsPayload, DataPayload, IndexPayload, Response};
use crate::checksum::Checksum;
use crate::error::Error;
use crate::store::{LocalStore, Store, Transaction};

/// Reference remote backend daemon: the `RemoteStore` client's counterpart.
/// Accepts connections and serves each on its own thread against a shared
/// `LocalStore`, until the listener is closed or `accept` errors.
/// Intended for tests (a loopback listener bound to an ephemeral port)
/// rather than as a hardened production daemon.
pub struct RemoteServer {
    listener: TcpListener,
    store: Arc<LocalStore>,
}

impl RemoteServer {
    pub fn bind(addr: &str, store: Arc<LocalStore>) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)?;
        Ok(RemoteServer { listener, store })
    }

    /// The address this server actually bound to, useful when `addr` was
    /// `"127.0.0.1:0"` and the OS picked an ephemeral port.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop, blocking the calling thread. Each accepted
    /// connection is handled on its own spawned thread.
    pub fn serve(self) {
        for incoming in self.listener.incoming() {
            match incoming {
                Ok(stream) => {
                    let store = self.store.clone();
                    std::thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, store) {
                            log::warn!("remote server: connection ended: {}", e);
                        }
                    });
                }
                Err(e) => {
                    log::warn!("remote server: accept failed: {}", e);
                    break;
                }
            }
        }
    }
}

fn handle_connection(stream: TcpStream, store: Arc<LocalStore>) -> Result<(), Error> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut txn: Option<Box<dyn Transaction>> = None;

    loop {
        let line = match read_line(&mut reader) {
            Ok(l) => l,
            Err(_) => return Ok(()), // peer closed the connection; not an error at this layer
        };

        let response = dispatch(&line, &mut reader, &store, &mut txn);
        let body = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"Error":"Protocol: response serialization failed"}"#.to_string());
        write_line(&mut writer, &body)?;
    }
}

fn dispatch(
    line: &str,
    reader: &mut BufReader<TcpStream>,
    store: &Arc<LocalStore>,
    txn: &mut Option<Box<dyn Transaction>>,
) -> Response {
    match run(line, reader, store, txn) {
        Ok(resp) => resp,
        Err(e) => Response::from_error(&e),
    }
}

fn run(
    line: &str,
    reader: &mut BufReader<TcpStream>,
    store: &Arc<LocalStore>,
    txn: &mut Option<Box<dyn Transaction>>,
) -> Result<Response, Error> {
    let (command, arg) = match line.split_once(':') {
        Some((c, a)) => (c, Some(a)),
        None => (line, None),
    };

    match command {
        "Transaction" => {
            let new_txn = store.transaction()?;
            let uuid = new_txn.uuid();
            *txn = Some(new_txn);
            Ok(Response {
                uuid: Some(uuid.to_string()),
                ..Default::default()
            })
        }
        "Snapshots" => {
            let uuids = store.get_indexes()?;
            Ok(Response {
                snapshots: Some(uuids.into_iter().map(|u| u.to_string()).collect()),
                ..Default::default()
            })
        }
        "IndexGet" => {
            let uuid = parse_uuid(arg)?;
            let data = store.get_index(&uuid)?;
            Ok(Response {
                index: Some(base64::encode(data)),
                ..Default::default()
            })
        }
        "ObjectGet" => {
            let sum = parse_checksum(arg)?;
            let data = store.get_object(&sum)?;
            Ok(Response {
                object: Some(base64::encode(data)),
                ..Default::default()
            })
        }
        "ChunkGet" => {
            let sum = parse_checksum(arg)?;
            let data = store.get_chunk(&sum)?;
            Ok(Response {
                chunk: Some(base64::encode(data)),
                ..Default::default()
            })
        }
        "ObjectMark" => {
            let sum = parse_checksum(arg)?;
            let txn = current_txn(txn)?;
            let map = txn.reference_objects(&[sum])?;
            Ok(Response::bool_res(map.get(&sum).copied().unwrap_or(false)))
        }
        "Purge" => {
            let uuid = parse_uuid(arg)?;
            store.purge(&uuid)?;
            Ok(Response::ok())
        }
        "ChunksMark" => {
            let payload: ChecksumsPayload = read_payload(reader)?;
            let keys: Vec<Checksum> = payload
                .checksums
                .iter()
                .map(|s| s.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| Error::Protocol("malformed checksum in ChunksMark".into()))?;
            let txn = current_txn(txn)?;
            let map = txn.reference_chunks(&keys)?;
            let object: serde_json::Map<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::Bool(v)))
                .collect();
            Ok(Response {
                res: Some(serde_json::Value::Object(object)),
                ..Default::default()
            })
        }
        "ObjectPut" => {
            let sum = parse_checksum(arg)?;
            let payload: DataPayload = read_payload(reader)?;
            let data = base64::decode(&payload.data)
                .map_err(|e| Error::Protocol(format!("invalid base64 in ObjectPut: {}", e)))?;
            // Store-level puts (no Transaction opened on this connection) go
            // straight to the backing store, matching the local backend's
            // `Store::put_object`; within a Transaction they go through it.
            match txn.as_ref() {
                Some(t) => t.put_object(&sum, &data)?,
                None => store.put_object(&sum, &data)?,
            }
            Ok(Response::ok())
        }
        "ChunkPut" => {
            let sum = parse_checksum(arg)?;
            let payload: DataPayload = read_payload(reader)?;
            let data = base64::decode(&payload.data)
                .map_err(|e| Error::Protocol(format!("invalid base64 in ChunkPut: {}", e)))?;
            match txn.as_ref() {
                Some(t) => t.put_chunk(&sum, &data)?,
                None => store.put_chunk(&sum, &data)?,
            }
            Ok(Response::ok())
        }
        "IndexPut" => {
            let payload: IndexPayload = read_payload(reader)?;
            let data = base64::decode(&payload.index)
                .map_err(|e| Error::Protocol(format!("invalid base64 in IndexPut: {}", e)))?;
            current_txn(txn)?.put_index(&data)?;
            Ok(Response::ok())
        }
        "Commit" => {
            let active = txn
                .take()
                .ok_or_else(|| Error::State("Commit without an active Transaction".into()))?;
            active.commit()?;
            Ok(Response::ok())
        }
        other => Err(Error::Protocol(format!("unknown command {:?}", other))),
    }
}

fn current_txn<'a>(txn: &'a mut Option<Box<dyn Transaction>>) -> Result<&'a mut Box<dyn Transaction>, Error> {
    txn.as_mut()
        .ok_or_else(|| Error::State("no active Transaction on this connection".into()))
}

fn parse_uuid(arg: Option<&str>) -> Result<Uuid, Error> {
    arg.ok_or_else(|| Error::Protocol("missing uuid argument".into()))?
        .parse()
        .map_err(|_| Error::Protocol("malformed uuid argument".into()))
}

fn parse_checksum(arg: Option<&str>) -> Result<Checksum, Error> {
    arg.ok_or_else(|| Error::Protocol("missing checksum argument".into()))?
        .parse()
        .map_err(|_| Error::Protocol("malformed checksum argument".into()))
}

fn read_payload<T: serde::de::DeserializeOwned>(reader: &mut BufReader<TcpStream>) -> Result<T, Error> {
    let line = read_line(reader)?;
    serde_json::from_str(&line).map_err(|e| Error::Protocol(format!("malformed payload: {}", e)))
}
