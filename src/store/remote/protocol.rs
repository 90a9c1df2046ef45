//! Wire framing for the remote backend (SPEC_FULL.md §6): one TCP
//! connection, line-delimited requests and responses. Each request is a
//! command line (`keyword` or `keyword:arg`); puts additionally send one
//! JSON line of payload. Exactly one JSON response line follows every
//! request.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub fn write_line<W: Write>(w: &mut W, line: &str) -> Result<(), Error> {
    w.write_all(line.as_bytes())?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

/// Read one `\n`-terminated line. An empty read (peer closed the
/// connection) is reported as `Error::Protocol`, not `Error::Io`, since it
/// always means a framing violation at this layer: every request expects
/// exactly one response line.
pub fn read_line<R: BufRead>(r: &mut R) -> Result<String, Error> {
    let mut line = String::new();
    let n = r.read_line(&mut line)?;
    if n == 0 {
        return Err(Error::Protocol("connection closed mid-request".into()));
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}

/// Response envelope. Every command response is exactly one of these; only
/// the fields relevant to the request in question are populated.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "Res", skip_serializing_if = "Option::is_none")]
    pub res: Option<serde_json::Value>,
    #[serde(rename = "Uuid", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "Snapshots", skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<Vec<String>>,
    #[serde(rename = "Index", skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "Object", skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(rename = "Chunk", skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            res: Some(serde_json::Value::Bool(true)),
            ..Default::default()
        }
    }

    pub fn bool_res(b: bool) -> Self {
        Response {
            res: Some(serde_json::Value::Bool(b)),
            ..Default::default()
        }
    }

    pub fn from_error(e: &Error) -> Self {
        Response {
            error: Some(encode_error(e)),
            ..Default::default()
        }
    }

    pub fn into_error(self) -> Option<Error> {
        self.error.map(|s| decode_error(&s))
    }
}

/// Encode an `Error`'s kind into the wire error string so the client can
/// reconstruct the same variant instead of collapsing everything to
/// `Error::Protocol`.
fn encode_error(e: &Error) -> String {
    match e {
        Error::NotFound(m) => format!("NotFound: {}", m),
        Error::Io(err) => format!("Io: {}", err),
        Error::Codec(m) => format!("Codec: {}", m),
        Error::Auth(m) => format!("Auth: {}", m),
        Error::Signature(m) => format!("Signature: {}", m),
        Error::State(m) => format!("State: {}", m),
        Error::Protocol(m) => format!("Protocol: {}", m),
    }
}

fn decode_error(s: &str) -> Error {
    match s.split_once(": ") {
        Some(("NotFound", m)) => Error::not_found(m.to_string()),
        Some(("Codec", m)) => Error::Codec(m.to_string()),
        Some(("Auth", m)) => Error::Auth(m.to_string()),
        Some(("Signature", m)) => Error::Signature(m.to_string()),
        Some(("State", m)) => Error::State(m.to_string()),
        Some(("Io", m)) => Error::Io(std::io::Error::new(std::io::ErrorKind::Other, m.to_string())),
        _ => Error::Protocol(s.to_string()),
    }
}

#[derive(Serialize, Deserialize)]
pub struct DataPayload {
    #[serde(rename = "Data")]
    pub data: String,
}

#[derive(Serialize, Deserialize)]
pub struct IndexPayload {
    #[serde(rename = "Index")]
    pub index: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChecksumsPayload {
    #[serde(rename = "Checksums")]
    pub checksums: Vec<String>,
}
