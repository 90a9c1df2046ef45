//! Error taxonomy for the snapshot engine (see SPEC_FULL.md §7).
//!
//! Every fallible core API returns `Result<T, Error>` so callers can match on
//! kind instead of string-sniffing. `NotFound` is the only variant that is
//! ever recovered from inside the crate (cache miss falling back to the
//! store); everything else propagates to the first API boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("signature verification failed: {0}")]
    Signature(String),

    #[error("protocol misuse: {0}")]
    State(String),

    #[error("remote protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Error::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
