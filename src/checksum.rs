//! Content address: a SHA-256 digest of plaintext, displayed as lowercase hex.

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use openssl::hash::{Hasher, MessageDigest};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const CHECKSUM_LEN: usize = 32;

/// Cryptographic digest of a chunk's or object's plaintext bytes.
///
/// Two checksums compare equal iff their bytes compare equal; collision
/// resistance of SHA-256 is assumed, not re-derived here.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    pub fn of(data: &[u8]) -> Result<Self, Error> {
        let mut hasher = Hasher::new(MessageDigest::sha256())
            .map_err(|e| Error::Codec(e.to_string()))?;
        hasher.update(data).map_err(|e| Error::Codec(e.to_string()))?;
        let digest = hasher.finish().map_err(|e| Error::Codec(e.to_string()))?;
        let mut bytes = [0u8; CHECKSUM_LEN];
        bytes.copy_from_slice(&digest);
        Ok(Checksum(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Hex-shard prefix used by the local backend's sharded directory layout:
    /// the first two hex bytes, e.g. `("ab", "cd")`.
    pub fn shard(&self) -> (String, String) {
        (hex::encode(&self.0[0..1]), hex::encode(&self.0[1..2]))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self)
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let decoded = hex::decode(s).map_err(|e| Error::Codec(format!("invalid checksum: {}", e)))?;
        if decoded.len() != CHECKSUM_LEN {
            return Err(Error::Codec(format!(
                "invalid checksum length: expected {} bytes, got {}",
                CHECKSUM_LEN,
                decoded.len()
            )));
        }
        let mut bytes = [0u8; CHECKSUM_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Checksum(bytes))
    }
}

impl TryFrom<String> for Checksum {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<Checksum> for String {
    fn from(c: Checksum) -> String {
        c.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_hex() {
        let sum = Checksum::of(b"hello").unwrap();
        let text = sum.to_string();
        assert_eq!(text.len(), CHECKSUM_LEN * 2);
        let parsed: Checksum = text.parse().unwrap();
        assert_eq!(sum, parsed);
    }

    #[test]
    fn sha256_is_deterministic_and_content_addressed() {
        let a = Checksum::of(b"hello").unwrap();
        let b = Checksum::of(b"hello").unwrap();
        let c = Checksum::of(b"world").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abcd".parse::<Checksum>().is_err());
    }
}
