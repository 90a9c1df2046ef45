//! DEFLATE compression, matching the `compression.Deflate`/`Inflate` calls
//! of the snapshot lifecycle this module's callers implement.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::Error;

/// Compress `plaintext` with DEFLATE at the default compression level.
pub fn deflate(plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plaintext)?;
    encoder.finish().map_err(Error::from)
}

/// Decompress a DEFLATE stream produced by [`deflate`].
///
/// Fails with [`Error::Codec`] on malformed framing — never silently
/// truncates.
pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Codec(format!("inflate failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_lossless() {
        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = deflate(&plaintext).unwrap();
        assert!(compressed.len() < plaintext.len());
        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(decompressed, plaintext);
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = deflate(&[]).unwrap();
        let decompressed = inflate(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn garbage_input_is_a_codec_error() {
        let err = inflate(&[0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
