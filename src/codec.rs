//! Codec pipeline: compression, authenticated encryption, and signing.
//!
//! The three transforms are orthogonal and each optional, selected by the
//! repository's [`crate::config::RepositoryConfig`]. Blobs (chunks, objects)
//! are compressed then encrypted; only the index is additionally signed, and
//! the signature is appended to the compressed plaintext *before* encryption
//! (`encrypt(compress(plaintext) || signature)`), never after.

mod compression;
mod crypto;
mod signing;

pub use compression::{deflate, inflate};
pub use crypto::{derive_key, encrypt, decrypt, Secret, KEY_LEN};
pub use signing::{verify_with_public_key, Keypair, SIGNATURE_LEN};

use crate::config::RepositoryConfig;
use crate::error::Error;

/// Encode a chunk or object blob: `compress? -> encrypt?`. No signature.
pub fn encode_blob(
    plaintext: &[u8],
    config: &RepositoryConfig,
    secret: Option<&Secret>,
) -> Result<Vec<u8>, Error> {
    let data = if config.compression {
        deflate(plaintext)?
    } else {
        plaintext.to_vec()
    };

    match secret {
        Some(secret) => encrypt(secret, &data),
        None => Ok(data),
    }
}

/// Decode a chunk or object blob: the mirror of [`encode_blob`].
pub fn decode_blob(
    raw: &[u8],
    config: &RepositoryConfig,
    secret: Option<&Secret>,
) -> Result<Vec<u8>, Error> {
    let data = match secret {
        Some(secret) => decrypt(secret, raw)?,
        None => raw.to_vec(),
    };

    if config.compression {
        inflate(&data)
    } else {
        Ok(data)
    }
}

/// Encode an index: `compress? -> sign? (append 64B) -> encrypt?`.
pub fn encode_index(
    plaintext: &[u8],
    config: &RepositoryConfig,
    secret: Option<&Secret>,
    keypair: Option<&Keypair>,
) -> Result<Vec<u8>, Error> {
    let mut data = if config.compression {
        deflate(plaintext)?
    } else {
        plaintext.to_vec()
    };

    if let Some(keypair) = keypair {
        let signature = keypair.sign(&data)?;
        data.extend_from_slice(&signature);
    }

    match secret {
        Some(secret) => encrypt(secret, &data),
        None => Ok(data),
    }
}

/// Decode an index: the mirror of [`encode_index`]. The signature, if any,
/// was appended to the *compressed* bytes before encryption, so it must be
/// split off before inflating, not after. Returns the final deserializable
/// plaintext, plus — when `signed` — the exact bytes the signature covers
/// (the post-compression, pre-signature payload) together with the
/// signature itself, for the caller to verify.
pub fn decode_index(
    raw: &[u8],
    config: &RepositoryConfig,
    secret: Option<&Secret>,
    signed: bool,
) -> Result<(Vec<u8>, Option<(Vec<u8>, [u8; SIGNATURE_LEN])>), Error> {
    let data = match secret {
        Some(secret) => decrypt(secret, raw)?,
        None => raw.to_vec(),
    };

    let (signed_payload, signature) = if signed {
        let (payload, signature) = split_signature(&data)?;
        (payload.to_vec(), Some(signature))
    } else {
        (data, None)
    };

    let plaintext = if config.compression {
        inflate(&signed_payload)?
    } else {
        signed_payload.clone()
    };

    Ok((plaintext, signature.map(|sig| (signed_payload, sig))))
}

/// Split a signed payload into `(signed_plaintext, signature)`.
pub fn split_signature(data: &[u8]) -> Result<(&[u8], [u8; SIGNATURE_LEN]), Error> {
    if data.len() < SIGNATURE_LEN {
        return Err(Error::Signature("payload shorter than signature".into()));
    }
    let (payload, sig_bytes) = data.split_at(data.len() - SIGNATURE_LEN);
    let mut signature = [0u8; SIGNATURE_LEN];
    signature.copy_from_slice(sig_bytes);
    Ok((payload, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(compression: bool) -> RepositoryConfig {
        RepositoryConfig {
            compression,
            encryption: false,
            signing: false,
            version: "1".into(),
            repository_id: uuid::Uuid::new_v4(),
        }
    }

    #[test]
    fn blob_roundtrip_no_crypto() {
        let cfg = config(true);
        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let encoded = encode_blob(&plaintext, &cfg, None).unwrap();
        let decoded = decode_blob(&encoded, &cfg, None).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn blob_roundtrip_with_crypto() {
        let cfg = config(true);
        let secret = derive_key("correct horse battery staple", b"salt-bytes-1234").unwrap();
        let plaintext = b"secret file contents";
        let encoded = encode_blob(plaintext, &cfg, Some(&secret)).unwrap();
        assert_ne!(encoded, plaintext);
        let decoded = decode_blob(&encoded, &cfg, Some(&secret)).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn blob_decrypt_wrong_secret_fails_auth() {
        let cfg = config(false);
        let s1 = derive_key("password-one", b"0123456789abcdef").unwrap();
        let s2 = derive_key("password-two", b"0123456789abcdef").unwrap();
        let encoded = encode_blob(b"data", &cfg, Some(&s1)).unwrap();
        let err = decode_blob(&encoded, &cfg, Some(&s2)).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn index_sign_then_encrypt_order() {
        let cfg = config(true);
        let keypair = Keypair::generate().unwrap();
        let plaintext = br#"{"Metadata":{},"Index":{}}"#;
        let encoded = encode_index(plaintext, &cfg, None, Some(&keypair)).unwrap();

        // No secret: decode_index should hand back the exact compressed
        // bytes the signature was computed over, plus the signature.
        let (decoded_plaintext, signed) = decode_index(&encoded, &cfg, None, true).unwrap();
        assert_eq!(decoded_plaintext, plaintext);
        let (signed_payload, signature) = signed.unwrap();
        assert!(keypair.verify(&signed_payload, &signature).is_ok());
    }

    #[test]
    fn tampering_with_signed_index_breaks_verification() {
        let cfg = config(false);
        let keypair = Keypair::generate().unwrap();
        let plaintext = b"index bytes";
        let mut encoded = encode_index(plaintext, &cfg, None, Some(&keypair)).unwrap();
        encoded[0] ^= 0xff;

        let (_plaintext, signed) = decode_index(&encoded, &cfg, None, true).unwrap();
        let (signed_payload, signature) = signed.unwrap();
        assert!(keypair.verify(&signed_payload, &signature).is_err());
    }
}
