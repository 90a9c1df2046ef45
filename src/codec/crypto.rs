//! AES-256-GCM authenticated encryption with an Argon2id-derived key.
//!
//! Encrypted payload layout: `nonce (12 B) || ciphertext || GCM tag (16 B)`,
//! matching the construction `aes_gcm::Aead::encrypt` returns by default.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::Error;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Symmetric key derived from the repository passphrase. Held by a `Store`
/// and threaded through the codec pipeline; never serialized.
#[derive(Clone)]
pub struct Secret([u8; KEY_LEN]);

impl Secret {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Derive a 256-bit key from `passphrase` using Argon2id.
///
/// `salt` should be unique per repository (e.g. a random value stored
/// alongside `CONFIG`) so the same passphrase does not yield the same key
/// across independent repositories.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Secret, Error> {
    let params = Params::new(64 * 1024, 3, 1, Some(KEY_LEN))
        .map_err(|e| Error::Auth(format!("key derivation parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Auth(format!("key derivation failed: {}", e)))?;
    Ok(Secret(key))
}

/// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
pub fn encrypt(secret: &Secret, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = Aes256Gcm::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Auth(format!("bad key: {}", e)))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| Error::Auth("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt`]. Fails with [`Error::Auth`] on
/// tag mismatch (tampering or wrong passphrase) — never partially decodes.
pub fn decrypt(secret: &Secret, data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < NONCE_LEN {
        return Err(Error::Auth("ciphertext shorter than nonce".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Auth(format!("bad key: {}", e)))?;
    let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &data[NONCE_LEN..])
        .map_err(|_| Error::Auth("decryption failed - wrong passphrase or corrupted data".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let secret = derive_key("hunter2", b"0123456789abcdef").unwrap();
        let plaintext = b"some chunk bytes";
        let ciphertext = encrypt(&secret, plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);
        let decoded = decrypt(&secret, &ciphertext).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let secret = derive_key("hunter2", b"0123456789abcdef").unwrap();
        let mut ciphertext = encrypt(&secret, b"payload").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert!(decrypt(&secret, &ciphertext).is_err());
    }

    #[test]
    fn same_passphrase_different_salt_yields_different_keys() {
        let a = derive_key("hunter2", b"salt-aaaaaaaaaaa").unwrap();
        let b = derive_key("hunter2", b"salt-bbbbbbbbbbb").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
