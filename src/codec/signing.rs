//! Detached Ed25519 signatures over the index, per SPEC_FULL.md §4.1.
//!
//! The `Keypair` is the reference implementation of the "Keypair" external
//! collaborator named in SPEC_FULL.md §6 (`Sign(bytes) -> 64 bytes`,
//! `PublicKey: bytes`), backed by `openssl`'s Ed25519 support.

use openssl::pkey::{Id, PKey, Private, Public};
use openssl::sign::{Signer, Verifier};

use super::crypto::{decrypt, encrypt, Secret};
use crate::error::Error;

pub const SIGNATURE_LEN: usize = 64;

pub struct Keypair {
    private: PKey<Private>,
    public_bytes: Vec<u8>,
}

impl Keypair {
    pub fn generate() -> Result<Self, Error> {
        let private =
            PKey::generate_ed25519().map_err(|e| Error::Signature(format!("keygen: {}", e)))?;
        let public_bytes = private
            .raw_public_key()
            .map_err(|e| Error::Signature(format!("public key: {}", e)))?;
        Ok(Keypair { private, public_bytes })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_bytes
    }

    /// Sign `data`, returning a detached 64-byte Ed25519 signature.
    pub fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_LEN], Error> {
        let mut signer = Signer::new_without_digest(&self.private)
            .map_err(|e| Error::Signature(format!("signer init: {}", e)))?;
        let raw = signer
            .sign_oneshot_to_vec(data)
            .map_err(|e| Error::Signature(format!("sign: {}", e)))?;
        if raw.len() != SIGNATURE_LEN {
            return Err(Error::Signature(format!(
                "unexpected signature length {}",
                raw.len()
            )));
        }
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&raw);
        Ok(out)
    }

    /// Verify a detached signature against an explicit public key — used on
    /// `Snapshot::load`, where the public key comes from `Metadata.public_key`
    /// rather than from this keypair (the loader may not hold the private key).
    pub fn verify(&self, data: &[u8], signature: &[u8; SIGNATURE_LEN]) -> Result<(), Error> {
        verify_with_public_key(&self.public_bytes, data, signature)
    }

    /// Serialize the raw private key bytes for encrypted on-disk storage.
    fn private_bytes(&self) -> Result<Vec<u8>, Error> {
        self.private
            .raw_private_key()
            .map_err(|e| Error::Signature(format!("private key export: {}", e)))
    }

    fn from_private_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let private = PKey::private_key_from_raw_bytes(bytes, Id::ED25519)
            .map_err(|e| Error::Signature(format!("private key import: {}", e)))?;
        let public_bytes = private
            .raw_public_key()
            .map_err(|e| Error::Signature(format!("public key: {}", e)))?;
        Ok(Keypair { private, public_bytes })
    }

    /// Encrypt the raw private key with `secret` for storage at
    /// `<repo>/keypair` (SPEC_FULL.md §6).
    pub fn seal(&self, secret: &Secret) -> Result<Vec<u8>, Error> {
        encrypt(secret, &self.private_bytes()?)
    }

    /// Load a keypair previously sealed with [`Keypair::seal`].
    pub fn unseal(data: &[u8], secret: &Secret) -> Result<Self, Error> {
        let raw = decrypt(secret, data)?;
        Self::from_private_bytes(&raw)
    }
}

/// Verify a detached Ed25519 signature against a raw public key, as used by
/// `Snapshot::load` to check `Metadata.public_key` against the on-disk
/// signature without needing the private key.
pub fn verify_with_public_key(
    public_key: &[u8],
    data: &[u8],
    signature: &[u8; SIGNATURE_LEN],
) -> Result<(), Error> {
    let key = PKey::public_key_from_raw_bytes(public_key, Id::ED25519)
        .map_err(|e| Error::Signature(format!("public key import: {}", e)))?;
    let mut verifier = Verifier::new_without_digest(&key)
        .map_err(|e| Error::Signature(format!("verifier init: {}", e)))?;
    let ok = verifier
        .verify_oneshot(signature, data)
        .map_err(|e| Error::Signature(format!("verify: {}", e)))?;
    if ok {
        Ok(())
    } else {
        Err(Error::Signature("signature mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crypto::derive_key;

    #[test]
    fn sign_then_verify_round_trip() {
        let keypair = Keypair::generate().unwrap();
        let signature = keypair.sign(b"index bytes").unwrap();
        assert!(keypair.verify(b"index bytes", &signature).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let keypair = Keypair::generate().unwrap();
        let signature = keypair.sign(b"index bytes").unwrap();
        assert!(keypair.verify(b"different bytes", &signature).is_err());
    }

    #[test]
    fn verify_with_public_key_matches_keypair_verify() {
        let keypair = Keypair::generate().unwrap();
        let signature = keypair.sign(b"payload").unwrap();
        assert!(verify_with_public_key(keypair.public_key(), b"payload", &signature).is_ok());
    }

    #[test]
    fn seal_unseal_round_trip() {
        let keypair = Keypair::generate().unwrap();
        let secret = derive_key("passphrase", b"0123456789abcdef").unwrap();
        let sealed = keypair.seal(&secret).unwrap();
        let unsealed = Keypair::unseal(&sealed, &secret).unwrap();
        assert_eq!(keypair.public_key(), unsealed.public_key());

        let signature = unsealed.sign(b"message").unwrap();
        assert!(keypair.verify(b"message", &signature).is_ok());
    }
}
