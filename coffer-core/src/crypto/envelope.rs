//! Envelope encryption for stored secrets.
//!
//! Every record gets its own AES-256-GCM key, derived from the master key
//! with HKDF-SHA256 over a fresh salt and the record name. Knowing one
//! record key reveals nothing about any other, and a blob copied to a
//! different name fails to decrypt.

use crate::error::{Error, Result};
use crate::types::Envelope;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

pub const MASTER_KEY_LEN: usize = 32;
pub const MASTER_KEY_ENV: &str = "COFFER_CRYPTO_KEY";

const HKDF_SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Root key material for the whole store. Never serialized, never logged.
#[derive(Clone)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    pub fn new(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        MasterKey(bytes)
    }

    /// Decode a standard-base64 key, enforcing the 32-byte length.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| Error::Crypto(format!("master key is not valid base64: {err}")))?;
        let bytes: [u8; MASTER_KEY_LEN] = bytes.try_into().map_err(|decoded: Vec<u8>| {
            Error::Crypto(format!(
                "master key must be {MASTER_KEY_LEN} bytes, got {}",
                decoded.len()
            ))
        })?;
        Ok(MasterKey(bytes))
    }

    /// Load the key from `COFFER_CRYPTO_KEY`.
    pub fn from_env() -> Result<Self> {
        let encoded = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| Error::Crypto(format!("{MASTER_KEY_ENV} is not set")))?;
        Self::from_base64(&encoded)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Seals and opens secret values under a single master key.
#[derive(Clone)]
pub struct EnvelopeService {
    master: MasterKey,
}

impl EnvelopeService {
    pub fn new(master: MasterKey) -> Self {
        EnvelopeService { master }
    }

    /// Encrypt `plaintext` under a key derived for `name`.
    pub fn seal(&self, name: &str, plaintext: &[u8]) -> Result<Envelope> {
        let hkdf_salt = random_bytes::<HKDF_SALT_LEN>();
        let key = derive_key(&self.master.0, &hkdf_salt, name.as_bytes())?;
        let nonce = random_bytes::<NONCE_LEN>();

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|err| Error::Crypto(format!("aes-gcm key setup failed: {err}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Crypto("aes-gcm encryption failed".to_string()))?;

        Ok(Envelope {
            hkdf_salt: hkdf_salt.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt an envelope sealed for `name`. Fails on any tampering and
    /// on envelopes sealed for a different name.
    pub fn open(&self, name: &str, envelope: &Envelope) -> Result<Vec<u8>> {
        if envelope.nonce.len() != NONCE_LEN {
            return Err(Error::Crypto(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                envelope.nonce.len()
            )));
        }
        let key = derive_key(&self.master.0, &envelope.hkdf_salt, name.as_bytes())?;

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|err| Error::Crypto(format!("aes-gcm key setup failed: {err}")))?;
        cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
            .map_err(|_| Error::Crypto("message authentication failed".to_string()))
    }
}

/// HKDF-SHA256 expansion of the master key into one record key.
fn derive_key(master: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), master);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|err| Error::Crypto(format!("hkdf expand failed: {err}")))?;
    Ok(okm)
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rng().fill_bytes(&mut buf);
    buf
}
