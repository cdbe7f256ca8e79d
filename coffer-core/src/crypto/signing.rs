//! Optional HMAC-SHA256 integrity tags.
//!
//! A caller-held key signs the sealed record (name, expiry, and envelope
//! bytes), so any later read or delete with the same key detects storage
//! tampering that AES-GCM alone cannot, such as swapping in a different
//! validly-encrypted record.

use crate::types::{Envelope, Expiry};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

const SIGNING_CONTEXT: &[u8] = b"coffer.secret.v1\n";

/// Caller-supplied signing key. The store never persists it.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(material: impl AsRef<[u8]>) -> Self {
        SigningKey(material.as_ref().to_vec())
    }

    /// Tag over the full sealed record.
    pub fn sign(&self, name: &str, expires: Expiry, envelope: &Envelope) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(&message(name, expires, envelope));
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time check of a stored tag.
    pub fn verify(&self, name: &str, expires: Expiry, envelope: &Envelope, tag: &[u8]) -> bool {
        let mut mac = self.mac();
        mac.update(&message(name, expires, envelope));
        mac.verify_slice(tag).is_ok()
    }

    fn mac(&self) -> Hmac<Sha256> {
        Hmac::<Sha256>::new_from_slice(&self.0).expect("hmac-sha256 accepts any key length")
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Canonical signing input. Names are printable ascii, so the newline
/// separators cannot collide with field contents.
fn message(name: &str, expires: Expiry, envelope: &Envelope) -> Vec<u8> {
    let mut msg = Vec::with_capacity(SIGNING_CONTEXT.len() + 64 + envelope.ciphertext.len());
    msg.extend_from_slice(SIGNING_CONTEXT);
    msg.extend_from_slice(name.as_bytes());
    msg.push(b'\n');
    match expires {
        Expiry::Never => msg.extend_from_slice(b"never"),
        Expiry::At(ts) => msg.extend_from_slice(ts.timestamp_millis().to_string().as_bytes()),
    }
    msg.push(b'\n');
    msg.extend_from_slice(&envelope.hkdf_salt);
    msg.extend_from_slice(&envelope.nonce);
    msg.extend_from_slice(&envelope.ciphertext);
    msg
}
