use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const MAX_NAME_LEN: usize = 512;

/// Validates a secret name: non-empty printable ASCII, at most 512 bytes,
/// no leading or trailing whitespace.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "must not be empty",
        });
    }
    if !name.chars().all(|c| matches!(c, ' '..='~')) {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "contains characters outside printable ascii",
        });
    }
    // Safe to slice: everything past the ascii check is single-byte.
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName {
            name: format!("{}...", &name[..MAX_NAME_LEN]),
            reason: "exceeds 512 bytes",
        });
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "must not start or end with whitespace",
        });
    }
    Ok(())
}

/// Identity of one secret. Either a single opaque name or a
/// (namespace, key) pair; the pair form canonicalizes to `namespace/key`
/// and addresses the same keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretId(String);

impl SecretId {
    /// Build an identity from a plain name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(SecretId(name))
    }

    /// Build an identity from a namespace and key, canonicalized to
    /// `namespace/key`.
    pub fn scoped(namespace: &str, key: &str) -> Result<Self> {
        if namespace.is_empty() {
            return Err(Error::InvalidName {
                name: namespace.to_string(),
                reason: "namespace must not be empty",
            });
        }
        if key.is_empty() {
            return Err(Error::InvalidName {
                name: key.to_string(),
                reason: "key must not be empty",
            });
        }
        Self::new(format!("{namespace}/{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// When a secret stops being readable. `Never` survives every sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(DateTime<Utc>),
}

impl Expiry {
    /// Parse an RFC 3339 timestamp; `InvalidExpiry` on anything else.
    pub fn parse(value: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(value)
            .map(|ts| Expiry::At(ts.with_timezone(&Utc)))
            .map_err(|err| Error::InvalidExpiry {
                value: value.to_string(),
                reason: err.to_string(),
            })
    }

    /// Strictly past: true only when `now` is after the expiry instant.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(ts) => now > *ts,
        }
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Expiry::Never => serializer.serialize_none(),
            Expiry::At(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Expiry::Never),
            Some(raw) => Expiry::parse(&raw).map_err(serde::de::Error::custom),
        }
    }
}

/// Ciphertext plus the per-record key-derivation material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub hkdf_salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Persisted form of a secret. The value only ever exists here encrypted;
/// `expires` stays plaintext so sweeps never need to decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub name: String,
    pub expires: Expiry,
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
}

/// Decrypted view returned by the vault.
#[derive(Debug, Clone)]
pub struct Secret {
    pub id: SecretId,
    pub value: serde_json::Value,
    pub expires: Expiry,
    pub version: u64,
    pub signed: bool,
}

impl Secret {
    /// Read-time expiry judgment; loading never enforces this.
    pub fn has_expired(&self) -> bool {
        self.expires.is_past(Utc::now())
    }
}

/// Requested changes for a modify. Absent fields keep the current value.
#[derive(Debug, Clone, Default)]
pub struct SecretPatch {
    pub value: Option<serde_json::Value>,
    pub expires: Option<Expiry>,
}
