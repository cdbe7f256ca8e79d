use crate::backend::StorageBackend;
use crate::crypto::envelope::EnvelopeService;
use crate::crypto::signing::SigningKey;
use crate::error::{Error, Result};
use crate::types::{Expiry, SealedSecret, Secret, SecretId, SecretPatch};

/// How many times a modify re-reads and re-tries after losing a
/// concurrent-write race before giving up with `Conflict`.
const MODIFY_RETRY_LIMIT: usize = 10;

/// The secret store proper. Values are sealed before they reach the
/// backend and opened after they come back; the backend only ever sees
/// ciphertext.
///
/// Signing is per-record and caller-keyed: a record created with a
/// signing key can only be read, modified, or removed by presenting the
/// same key, and presenting a key to an unsigned record is refused.
pub struct SecretVault<B> {
    backend: B,
    crypto: EnvelopeService,
}

impl<B: StorageBackend> SecretVault<B> {
    pub fn new(backend: B, crypto: EnvelopeService) -> Self {
        SecretVault { backend, crypto }
    }

    /// Store a new secret and return its assigned version. Fails with
    /// `AlreadyExists` when the name is taken, even by an expired record.
    pub fn create(
        &self,
        id: &SecretId,
        value: &serde_json::Value,
        expires: Expiry,
        signing_key: Option<&SigningKey>,
    ) -> Result<u64> {
        let plaintext = serde_json::to_vec(value).map_err(Error::storage)?;
        let bytes = self.seal_record(id, &plaintext, expires, signing_key)?;
        self.backend.put(id.as_str(), bytes, None)
    }

    /// Decrypt and return a secret.
    ///
    /// Expiry is reported, not enforced: an expired record still loads,
    /// and the caller decides what that means. Absence wins over
    /// signature problems, so probing with a key cannot distinguish a
    /// missing record from a signed one.
    pub fn load(&self, id: &SecretId, signing_key: Option<&SigningKey>) -> Result<Secret> {
        let (sealed, version) = self.fetch(id)?;
        self.check_signature(id, &sealed, signing_key)?;
        let plaintext = self.crypto.open(id.as_str(), &sealed.envelope)?;
        let value = serde_json::from_slice(&plaintext).map_err(Error::storage)?;
        Ok(Secret {
            id: id.clone(),
            value,
            expires: sealed.expires,
            version,
            signed: sealed.signature.is_some(),
        })
    }

    /// Apply a patch under optimistic concurrency.
    ///
    /// Each attempt re-reads the current record, applies the patch on
    /// top, and writes back only if nothing changed in between. Losing
    /// the race restarts the attempt; after `MODIFY_RETRY_LIMIT` losses
    /// the modify fails with `Conflict`.
    pub fn modify(
        &self,
        id: &SecretId,
        patch: SecretPatch,
        signing_key: Option<&SigningKey>,
    ) -> Result<()> {
        for _ in 0..MODIFY_RETRY_LIMIT {
            let (sealed, version) = self.fetch(id)?;
            self.check_signature(id, &sealed, signing_key)?;

            let plaintext = match &patch.value {
                Some(value) => serde_json::to_vec(value).map_err(Error::storage)?,
                None => self.crypto.open(id.as_str(), &sealed.envelope)?,
            };
            let expires = patch.expires.unwrap_or(sealed.expires);

            let bytes = self.seal_record(id, &plaintext, expires, signing_key)?;
            match self.backend.put(id.as_str(), bytes, Some(version)) {
                Ok(_) => return Ok(()),
                Err(Error::Conflict { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::conflict(id.as_str()))
    }

    /// Delete a secret, subject to the same signature rules as `load`.
    pub fn remove(&self, id: &SecretId, signing_key: Option<&SigningKey>) -> Result<()> {
        let (sealed, _) = self.fetch(id)?;
        self.check_signature(id, &sealed, signing_key)?;
        if !self.backend.delete(id.as_str())? {
            return Err(Error::not_found(id.as_str()));
        }
        Ok(())
    }

    fn fetch(&self, id: &SecretId) -> Result<(SealedSecret, u64)> {
        let blob = self
            .backend
            .get(id.as_str())?
            .ok_or_else(|| Error::not_found(id.as_str()))?;
        let sealed: SealedSecret = serde_json::from_slice(&blob.bytes).map_err(Error::storage)?;
        Ok((sealed, blob.version))
    }

    /// A signed record needs its key, an unsigned record refuses one.
    /// Tags are checked against the requested name, so a blob copied
    /// under another name fails here before decryption is attempted.
    fn check_signature(
        &self,
        id: &SecretId,
        sealed: &SealedSecret,
        signing_key: Option<&SigningKey>,
    ) -> Result<()> {
        match (&sealed.signature, signing_key) {
            (Some(tag), Some(key))
                if key.verify(id.as_str(), sealed.expires, &sealed.envelope, tag) =>
            {
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(Error::SignatureInvalid {
                name: id.as_str().to_string(),
            }),
        }
    }

    fn seal_record(
        &self,
        id: &SecretId,
        plaintext: &[u8],
        expires: Expiry,
        signing_key: Option<&SigningKey>,
    ) -> Result<Vec<u8>> {
        let envelope = self.crypto.seal(id.as_str(), plaintext)?;
        let signature = signing_key.map(|key| key.sign(id.as_str(), expires, &envelope));
        let sealed = SealedSecret {
            name: id.as_str().to_string(),
            expires,
            envelope,
            signature,
        };
        serde_json::to_vec(&sealed).map_err(Error::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::crypto::envelope::MasterKey;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn vault_with_backend() -> (SecretVault<Arc<MemoryBackend>>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let crypto = EnvelopeService::new(MasterKey::new([42; 32]));
        (SecretVault::new(Arc::clone(&backend), crypto), backend)
    }

    fn vault() -> SecretVault<Arc<MemoryBackend>> {
        vault_with_backend().0
    }

    fn id(name: &str) -> SecretId {
        SecretId::new(name).unwrap()
    }

    #[test]
    fn create_load_roundtrip() {
        let vault = vault();
        let name = id("api/token");
        let value = json!({"token": "hunter2"});
        let version = vault.create(&name, &value, Expiry::Never, None).unwrap();
        assert_eq!(version, 1);

        let secret = vault.load(&name, None).unwrap();
        assert_eq!(secret.value, value);
        assert_eq!(secret.expires, Expiry::Never);
        assert_eq!(secret.version, 1);
        assert!(!secret.signed);
        assert!(!secret.has_expired());
    }

    #[test]
    fn stored_bytes_never_contain_the_plaintext() {
        let (vault, backend) = vault_with_backend();
        let name = id("api/token");
        vault
            .create(&name, &json!({"token": "hunter2"}), Expiry::Never, None)
            .unwrap();

        let blob = backend.get("api/token").unwrap().unwrap();
        let sealed_json = String::from_utf8(blob.bytes).unwrap();
        assert!(sealed_json.contains("api/token"));
        assert!(!sealed_json.contains("hunter2"));
    }

    #[test]
    fn create_twice_is_already_exists() {
        let vault = vault();
        let name = id("dup");
        vault.create(&name, &json!(1), Expiry::Never, None).unwrap();
        assert!(matches!(
            vault.create(&name, &json!(2), Expiry::Never, None),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn create_over_an_expired_record_still_collides() {
        let vault = vault();
        let name = id("lingering");
        let expired = Expiry::At(Utc::now() - Duration::hours(1));
        vault.create(&name, &json!("old"), expired, None).unwrap();

        // Expiry hides the record from readers; only a sweep or an
        // explicit remove frees the name.
        assert!(matches!(
            vault.create(&name, &json!("new"), Expiry::Never, None),
            Err(Error::AlreadyExists { .. })
        ));
        vault.remove(&name, None).unwrap();
        vault.create(&name, &json!("new"), Expiry::Never, None).unwrap();
    }

    #[test]
    fn load_missing_is_not_found() {
        assert!(matches!(
            vault().load(&id("ghost"), None),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn modify_updates_value_and_bumps_version() {
        let vault = vault();
        let name = id("rotated");
        vault
            .create(&name, &json!({"gen": 1}), Expiry::Never, None)
            .unwrap();

        let patch = SecretPatch {
            value: Some(json!({"gen": 2})),
            expires: None,
        };
        vault.modify(&name, patch, None).unwrap();

        let secret = vault.load(&name, None).unwrap();
        assert_eq!(secret.value, json!({"gen": 2}));
        assert_eq!(secret.version, 2);
        assert_eq!(secret.expires, Expiry::Never);
    }

    #[test]
    fn modify_keeps_unpatched_fields() {
        let vault = vault();
        let name = id("partial");
        let expires = Expiry::At(Utc::now() + Duration::days(30));
        vault.create(&name, &json!("v1"), expires, None).unwrap();

        // Value-only patch keeps the expiry.
        let patch = SecretPatch {
            value: Some(json!("v2")),
            expires: None,
        };
        vault.modify(&name, patch, None).unwrap();
        let secret = vault.load(&name, None).unwrap();
        assert_eq!(secret.value, json!("v2"));
        assert_eq!(secret.expires, expires);

        // Expiry-only patch keeps the value.
        let patch = SecretPatch {
            value: None,
            expires: Some(Expiry::Never),
        };
        vault.modify(&name, patch, None).unwrap();
        let secret = vault.load(&name, None).unwrap();
        assert_eq!(secret.value, json!("v2"));
        assert_eq!(secret.expires, Expiry::Never);
        assert_eq!(secret.version, 3);
    }

    #[test]
    fn modify_missing_is_not_found() {
        assert!(matches!(
            vault().modify(&id("ghost"), SecretPatch::default(), None),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn remove_then_load_is_not_found() {
        let vault = vault();
        let name = id("fleeting");
        vault.create(&name, &json!(true), Expiry::Never, None).unwrap();
        vault.remove(&name, None).unwrap();
        assert!(matches!(
            vault.load(&name, None),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            vault.remove(&name, None),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn signed_lifecycle_requires_the_key() {
        let vault = vault();
        let name = id("signed");
        let key = SigningKey::new(b"caller key");
        vault
            .create(&name, &json!("payload"), Expiry::Never, Some(&key))
            .unwrap();

        let secret = vault.load(&name, Some(&key)).unwrap();
        assert!(secret.signed);
        assert_eq!(secret.value, json!("payload"));

        assert!(matches!(
            vault.load(&name, None),
            Err(Error::SignatureInvalid { .. })
        ));
        assert!(matches!(
            vault.load(&name, Some(&SigningKey::new(b"wrong"))),
            Err(Error::SignatureInvalid { .. })
        ));
        assert!(matches!(
            vault.remove(&name, None),
            Err(Error::SignatureInvalid { .. })
        ));

        vault.remove(&name, Some(&key)).unwrap();
    }

    #[test]
    fn signed_modify_re_signs_the_new_record() {
        let vault = vault();
        let name = id("signed/rotating");
        let key = SigningKey::new(b"caller key");
        vault
            .create(&name, &json!("v1"), Expiry::Never, Some(&key))
            .unwrap();

        let patch = SecretPatch {
            value: Some(json!("v2")),
            expires: None,
        };
        assert!(matches!(
            vault.modify(&name, patch.clone(), None),
            Err(Error::SignatureInvalid { .. })
        ));
        vault.modify(&name, patch, Some(&key)).unwrap();

        let secret = vault.load(&name, Some(&key)).unwrap();
        assert!(secret.signed);
        assert_eq!(secret.value, json!("v2"));
    }

    #[test]
    fn unsigned_secret_rejects_a_presented_key() {
        let vault = vault();
        let name = id("plain");
        vault.create(&name, &json!("open"), Expiry::Never, None).unwrap();
        assert!(matches!(
            vault.load(&name, Some(&SigningKey::new(b"any"))),
            Err(Error::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn missing_secret_wins_over_signature_check() {
        let vault = vault();
        assert!(matches!(
            vault.load(&id("ghost"), Some(&SigningKey::new(b"any"))),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn expired_secrets_still_load() {
        let vault = vault();
        let name = id("stale");
        let expires = Expiry::At(Utc::now() - Duration::hours(1));
        vault.create(&name, &json!("old"), expires, None).unwrap();

        let secret = vault.load(&name, None).unwrap();
        assert!(secret.has_expired());
        assert_eq!(secret.value, json!("old"));
    }

    #[test]
    fn modify_can_revive_an_expired_secret() {
        let vault = vault();
        let name = id("revived");
        vault
            .create(&name, &json!("old"), Expiry::At(Utc::now() - Duration::hours(1)), None)
            .unwrap();

        let patch = SecretPatch {
            value: None,
            expires: Some(Expiry::At(Utc::now() + Duration::hours(1))),
        };
        vault.modify(&name, patch, None).unwrap();
        assert!(!vault.load(&name, None).unwrap().has_expired());
    }

    #[test]
    fn tampered_storage_fails_to_open() {
        let (vault, backend) = vault_with_backend();
        let name = id("tamper");
        vault.create(&name, &json!("payload"), Expiry::Never, None).unwrap();

        let blob = backend.get("tamper").unwrap().unwrap();
        let mut sealed: SealedSecret = serde_json::from_slice(&blob.bytes).unwrap();
        sealed.envelope.ciphertext[0] ^= 0xFF;
        let bytes = serde_json::to_vec(&sealed).unwrap();
        backend.put("tamper", bytes, Some(blob.version)).unwrap();

        assert!(matches!(
            vault.load(&name, None),
            Err(Error::Crypto(_))
        ));
    }
}
