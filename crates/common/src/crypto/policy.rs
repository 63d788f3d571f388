//! Convergent path policy
//!
//! A versioned keyring used to encrypt storage path segments. Encryption is
//!  deterministic: the same plaintext under the same context always produces
//!  the same ciphertext, which is what lets a directory keep one stable
//!  encrypted name no matter how many children are written beneath it.
//!
//! Ciphertext layout: `key version (u32 BE) || nonce (12) || AES-256-GCM(sealed || tag)`.
//!  The per-context key is `HKDF-SHA256(key, info = domain || 0 || context)` and
//!  the nonce is the truncated `HMAC-SHA256(hmac_key, len(context) || context || plaintext)`.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::secret::{Secret, SECRET_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Size of the AES-GCM nonce in bytes
pub const GCM_NONCE_SIZE: usize = 12;
/// Size of the key version header in bytes
pub const VERSION_HEADER_SIZE: usize = 4;
/// Size of the AES-GCM tag in bytes
const GCM_TAG_SIZE: usize = 16;

const PATH_DOMAIN: &[u8] = b"path";
const SEAL_DOMAIN: &[u8] = b"seal";

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("no such key version: {0}")]
    UnknownVersion(u32),
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(&'static str),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("key derivation failed")]
    Derive,
    #[error("policy codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("policy storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// One version of key material in the keyring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    key: Secret,
    hmac_key: Secret,
    created_time: DateTime<Utc>,
}

impl KeyEntry {
    fn generate() -> Self {
        Self {
            key: Secret::generate(),
            hmac_key: Secret::generate(),
            created_time: Utc::now(),
        }
    }

    pub fn created_time(&self) -> DateTime<Utc> {
        self.created_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    name: String,
    keys: BTreeMap<u32, KeyEntry>,
    latest_version: u32,
}

impl Policy {
    /// Create a policy holding a single fresh key at version 1
    pub fn generate(name: impl Into<String>) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(1, KeyEntry::generate());
        Self {
            name: name.into(),
            keys,
            latest_version: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latest_version(&self) -> u32 {
        self.latest_version
    }

    /// Every key version in the keyring, most recent first
    pub fn versions(&self) -> Vec<u32> {
        self.keys.keys().rev().copied().collect()
    }

    /// Add a new key version and make it the encryption default.
    ///  Earlier versions stay available for decryption.
    pub fn rotate(&mut self) -> u32 {
        self.latest_version += 1;
        self.keys.insert(self.latest_version, KeyEntry::generate());
        self.latest_version
    }

    fn entry(&self, version: u32) -> Result<&KeyEntry, PolicyError> {
        self.keys
            .get(&version)
            .ok_or(PolicyError::UnknownVersion(version))
    }

    fn derive(&self, version: u32, domain: &[u8], context: &[u8]) -> Result<Secret, PolicyError> {
        let entry = self.entry(version)?;
        let mut info = Vec::with_capacity(domain.len() + 1 + context.len());
        info.extend_from_slice(domain);
        info.push(0);
        info.extend_from_slice(context);

        let hk = Hkdf::<Sha256>::new(None, entry.key.bytes());
        let mut okm = [0u8; SECRET_SIZE];
        hk.expand(&info, &mut okm).map_err(|_| PolicyError::Derive)?;
        Ok(okm.into())
    }

    /// Derive a sealing key for random-nonce envelopes bound to `context`
    pub fn derive_secret(&self, version: u32, context: &[u8]) -> Result<Secret, PolicyError> {
        self.derive(version, SEAL_DOMAIN, context)
    }

    /// Convergently encrypt under the latest key version
    pub fn encrypt(&self, context: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, PolicyError> {
        self.encrypt_with_version(self.latest_version, context, plaintext)
    }

    /// Convergently encrypt under a specific key version
    pub fn encrypt_with_version(
        &self,
        version: u32,
        context: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, PolicyError> {
        let entry = self.entry(version)?;
        let key = self.derive(version, PATH_DOMAIN, context)?;

        let mut mac =
            <HmacSha256 as KeyInit>::new_from_slice(entry.hmac_key.bytes()).map_err(|_| PolicyError::Encrypt)?;
        mac.update(&(context.len() as u64).to_be_bytes());
        mac.update(context);
        mac.update(plaintext);
        let nonce_sum = mac.finalize().into_bytes();
        let nonce = Nonce::from_slice(&nonce_sum[..GCM_NONCE_SIZE]);

        let cipher = Aes256Gcm::new_from_slice(key.bytes()).map_err(|_| PolicyError::Encrypt)?;
        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: context,
                },
            )
            .map_err(|_| PolicyError::Encrypt)?;

        let mut out = Vec::with_capacity(VERSION_HEADER_SIZE + GCM_NONCE_SIZE + sealed.len());
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Key version a ciphertext was produced under
    pub fn ciphertext_version(ciphertext: &[u8]) -> Result<u32, PolicyError> {
        if ciphertext.len() < VERSION_HEADER_SIZE {
            return Err(PolicyError::InvalidCiphertext("missing version header"));
        }
        let mut header = [0u8; VERSION_HEADER_SIZE];
        header.copy_from_slice(&ciphertext[..VERSION_HEADER_SIZE]);
        Ok(u32::from_be_bytes(header))
    }

    /// Decrypt, dispatching on the key version embedded in the ciphertext
    pub fn decrypt(&self, context: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, PolicyError> {
        let version = Self::ciphertext_version(ciphertext)?;
        if ciphertext.len() < VERSION_HEADER_SIZE + GCM_NONCE_SIZE + GCM_TAG_SIZE {
            return Err(PolicyError::InvalidCiphertext("too short"));
        }

        let key = self.derive(version, PATH_DOMAIN, context)?;
        let body = &ciphertext[VERSION_HEADER_SIZE..];
        let nonce = Nonce::from_slice(&body[..GCM_NONCE_SIZE]);

        let cipher = Aes256Gcm::new_from_slice(key.bytes()).map_err(|_| PolicyError::Decrypt)?;
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &body[GCM_NONCE_SIZE..],
                    aad: context,
                },
            )
            .map_err(|_| PolicyError::Decrypt)
    }

    pub fn encode(&self) -> Result<Vec<u8>, PolicyError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PolicyError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergent_encryption_is_deterministic() {
        let policy = Policy::generate("metadata");

        let a = policy.encrypt(b"metadata", b"secret-name").unwrap();
        let b = policy.encrypt(b"metadata", b"secret-name").unwrap();
        assert_eq!(a, b);

        let other_context = policy.encrypt(b"metadata/abc", b"secret-name").unwrap();
        assert_ne!(a, other_context);

        let other_plaintext = policy.encrypt(b"metadata", b"secret-name2").unwrap();
        assert_ne!(a, other_plaintext);
    }

    #[test]
    fn test_decrypt_roundtrip_and_context_binding() {
        let policy = Policy::generate("metadata");
        let ct = policy.encrypt(b"ctx", b"segment").unwrap();

        assert_eq!(policy.decrypt(b"ctx", &ct).unwrap(), b"segment");
        assert!(matches!(
            policy.decrypt(b"other", &ct),
            Err(PolicyError::Decrypt)
        ));
    }

    #[test]
    fn test_rotation_keeps_old_versions_decryptable() {
        let mut policy = Policy::generate("metadata");
        let v1 = policy.encrypt(b"ctx", b"segment").unwrap();

        assert_eq!(policy.rotate(), 2);
        assert_eq!(policy.versions(), vec![2, 1]);

        let v2 = policy.encrypt(b"ctx", b"segment").unwrap();
        assert_ne!(v1, v2);
        assert_eq!(Policy::ciphertext_version(&v1).unwrap(), 1);
        assert_eq!(Policy::ciphertext_version(&v2).unwrap(), 2);

        assert_eq!(policy.decrypt(b"ctx", &v1).unwrap(), b"segment");
        assert_eq!(policy.decrypt(b"ctx", &v2).unwrap(), b"segment");

        // explicit older version reproduces the original ciphertext
        assert_eq!(policy.encrypt_with_version(1, b"ctx", b"segment").unwrap(), v1);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let policy = Policy::generate("metadata");
        let mut ct = policy.encrypt(b"ctx", b"segment").unwrap();
        ct[..VERSION_HEADER_SIZE].copy_from_slice(&9u32.to_be_bytes());

        assert!(matches!(
            policy.decrypt(b"ctx", &ct),
            Err(PolicyError::UnknownVersion(9))
        ));
        assert!(matches!(
            policy.decrypt(b"ctx", &[0, 0]),
            Err(PolicyError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_policy_encode_decode_preserves_keys() {
        let mut policy = Policy::generate("metadata");
        policy.rotate();
        let ct = policy.encrypt(b"ctx", b"segment").unwrap();

        let restored = Policy::decode(&policy.encode().unwrap()).unwrap();
        assert_eq!(restored.name(), "metadata");
        assert_eq!(restored.latest_version(), 2);
        assert_eq!(restored.encrypt(b"ctx", b"segment").unwrap(), ct);
    }

    #[test]
    fn test_derived_secrets_differ_by_context_and_version() {
        let mut policy = Policy::generate("metadata");
        policy.rotate();

        let a = policy.derive_secret(1, b"versions/abc").unwrap();
        let b = policy.derive_secret(1, b"versions/abd").unwrap();
        let c = policy.derive_secret(2, b"versions/abc").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, policy.derive_secret(1, b"versions/abc").unwrap());
    }
}
