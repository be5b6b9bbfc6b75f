//! Encrypted storage for mature content.
//!
//! Sealing is AES-256-CTR with a fresh random IV per call, authenticated with
//! HMAC-SHA256 over `nonce || ciphertext` (encrypt-then-MAC). Both subkeys are
//! derived from the caller's key with HKDF-SHA256:
//!
//! ```text
//! vault key (32 bytes, supplied by the host)
//!     │
//!     ├─ HKDF-SHA256(info = "chronicle-vault:enc")         → AES-256-CTR key
//!     ├─ HKDF-SHA256(info = "chronicle-vault:mac")         → HMAC-SHA256 key
//!     └─ HKDF-SHA256(info = "chronicle-vault:fingerprint") → 8-byte key id
//! ```
//!
//! The key itself is never stored. Entries carry the key id so that opening with
//! the wrong key is reported as [`VaultError::KeyMismatch`] rather than as
//! tampering.

use aes::Aes256;
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the base64-encoded vault key.
pub const VAULT_KEY_ENV: &str = "CHRONICLE_VAULT_KEY";

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;
const KEY_ID_LEN: usize = 8;

/// Errors from sealing and opening vault entries.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault entry failed authentication")]
    Authentication,

    #[error("vault entry was sealed under a different key")]
    KeyMismatch,

    #[error("no vault key configured")]
    KeyMissing,

    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    #[error("malformed vault entry: {0}")]
    Malformed(String),
}

impl VaultError {
    /// Both tampering and a wrong key mean the ciphertext could not be authenticated.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, VaultError::Authentication | VaultError::KeyMismatch)
    }
}

/// A 256-bit symmetric key supplied by the hosting environment.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey([u8; 32]);

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

impl VaultKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            VaultError::InvalidKey(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(key))
    }

    /// Load the key from [`VAULT_KEY_ENV`].
    ///
    /// An absent or empty variable is not an error: documents without mature
    /// content never need a key.
    pub fn from_env() -> Result<Option<Self>, VaultError> {
        match std::env::var(VAULT_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::from_base64(&value).map(Some),
            _ => Ok(None),
        }
    }

    fn derive(&self, info: &[u8], out: &mut [u8]) -> Result<(), VaultError> {
        Hkdf::<Sha256>::new(None, &self.0)
            .expand(info, out)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))
    }

    fn subkeys(&self) -> Result<Subkeys, VaultError> {
        let mut enc = [0u8; 32];
        let mut mac = [0u8; 32];
        self.derive(b"chronicle-vault:enc", &mut enc)?;
        self.derive(b"chronicle-vault:mac", &mut mac)?;
        Ok(Subkeys { enc, mac })
    }

    /// Short public identifier of this key; safe to persist.
    pub fn fingerprint(&self) -> Result<Vec<u8>, VaultError> {
        let mut id = [0u8; KEY_ID_LEN];
        self.derive(b"chronicle-vault:fingerprint", &mut id)?;
        Ok(id.to_vec())
    }
}

struct Subkeys {
    enc: [u8; 32],
    mac: [u8; 32],
}

/// Opaque handle from an event to its sealed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultRef(Uuid);

impl VaultRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VaultRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VaultRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sealed blob. Never contains the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub reference: VaultRef,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    /// AES-CTR ciphertext followed by the 32-byte HMAC tag.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub key_id: Vec<u8>,
}

/// Encrypt `plaintext` under `key` into a new entry.
pub fn seal(plaintext: &str, key: Option<&VaultKey>) -> Result<VaultEntry, VaultError> {
    seal_as(VaultRef::new(), plaintext, key)
}

fn seal_as(
    reference: VaultRef,
    plaintext: &str,
    key: Option<&VaultKey>,
) -> Result<VaultEntry, VaultError> {
    let key = key.ok_or(VaultError::KeyMissing)?;
    let subkeys = key.subkeys()?;

    // Every seal draws a fresh IV from the OS CSPRNG.
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buf = plaintext.as_bytes().to_vec();
    let mut cipher = Aes256Ctr::new(subkeys.enc.as_ref().into(), nonce.as_ref().into());
    cipher.apply_keystream(&mut buf);

    let tag = compute_tag(&subkeys.mac, &nonce, &buf)?;
    buf.extend_from_slice(&tag);

    Ok(VaultEntry {
        reference,
        nonce: nonce.to_vec(),
        ciphertext: buf,
        key_id: key.fingerprint()?,
    })
}

/// Authenticate and decrypt an entry.
pub fn open(entry: &VaultEntry, key: Option<&VaultKey>) -> Result<String, VaultError> {
    let key = key.ok_or(VaultError::KeyMissing)?;

    if entry.key_id != key.fingerprint()? {
        return Err(VaultError::KeyMismatch);
    }
    if entry.nonce.len() != NONCE_LEN {
        return Err(VaultError::Malformed(format!(
            "nonce is {} bytes",
            entry.nonce.len()
        )));
    }
    if entry.ciphertext.len() < TAG_LEN {
        return Err(VaultError::Authentication);
    }

    let subkeys = key.subkeys()?;
    let (body, tag) = entry.ciphertext.split_at(entry.ciphertext.len() - TAG_LEN);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&subkeys.mac)
        .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
    mac.update(&entry.nonce);
    mac.update(body);
    mac.verify_slice(tag)
        .map_err(|_| VaultError::Authentication)?;

    let mut buf = body.to_vec();
    let mut cipher = Aes256Ctr::new(subkeys.enc.as_ref().into(), entry.nonce.as_slice().into());
    cipher.apply_keystream(&mut buf);

    String::from_utf8(buf).map_err(|e| VaultError::Malformed(e.to_string()))
}

/// Re-encrypt an entry under a new key, keeping its reference.
pub fn reseal(
    entry: &VaultEntry,
    old: Option<&VaultKey>,
    new: Option<&VaultKey>,
) -> Result<VaultEntry, VaultError> {
    let plaintext = open(entry, old)?;
    seal_as(entry.reference, &plaintext, new)
}

fn compute_tag(mac_key: &[u8], nonce: &[u8], body: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
    mac.update(nonce);
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sealed entries owned by a document, addressed by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultStore {
    entries: BTreeMap<VaultRef, VaultEntry>,
}

impl VaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: VaultEntry) -> VaultRef {
        let reference = entry.reference;
        self.entries.insert(reference, entry);
        reference
    }

    pub fn get(&self, reference: VaultRef) -> Option<&VaultEntry> {
        self.entries.get(&reference)
    }

    pub fn remove(&mut self, reference: VaultRef) -> Option<VaultEntry> {
        self.entries.remove(&reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &VaultEntry> {
        self.entries.values()
    }

    /// Re-seal every entry under `new`.
    ///
    /// Builds the complete replacement set first, so a failure on any entry
    /// leaves the store untouched.
    pub fn rotate(
        &mut self,
        old: Option<&VaultKey>,
        new: Option<&VaultKey>,
    ) -> Result<usize, VaultError> {
        let rotated = self
            .entries
            .values()
            .map(|entry| reseal(entry, old, new).map(|e| (e.reference, e)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let count = rotated.len();
        self.entries = rotated;
        Ok(count)
    }
}

/// Serde adapter persisting byte fields as standard base64 strings.
mod b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
