//! Credential store abstraction for reference-keyed credential persistence.
//!
//! Backends:
//! - Memory: in-process map for tests and ephemeral use.
//! - File: encrypted-at-rest single-file store sealed with AES-256-GCM.

use crate::error::{KeyError, Result};
use crate::types::{CredentialRecord, PersistentRef};

/// Capability over reference-keyed credential records: the only persistence
/// surface the identity store adapter talks to.
pub trait CredentialStore: Send + Sync {
    /// Insert a record and return its freshly issued ref.
    ///
    /// A record whose leaf digest and kind match an existing record is
    /// rejected with `StoreInsertionFailure`.
    fn insert(&self, record: CredentialRecord) -> Result<PersistentRef>;

    /// Look up a record; `None` when the ref is unknown or stale.
    fn lookup(&self, r: &PersistentRef) -> Result<Option<CredentialRecord>>;

    /// Remove the record at `r`. `NotFound` when the ref is unknown.
    fn delete(&self, r: &PersistentRef) -> Result<()>;

    /// Enumerate all refs. Store-native order, stable only for the duration
    /// of one call.
    fn refs(&self) -> Result<Vec<PersistentRef>>;
}

pub(crate) fn duplicate_of(
    records: &[(PersistentRef, CredentialRecord)],
    candidate: &CredentialRecord,
) -> bool {
    let digest = candidate.leaf().digest();
    records.iter().any(|(_, existing)| {
        existing.leaf().digest() == digest
            && existing.has_private_key() == candidate.has_private_key()
    })
}

pub(crate) fn aes_gcm_seal(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    use aes_gcm::aead::{Aead, Payload};
    use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
    use rand::RngCore;

    if key.len() != 32 {
        return Err(KeyError::AccessDenied(
            "sealing key must be 32 bytes".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| KeyError::AccessDenied(format!("Failed to create cipher: {e}")))?;
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| KeyError::AccessDenied(format!("Store sealing failed: {e}")))?;

    // Prepend nonce to ciphertext
    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

pub(crate) fn aes_gcm_open(key: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    use aes_gcm::aead::{Aead, Payload};
    use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

    if key.len() != 32 {
        return Err(KeyError::AccessDenied(
            "sealing key must be 32 bytes".to_string(),
        ));
    }
    if sealed.len() < 12 {
        return Err(KeyError::AccessDenied(
            "store file too short (missing nonce)".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| KeyError::AccessDenied(format!("Failed to create cipher: {e}")))?;
    let nonce = &sealed[..12];
    let ciphertext = &sealed[12..];

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| KeyError::AccessDenied(format!("Store file failed authentication: {e}")))
}

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
