//! Core types for Vox Keys.
//!
//! Intention: Provide strongly-typed wrappers over raw store handles and
//! stored credential material so that nothing outside this crate interprets
//! either representation.

use crate::certificate::X509Certificate;
use crate::error::{KeyError, Result};
use rand::{rngs::OsRng, RngCore};
use rustls_pki_types::PrivateKeyDer;
use serde::{Deserialize, Serialize};

/* ---------------------------- Persistent Ref ----------------------------- */

pub const PERSISTENT_REF_LEN: usize = 16;

/// Opaque handle identifying a credential held by a credential store.
///
/// Refs are issued by the store on insert and compared byte-exact. Callers
/// obtain them from the adapter and pass them back unmodified; the internal
/// structure is store-defined and never interpreted outside this crate.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistentRef(Vec<u8>);

impl PersistentRef {
    /// Mint a fresh random ref. Store backends call this on insert.
    pub(crate) fn issue() -> Self {
        let mut bytes = [0u8; PERSISTENT_REF_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form for log lines.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for PersistentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PersistentRef({})", self.to_hex())
    }
}

/* --------------------------- Credential Record --------------------------- */

/// A stored credential: a certificate chain (leaf first) plus, for full
/// identities, the PKCS#8 private key matching the leaf.
///
/// A record without key material is a bare certificate and is never offered
/// for client authentication; `IdentityStore::normalize` maps such records
/// to the identity with the same leaf digest when one exists.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    chain: Vec<X509Certificate>,
    private_key_der: Option<Vec<u8>>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches log output.
        f.debug_struct("CredentialRecord")
            .field("subject", &self.leaf().subject())
            .field("chain_len", &self.chain.len())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

impl CredentialRecord {
    /// Build a full identity record. The chain must be non-empty and start
    /// with the leaf the key belongs to.
    pub fn identity(chain: Vec<X509Certificate>, private_key_der: Vec<u8>) -> Result<Self> {
        if chain.is_empty() {
            return Err(KeyError::CertificateError(
                "identity record requires a leaf certificate".to_string(),
            ));
        }
        Ok(Self {
            chain,
            private_key_der: Some(private_key_der),
        })
    }

    /// Build a certificate-only record (no key material).
    pub fn certificate_only(chain: Vec<X509Certificate>) -> Result<Self> {
        if chain.is_empty() {
            return Err(KeyError::CertificateError(
                "certificate record requires a leaf certificate".to_string(),
            ));
        }
        Ok(Self {
            chain,
            private_key_der: None,
        })
    }

    pub fn leaf(&self) -> &X509Certificate {
        &self.chain[0]
    }

    pub fn chain(&self) -> &[X509Certificate] {
        &self.chain
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key_der.is_some()
    }

    pub fn private_key_der(&self) -> Option<&[u8]> {
        self.private_key_der.as_deref()
    }

    /// Convert the key material to rustls private key format.
    pub fn to_rustls_private_key(&self) -> Result<PrivateKeyDer<'static>> {
        let der = self.private_key_der.clone().ok_or_else(|| {
            KeyError::NotAnIdentity("record has no private key".to_string())
        })?;
        Ok(PrivateKeyDer::Pkcs8(der.into()))
    }
}
