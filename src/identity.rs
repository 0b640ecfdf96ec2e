//! Identity store adapter.
//!
//! Sole mediator between the application and the credential store: resolves
//! opaque persistent refs, normalizes ambiguous references into ones safe
//! for TLS client authentication, owns the default-identity selection, and
//! converts identities to and from password-protected PKCS#12 containers.

use crate::certificate::{self, X509Certificate};
use crate::defaults::DefaultsStore;
use crate::error::{KeyError, Result};
use crate::keystore::CredentialStore;
use crate::types::{CredentialRecord, PersistentRef};

use log::{debug, info, warn};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::stack::Stack;
use openssl::x509::X509;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::{Arc, Mutex, MutexGuard};

/// Adapter over a credential store and a defaults store.
///
/// All operations are synchronous calls against the backing stores. The
/// only adapter-local mutable state is the default selection; it sits
/// behind a mutex so that `delete_identity`'s read-then-clear is atomic
/// with respect to concurrent readers.
pub struct IdentityStore {
    store: Arc<dyn CredentialStore>,
    defaults: Arc<dyn DefaultsStore>,
    default_selection: Mutex<Option<PersistentRef>>,
}

impl IdentityStore {
    /// Create an adapter over the given stores.
    ///
    /// The persisted default selection is loaded and re-normalized; a
    /// selection that no longer resolves to an identity (external store
    /// mutation, deleted credential) is dropped rather than kept dangling.
    pub fn new(store: Arc<dyn CredentialStore>, defaults: Arc<dyn DefaultsStore>) -> Result<Self> {
        let adapter = Self {
            store,
            defaults,
            default_selection: Mutex::new(None),
        };

        if let Some(persisted) = adapter.defaults.load()? {
            match adapter.normalize(&persisted)? {
                Some(normalized) => {
                    if normalized != persisted {
                        adapter.defaults.store(Some(&normalized))?;
                    }
                    *adapter.default_slot()? = Some(normalized);
                }
                None => {
                    warn!(
                        "Dropping persisted default identity {}: no longer resolves",
                        persisted.to_hex()
                    );
                    adapter.defaults.store(None)?;
                }
            }
        }

        Ok(adapter)
    }

    fn default_slot(&self) -> Result<MutexGuard<'_, Option<PersistentRef>>> {
        self.default_selection
            .lock()
            .map_err(|_| KeyError::AccessDenied("default selection mutex poisoned".to_string()))
    }

    /// Look up `r` and return its certificate view.
    ///
    /// Returns `None` when the ref is stale or unknown. Refs legitimately
    /// go stale after external store mutation, so this is not an error.
    pub fn resolve_certificate(&self, r: &PersistentRef) -> Result<Option<X509Certificate>> {
        Ok(self.store.lookup(r)?.map(|record| record.leaf().clone()))
    }

    /// Remove the credential at `r` from the store.
    ///
    /// When `r` is the current default selection, the selection is cleared
    /// under the same guard, so no caller observes a default pointing at a
    /// deleted credential. Reports `NotFound` for unknown refs and
    /// `AccessDenied` when the store refuses the write.
    pub fn delete_identity(&self, r: &PersistentRef) -> Result<()> {
        let mut slot = self.default_slot()?;
        self.store.delete(r)?;
        if slot.as_ref() == Some(r) {
            *slot = None;
            self.defaults.store(None)?;
            info!("Cleared default identity selection ({} deleted)", r.to_hex());
        }
        info!("Deleted credential {}", r.to_hex());
        Ok(())
    }

    /// Resolve any reference to one guaranteed to denote a full identity
    /// with a private key suitable for TLS client authentication.
    ///
    /// A ref naming a bare certificate resolves to the identity whose leaf
    /// has the same digest, when one exists. Idempotent whenever it
    /// succeeds: `normalize(normalize(r)) == normalize(r)`.
    pub fn normalize(&self, r: &PersistentRef) -> Result<Option<PersistentRef>> {
        let record = match self.store.lookup(r)? {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.has_private_key() {
            return Ok(Some(r.clone()));
        }

        let digest = record.leaf().digest();
        for candidate in self.store.refs()? {
            if let Some(candidate_record) = self.store.lookup(&candidate)? {
                if candidate_record.has_private_key()
                    && candidate_record.leaf().digest() == digest
                {
                    debug!(
                        "Normalized certificate ref {} to identity {}",
                        r.to_hex(),
                        candidate.to_hex()
                    );
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    /// Select the identity offered for authentication when the caller does
    /// not specify one.
    ///
    /// Strict: `r` must normalize to an identity, and the normalized ref is
    /// what gets stored and persisted. An unauthenticatable default is
    /// rejected with `NotAnIdentity`.
    pub fn set_default(&self, r: &PersistentRef) -> Result<()> {
        let normalized = self.normalize(r)?.ok_or_else(|| {
            KeyError::NotAnIdentity(format!(
                "ref {} does not resolve to a client identity",
                r.to_hex()
            ))
        })?;
        let mut slot = self.default_slot()?;
        self.defaults.store(Some(&normalized))?;
        info!("Default identity set to {}", normalized.to_hex());
        *slot = Some(normalized);
        Ok(())
    }

    /// Current default selection, when one is set.
    pub fn get_default(&self) -> Result<Option<PersistentRef>> {
        Ok(self.default_slot()?.clone())
    }

    /// Drop the default selection.
    pub fn clear_default(&self) -> Result<()> {
        let mut slot = self.default_slot()?;
        self.defaults.store(None)?;
        *slot = None;
        Ok(())
    }

    /// Certificate view of the current default selection, when one is set
    /// and still resolves.
    pub fn default_certificate(&self) -> Result<Option<X509Certificate>> {
        match self.get_default()? {
            Some(r) => self.resolve_certificate(&r),
            None => Ok(None),
        }
    }

    /// Enumerate refs of all full identities in the store. Bare
    /// certificates are excluded. Order is store-native and stable only
    /// for the duration of one call.
    pub fn list_identity_refs(&self) -> Result<Vec<PersistentRef>> {
        let mut out = Vec::new();
        for r in self.store.refs()? {
            if let Some(record) = self.store.lookup(&r)? {
                if record.has_private_key() {
                    out.push(r);
                }
            }
        }
        Ok(out)
    }

    /// Locate an identity whose leaf common name matches `name`.
    pub fn find_identity_by_name(&self, name: &str) -> Result<Option<PersistentRef>> {
        for r in self.list_identity_refs()? {
            if let Some(cert) = self.resolve_certificate(&r)? {
                if cert.common_name().as_deref() == Some(name) {
                    return Ok(Some(r));
                }
            }
        }
        Ok(None)
    }

    /// Create a fresh self-signed client identity and store it.
    ///
    /// Key material is generated anew on every call. The record lands in
    /// the store through a single insert, so a failure at any step leaves
    /// nothing behind.
    pub fn generate_self_signed(&self, name: &str, email: &str) -> Result<PersistentRef> {
        let (cert, key_pair) = certificate::generate_self_signed(name, email)?;
        let key_der = key_pair.private_key_der().map_err(|e| {
            KeyError::GenerationFailure(format!("failed to encode private key: {e}"))
        })?;
        let record = CredentialRecord::identity(vec![cert], key_der)?;
        let r = self.store.insert(record).map_err(|e| {
            KeyError::GenerationFailure(format!("store insertion failed: {e}"))
        })?;
        info!("Generated self-signed identity '{name}' -> {}", r.to_hex());
        Ok(r)
    }

    /// Serialize the identity at `r` into a PKCS#12 container encrypted
    /// under `password`.
    pub fn export_pkcs12(&self, r: &PersistentRef, password: &str) -> Result<Vec<u8>> {
        let record = self
            .store
            .lookup(r)?
            .ok_or_else(|| KeyError::NotFound(format!("no credential at ref {}", r.to_hex())))?;
        let key_der = record.private_key_der().ok_or_else(|| {
            KeyError::NotAnIdentity(format!("credential {} has no private key", r.to_hex()))
        })?;

        let pkey = PKey::private_key_from_der(key_der)
            .map_err(|e| KeyError::ExportFailure(format!("failed to load private key: {e}")))?;
        let leaf = X509::from_der(record.leaf().der_bytes())
            .map_err(|e| KeyError::ExportFailure(format!("failed to load certificate: {e}")))?;

        let friendly_name = record
            .leaf()
            .common_name()
            .unwrap_or_else(|| "Client Identity".to_string());

        let mut builder = Pkcs12::builder();
        builder.name(&friendly_name);
        builder.pkey(&pkey);
        builder.cert(&leaf);
        if record.chain().len() > 1 {
            let mut extra = Stack::new()
                .map_err(|e| KeyError::ExportFailure(format!("failed to build chain: {e}")))?;
            for cert in &record.chain()[1..] {
                let x509 = X509::from_der(cert.der_bytes()).map_err(|e| {
                    KeyError::ExportFailure(format!("failed to load chain certificate: {e}"))
                })?;
                extra.push(x509).map_err(|e| {
                    KeyError::ExportFailure(format!("failed to build chain: {e}"))
                })?;
            }
            builder.ca(extra);
        }

        let pkcs12 = builder
            .build2(password)
            .map_err(|e| KeyError::ExportFailure(format!("PKCS#12 encoding failed: {e}")))?;
        let der = pkcs12
            .to_der()
            .map_err(|e| KeyError::ExportFailure(format!("PKCS#12 encoding failed: {e}")))?;
        debug!("Exported identity {} as PKCS#12 ({} bytes)", r.to_hex(), der.len());
        Ok(der)
    }

    /// Decrypt and parse a PKCS#12 container and store the identity it
    /// holds, returning the new ref.
    ///
    /// A password mismatch is reported as `WrongPassword`, distinct from
    /// structural `MalformedContainer` failures; a container holding no
    /// private key is rejected with `NotAnIdentity`.
    pub fn import_pkcs12(&self, data: &[u8], password: &str) -> Result<PersistentRef> {
        let container = Pkcs12::from_der(data).map_err(|e| {
            KeyError::MalformedContainer(format!("failed to parse PKCS#12 structure: {e}"))
        })?;
        let parsed = container.parse2(password).map_err(|e| {
            if is_mac_mismatch(&e) {
                KeyError::WrongPassword
            } else {
                KeyError::MalformedContainer(format!("failed to decode PKCS#12 contents: {e}"))
            }
        })?;

        let pkey = parsed.pkey.ok_or_else(|| {
            KeyError::NotAnIdentity("container holds no private key".to_string())
        })?;
        let leaf = parsed.cert.ok_or_else(|| {
            KeyError::MalformedContainer("container holds no certificate".to_string())
        })?;

        let key_der = pkey.private_key_to_pkcs8().map_err(|e| {
            KeyError::MalformedContainer(format!("failed to re-encode private key: {e}"))
        })?;
        let leaf_der = leaf.to_der().map_err(|e| {
            KeyError::MalformedContainer(format!("failed to re-encode certificate: {e}"))
        })?;

        let mut chain = vec![X509Certificate::from_der(leaf_der)?];
        if let Some(extra) = parsed.ca {
            for cert in extra.iter() {
                let der = cert.to_der().map_err(|e| {
                    KeyError::MalformedContainer(format!(
                        "failed to re-encode chain certificate: {e}"
                    ))
                })?;
                chain.push(X509Certificate::from_der(der)?);
            }
        }

        let record = CredentialRecord::identity(chain, key_der)?;
        let r = self.store.insert(record).map_err(|e| match e {
            KeyError::StoreInsertionFailure(_) | KeyError::AccessDenied(_) => e,
            other => KeyError::StoreInsertionFailure(other.to_string()),
        })?;
        info!("Imported PKCS#12 identity -> {}", r.to_hex());
        Ok(r)
    }

    /// Typed TLS handoff for the session layer: the certificate chain and
    /// private key behind `r`, which must normalize to an identity.
    pub fn client_credentials(
        &self,
        r: &PersistentRef,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let normalized = self.normalize(r)?.ok_or_else(|| {
            KeyError::NotAnIdentity(format!(
                "ref {} does not resolve to a client identity",
                r.to_hex()
            ))
        })?;
        let record = self.store.lookup(&normalized)?.ok_or_else(|| {
            KeyError::NotFound(format!("no credential at ref {}", normalized.to_hex()))
        })?;
        let chain = record
            .chain()
            .iter()
            .map(|cert| cert.to_rustls_certificate())
            .collect();
        let key = record.to_rustls_private_key()?;
        Ok((chain, key))
    }
}

fn is_mac_mismatch(stack: &openssl::error::ErrorStack) -> bool {
    stack.errors().iter().any(|e| {
        e.reason()
            .map(|reason| {
                let reason = reason.to_ascii_lowercase();
                reason.contains("mac verify") || reason.contains("invalid password")
            })
            .unwrap_or(false)
    })
}
