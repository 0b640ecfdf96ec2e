//! Vox Keys – client identity management core
//!
//! Generation, storage, normalization, and portable PKCS#12 import/export
//! of X.509 client identities, mediated through a pluggable credential
//! store. The [`identity::IdentityStore`] adapter is the only code that
//! interprets persistent refs; applications hold refs as opaque handles.

pub mod certificate;
pub mod defaults;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod keystore;
pub mod types;

pub use error::{KeyError, Result};

pub use certificate::X509Certificate;
pub use defaults::{DefaultsStore, FileDefaults, MemoryDefaults};
pub use identity::IdentityStore;
pub use keystore::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{CredentialRecord, PersistentRef};
