//! In-process credential store backend.

use super::{duplicate_of, CredentialStore};
use crate::error::{KeyError, Result};
use crate::types::{CredentialRecord, PersistentRef};
use std::sync::{Mutex, MutexGuard};

/// Credential store holding records in process memory. Contents are lost on
/// drop; intended for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: Mutex<Vec<(PersistentRef, CredentialRecord)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, Vec<(PersistentRef, CredentialRecord)>>> {
        self.records
            .lock()
            .map_err(|_| KeyError::AccessDenied("store mutex poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn insert(&self, record: CredentialRecord) -> Result<PersistentRef> {
        let mut records = self.records()?;
        if duplicate_of(&records, &record) {
            return Err(KeyError::StoreInsertionFailure(format!(
                "duplicate credential for leaf digest {}",
                record.leaf().hex_digest()
            )));
        }
        let r = PersistentRef::issue();
        records.push((r.clone(), record));
        Ok(r)
    }

    fn lookup(&self, r: &PersistentRef) -> Result<Option<CredentialRecord>> {
        let records = self.records()?;
        Ok(records
            .iter()
            .find(|(stored, _)| stored == r)
            .map(|(_, record)| record.clone()))
    }

    fn delete(&self, r: &PersistentRef) -> Result<()> {
        let mut records = self.records()?;
        match records.iter().position(|(stored, _)| stored == r) {
            Some(index) => {
                records.remove(index);
                Ok(())
            }
            None => Err(KeyError::NotFound(format!(
                "no credential at ref {}",
                r.to_hex()
            ))),
        }
    }

    fn refs(&self) -> Result<Vec<PersistentRef>> {
        let records = self.records()?;
        Ok(records.iter().map(|(stored, _)| stored.clone()).collect())
    }
}
