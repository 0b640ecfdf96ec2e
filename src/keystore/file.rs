//! File-backed credential store, encrypted at rest.
//!
//! The record map is serialized with bincode and sealed with AES-256-GCM
//! under a random 32-byte key kept in a sibling key file. Every write goes
//! through a temp file followed by a rename.

use super::{aes_gcm_open, aes_gcm_seal, duplicate_of, CredentialStore};
use crate::error::{KeyError, Result};
use crate::types::{CredentialRecord, PersistentRef};
use base64::Engine;
use log::debug;
use rand::RngCore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const STORE_FILE: &str = "credentials.bin";
const KEY_FILE: &str = "credentials.key";
const STORE_AAD: &[u8] = b"vox:credentials:v1";

pub struct FileCredentialStore {
    path: PathBuf,
    sealing_key: Vec<u8>,
    records: Mutex<Vec<(PersistentRef, CredentialRecord)>>,
}

impl FileCredentialStore {
    /// Open the store rooted at `base_dir`, creating it on first use.
    pub fn open(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).map_err(|e| map_io(e, "create store dir"))?;
        let path = base_dir.join(STORE_FILE);
        let sealing_key = get_or_create_sealing_key(&base_dir.join(KEY_FILE))?;

        let records: Vec<(PersistentRef, CredentialRecord)> = match fs::read(&path) {
            Ok(sealed) => {
                let plain = aes_gcm_open(&sealing_key, &sealed, STORE_AAD)?;
                bincode::deserialize(&plain)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(map_io(e, "read store file")),
        };
        debug!(
            "Opened credential store at {} ({} records)",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            sealing_key,
            records: Mutex::new(records),
        })
    }

    fn records(&self) -> Result<MutexGuard<'_, Vec<(PersistentRef, CredentialRecord)>>> {
        self.records
            .lock()
            .map_err(|_| KeyError::AccessDenied("store mutex poisoned".to_string()))
    }

    fn persist(&self, records: &[(PersistentRef, CredentialRecord)]) -> Result<()> {
        let plain = bincode::serialize(records)?;
        let sealed = aes_gcm_seal(&self.sealing_key, &plain, STORE_AAD)?;
        atomic_write(&self.path, &sealed)
    }
}

impl CredentialStore for FileCredentialStore {
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
        if let Err(e) = self.persist(&records) {
            // Nothing may remain behind on a failed insert.
            records.pop();
            return Err(e);
        }
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
        let index = records
            .iter()
            .position(|(stored, _)| stored == r)
            .ok_or_else(|| KeyError::NotFound(format!("no credential at ref {}", r.to_hex())))?;
        let removed = records.remove(index);
        if let Err(e) = self.persist(&records) {
            records.insert(index, removed);
            return Err(e);
        }
        Ok(())
    }

    fn refs(&self) -> Result<Vec<PersistentRef>> {
        let records = self.records()?;
        Ok(records.iter().map(|(stored, _)| stored.clone()).collect())
    }
}

fn get_or_create_sealing_key(key_path: &Path) -> Result<Vec<u8>> {
    match fs::read(key_path) {
        Ok(bytes) => decode_key_from_b64(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            let engine = base64::engine::general_purpose::STANDARD;
            atomic_write(key_path, engine.encode(key).as_bytes())?;
            Ok(key.to_vec())
        }
        Err(e) => Err(map_io(e, "read key file")),
    }
}

fn decode_key_from_b64(bytes: &[u8]) -> Result<Vec<u8>> {
    let engine = base64::engine::general_purpose::STANDARD;
    let decoded = engine
        .decode(bytes)
        .map_err(|e| KeyError::AccessDenied(format!("decode sealing key: {e}")))?;
    if decoded.len() != 32 {
        return Err(KeyError::AccessDenied(
            "stored sealing key wrong length".to_string(),
        ));
    }
    Ok(decoded)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut f = fs::File::create(&tmp).map_err(|e| map_io(e, "create store file"))?;
        f.write_all(bytes).map_err(|e| map_io(e, "write store file"))?;
        f.flush().map_err(|e| map_io(e, "flush store file"))?;
        f.sync_all().map_err(|e| map_io(e, "sync store file"))?;
    }
    fs::rename(&tmp, path).map_err(|e| map_io(e, "rename store file"))?;
    Ok(())
}

fn map_io(e: std::io::Error, what: &str) -> KeyError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        KeyError::AccessDenied(format!("{what}: {e}"))
    } else {
        KeyError::IoError(e)
    }
}
