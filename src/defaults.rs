use crate::error::{KeyError, Result};
use crate::types::PersistentRef;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key-value capability persisting the default-identity selection across
/// process restarts.
pub trait DefaultsStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistentRef>>;
    fn store(&self, selection: Option<&PersistentRef>) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryDefaults {
    slot: Mutex<Option<PersistentRef>>,
}

impl MemoryDefaults {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DefaultsStore for MemoryDefaults {
    fn load(&self) -> Result<Option<PersistentRef>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| KeyError::AccessDenied("defaults mutex poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn store(&self, selection: Option<&PersistentRef>) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| KeyError::AccessDenied("defaults mutex poisoned".to_string()))?;
        *slot = selection.cloned();
        Ok(())
    }
}

pub struct FileDefaults {
    path: PathBuf,
}

impl FileDefaults {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join("default_identity.bin"),
        }
    }
}

impl DefaultsStore for FileDefaults {
    fn load(&self) -> Result<Option<PersistentRef>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let selection = bincode::deserialize(&bytes)?;
        Ok(selection)
    }

    fn store(&self, selection: Option<&PersistentRef>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(&selection.cloned())?;
        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}
