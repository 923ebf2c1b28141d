//! Namespaced key-value persistence for identity blobs
//!
//! The identity manager persists its private key, certificate and CA chain
//! through [`IdentityStore`]. Values come back as [`SecretBytes`] so copies of
//! the private key read from storage are wiped when dropped.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{KeyError, Result};
use crate::secret::SecretBytes;

/// Durable namespaced key-value store
pub trait IdentityStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<SecretBytes>>;
    fn set(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()>;
    /// Erasing an absent key is not an error
    fn erase(&self, namespace: &str, key: &str) -> Result<()>;

    fn contains(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get(namespace, key)?.is_some())
    }
}

/// Volatile store for tests and hosts without persistent storage
#[derive(Default)]
pub struct MemoryIdentityStore {
    entries: Mutex<HashMap<(String, String), SecretBytes>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), SecretBytes>>> {
        self.entries
            .lock()
            .map_err(|_| KeyError::StorageError("memory store lock poisoned".to_string()))
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<SecretBytes>> {
        let entries = self.entries()?;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries()?;
        entries.insert(
            (namespace.to_string(), key.to_string()),
            SecretBytes::from_slice(value),
        );
        Ok(())
    }

    fn erase(&self, namespace: &str, key: &str) -> Result<()> {
        let mut entries = self.entries()?;
        entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

/// File-backed store: one file per key under `<base>/<namespace>/`
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    base_dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, namespace: &str, key: &str) -> Result<PathBuf> {
        validate_component(namespace)?;
        validate_component(key)?;
        Ok(self.base_dir.join(namespace).join(key))
    }
}

fn validate_component(component: &str) -> Result<()> {
    let valid = !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(KeyError::InvalidArgument(format!(
            "invalid store namespace or key: '{component}'"
        )))
    }
}

impl IdentityStore for FileIdentityStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<SecretBytes>> {
        let path = self.path_for(namespace, key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(SecretBytes::new(fs::read(&path)?)))
    }

    fn set(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(namespace, key)?;
        let tmp_path = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        {
            let mut f = fs::File::create(&tmp_path)?;
            restrict_permissions(&f)?;
            f.write_all(value)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(tmp_path, path)?;
        Ok(())
    }

    fn erase(&self, namespace: &str, key: &str) -> Result<()> {
        let path = self.path_for(namespace, key)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> Result<()> {
    Ok(())
}
