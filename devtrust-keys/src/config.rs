//! Identity manager configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KeyError, Result};

/// Store namespace holding the identity blobs
pub const DEFAULT_NAMESPACE: &str = "devtrust_pki";
/// Well-known location operators download the CA chain from
pub const DEFAULT_CA_CHAIN_EXPORT_PATH: &str = "/sdcard/pki/ca-chain.crt";
pub const DEFAULT_ORGANIZATION: &str = "TianShanOS";
pub const DEFAULT_ORG_UNIT: &str = "Device";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub namespace: String,

    /// Best-effort copy of the installed CA chain; `None` disables the copy
    pub ca_chain_export_path: Option<PathBuf>,

    /// Organization (O) used by default CSRs
    pub default_organization: String,

    /// Organizational unit (OU) used by default CSRs
    pub default_org_unit: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ca_chain_export_path: Some(PathBuf::from(DEFAULT_CA_CHAIN_EXPORT_PATH)),
            default_organization: DEFAULT_ORGANIZATION.to_string(),
            default_org_unit: DEFAULT_ORG_UNIT.to_string(),
        }
    }
}

impl IdentityConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            KeyError::InvalidArgument(format!("Failed to parse config {path:?}: {e}"))
        })
    }

    /// Save configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KeyError::InvalidArgument(format!("Failed to serialize config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
