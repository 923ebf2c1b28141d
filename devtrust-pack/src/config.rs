//! Pack engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::SignatureScope;
use crate::error::{PackError, Result};
use crate::policy::{ChainValidation, ExportPolicy};

/// Directory imported packs are stored in on the device
pub const DEFAULT_PACK_DIR: &str = "/sdcard/config";
/// Largest `.tscfg` file accepted from disk
pub const DEFAULT_MAX_PACK_SIZE: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    pub pack_dir: PathBuf,
    pub max_pack_size: usize,
    pub export_policy: ExportPolicy,
    pub chain_validation: ChainValidation,

    /// Extra PEM trust anchors, used alongside the device CA chain
    pub trust_anchors: Vec<String>,

    /// Signed bytes for newly created packs
    pub signature_scope: SignatureScope,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            pack_dir: PathBuf::from(DEFAULT_PACK_DIR),
            max_pack_size: DEFAULT_MAX_PACK_SIZE,
            export_policy: ExportPolicy::default(),
            chain_validation: ChainValidation::default(),
            trust_anchors: Vec::new(),
            signature_scope: SignatureScope::default(),
        }
    }
}

impl PackConfig {
    /// Config with default policies storing packs under `pack_dir`
    pub fn with_pack_dir(pack_dir: impl Into<PathBuf>) -> Self {
        Self {
            pack_dir: pack_dir.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| PackError::Parse(format!("Failed to parse config {path:?}: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PackError::InvalidArgument(format!("Failed to serialize config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PackConfig::default();
        assert_eq!(config.max_pack_size, 65536);
        assert_eq!(config.pack_dir, PathBuf::from("/sdcard/config"));
        assert_eq!(config.chain_validation, ChainValidation::IfAnchored);
        assert_eq!(config.signature_scope, SignatureScope::Ciphertext);
        assert!(config.trust_anchors.is_empty());
    }

    #[test]
    fn test_partial_json() {
        let config: PackConfig = serde_json::from_str(
            r#"{"export_policy": {"ou_exact": "Developer"}, "signature_scope": "envelope"}"#,
        )
        .expect("parse");
        assert_eq!(config.export_policy, ExportPolicy::OuExact("Developer".into()));
        assert_eq!(config.signature_scope, SignatureScope::Envelope);
        assert_eq!(config.max_pack_size, DEFAULT_MAX_PACK_SIZE);
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pack.json");
        let config = PackConfig {
            chain_validation: ChainValidation::Required,
            ..PackConfig::with_pack_dir(dir.path().join("packs"))
        };
        config.save(&path)?;
        assert_eq!(PackConfig::load(&path)?, config);
        Ok(())
    }
}
