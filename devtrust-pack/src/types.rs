//! Result types returned by the pack engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use devtrust_common::time::parse_iso8601;

use crate::codec::EnvelopeMetadata;

/// Name used when an envelope carries none
pub const UNNAMED_PACK: &str = "unnamed";

/// Outcome of signature verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub valid: bool,
    /// Signer OU satisfies the export policy
    pub is_official: bool,
    pub signer_cn: String,
    pub signer_ou: String,
    /// Unix seconds, 0 when absent or unparsable
    pub signed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackMetadata {
    pub name: String,
    pub description: Option<String>,
    pub source_file: String,
    pub target_device: String,
    pub created_by: String,
    /// Unix seconds, 0 when absent or unparsable
    pub created_at: i64,
    /// Base64 SHA-256 of the plaintext
    pub content_hash: Option<String>,
}

impl From<&EnvelopeMetadata> for PackMetadata {
    fn from(metadata: &EnvelopeMetadata) -> Self {
        Self {
            name: metadata
                .name
                .clone()
                .unwrap_or_else(|| UNNAMED_PACK.to_string()),
            description: metadata.description.clone(),
            source_file: metadata.source_file.clone().unwrap_or_default(),
            target_device: metadata.target_device.clone().unwrap_or_default(),
            created_by: metadata.created_by.clone().unwrap_or_default(),
            created_at: metadata
                .created_at
                .as_deref()
                .and_then(parse_iso8601)
                .unwrap_or(0),
            content_hash: metadata.content_hash.clone(),
        }
    }
}

/// Decrypted pack
#[derive(Debug, Clone)]
pub struct LoadedPack {
    pub metadata: PackMetadata,
    pub content: Vec<u8>,
    pub sig_info: SignatureInfo,
}

/// A verified pack stored, still encrypted, in the pack directory
#[derive(Debug, Clone)]
pub struct ImportedPack {
    pub metadata: PackMetadata,
    pub sig_info: SignatureInfo,
    pub saved_path: PathBuf,
}

/// Content resolved by `load_with_priority`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityLoad {
    pub content: Vec<u8>,
    /// True when the encrypted sibling was used
    pub used_tscfg: bool,
}

/// Optional inputs to pack creation
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub description: Option<String>,
}

impl CreateOptions {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Pack system summary for an API layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStatus {
    pub can_export: bool,
    /// `"Developer"` or `"Device"`
    pub device_type: String,
    pub cert_fingerprint: Option<String>,
    pub cert_cn: Option<String>,
    pub cert_ou: Option<String>,
    pub pack_version: String,
    pub algorithm: String,
}
