//! Export authorization and signer trust policies

use serde::{Deserialize, Serialize};

/// OU marker that identifies developer devices
pub const DEVELOPER_OU: &str = "Developer";

/// Decides which certificates may export packs and count as official signers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPolicy {
    /// OU contains the given substring
    OuContains(String),
    /// OU equals the given value exactly
    OuExact(String),
}

impl Default for ExportPolicy {
    fn default() -> Self {
        ExportPolicy::OuContains(DEVELOPER_OU.to_string())
    }
}

impl ExportPolicy {
    pub fn allows(&self, org_unit: &str) -> bool {
        match self {
            ExportPolicy::OuContains(marker) => org_unit.contains(marker.as_str()),
            ExportPolicy::OuExact(expected) => org_unit == expected,
        }
    }
}

/// When the signer certificate is checked against trust anchors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainValidation {
    Disabled,
    /// Validate whenever at least one anchor is available
    #[default]
    IfAnchored,
    /// Fail when no anchor is available
    Required,
}
