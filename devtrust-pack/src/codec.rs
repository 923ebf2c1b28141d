//! `.tscfg` envelope codec
//!
//! Maps between the JSON wire format and [`ConfigPackEnvelope`]. Binary
//! fields are standard base64 and decode into fixed-size buffers. The codec
//! performs no cryptography; it only checks shape, sizes and the version.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PackError, Result};

pub const PACK_VERSION: &str = "1.0";
pub const PACK_FORMAT: &str = "encrypted";
pub const PACK_EXTENSION: &str = "tscfg";
pub const ENCRYPTION_ALGORITHM: &str = "ECDH-P256+AES-256-GCM";
pub const KDF_ALGORITHM: &str = "HKDF-SHA256";
pub const SIGNATURE_ALGORITHM: &str = "ECDSA-SHA256";

/// Uncompressed P-256 point: `0x04 || X || Y`
pub const EPHEMERAL_KEY_LEN: usize = 65;
pub const SALT_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Largest DER encoding of a P-256 ECDSA signature
pub const MAX_SIGNATURE_LEN: usize = 72;

const ENVELOPE_DOMAIN: &[u8] = b"tscfg-envelope-v1";

/// Bytes covered by the pack signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScope {
    /// `SHA256(ciphertext)`, compatible with every 1.0 reader
    #[default]
    Ciphertext,
    /// `SHA256` of the canonical envelope encoding
    Envelope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    pub ephemeral_public_key: [u8; EPHEMERAL_KEY_LEN],
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub recipient_cert_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    pub signer_certificate: String,
    /// DER-encoded ECDSA signature
    pub signature: Vec<u8>,
    pub signed_at: Option<String>,
    /// Informational; readers derive officialness from the signer certificate
    pub is_official: bool,
    pub scope: SignatureScope,
}

/// Decoded `.tscfg` envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPackEnvelope {
    pub version: String,
    pub metadata: EnvelopeMetadata,
    pub encryption: EncryptionParams,
    pub signature: SignatureBlock,
    pub ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    tscfg_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(default)]
    metadata: EnvelopeMetadata,
    encryption: WireEncryption,
    signature: WireSignature,
    payload: String,
}

#[derive(Serialize, Deserialize)]
struct WireEncryption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kdf: Option<String>,
    ephemeral_public_key: String,
    salt: String,
    iv: String,
    tag: String,
    recipient_cert_fingerprint: String,
}

#[derive(Serialize, Deserialize)]
struct WireSignature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    signer_certificate: String,
    signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signed_at: Option<String>,
    #[serde(default)]
    is_official: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<SignatureScope>,
}

/// Parse envelope JSON.
///
/// A missing or non-string `tscfg_version` is [`PackError::Parse`]; a version
/// other than [`PACK_VERSION`] is [`PackError::Version`] regardless of the
/// rest of the document.
pub fn parse(json: &str) -> Result<ConfigPackEnvelope> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| PackError::Parse(format!("invalid JSON: {e}")))?;

    let version = value
        .get("tscfg_version")
        .and_then(Value::as_str)
        .ok_or_else(|| PackError::Parse("missing tscfg_version".to_string()))?;
    if version != PACK_VERSION {
        return Err(PackError::Version(format!(
            "got '{version}', expected '{PACK_VERSION}'"
        )));
    }

    let wire: WireEnvelope = serde_json::from_value(value)
        .map_err(|e| PackError::Parse(format!("malformed envelope: {e}")))?;

    check_label("format", wire.format.as_deref(), PACK_FORMAT)?;
    check_label(
        "encryption.algorithm",
        wire.encryption.algorithm.as_deref(),
        ENCRYPTION_ALGORITHM,
    )?;
    check_label("encryption.kdf", wire.encryption.kdf.as_deref(), KDF_ALGORITHM)?;
    check_label(
        "signature.algorithm",
        wire.signature.algorithm.as_deref(),
        SIGNATURE_ALGORITHM,
    )?;

    let encryption = EncryptionParams {
        ephemeral_public_key: decode_fixed(
            "ephemeral_public_key",
            &wire.encryption.ephemeral_public_key,
        )?,
        salt: decode_fixed("salt", &wire.encryption.salt)?,
        iv: decode_fixed("iv", &wire.encryption.iv)?,
        tag: decode_fixed("tag", &wire.encryption.tag)?,
        recipient_cert_fingerprint: wire.encryption.recipient_cert_fingerprint,
    };

    let ciphertext = decode_field("payload", &wire.payload)?;

    let signature = decode_field("signature", &wire.signature.signature)?;
    if signature.is_empty() || signature.len() > MAX_SIGNATURE_LEN {
        return Err(PackError::Parse(format!(
            "signature length {} out of range",
            signature.len()
        )));
    }

    Ok(ConfigPackEnvelope {
        version: wire.tscfg_version,
        metadata: wire.metadata,
        encryption,
        signature: SignatureBlock {
            signer_certificate: wire.signature.signer_certificate,
            signature,
            signed_at: wire.signature.signed_at,
            is_official: wire.signature.is_official,
            scope: wire.signature.scope.unwrap_or_default(),
        },
        ciphertext,
    })
}

/// Serialize an envelope as pretty-printed JSON
pub fn serialize(envelope: &ConfigPackEnvelope) -> Result<String> {
    let scope = match envelope.signature.scope {
        SignatureScope::Ciphertext => None,
        scope => Some(scope),
    };
    let wire = WireEnvelope {
        tscfg_version: envelope.version.clone(),
        format: Some(PACK_FORMAT.to_string()),
        metadata: envelope.metadata.clone(),
        encryption: WireEncryption {
            algorithm: Some(ENCRYPTION_ALGORITHM.to_string()),
            kdf: Some(KDF_ALGORITHM.to_string()),
            ephemeral_public_key: STANDARD.encode(envelope.encryption.ephemeral_public_key),
            salt: STANDARD.encode(envelope.encryption.salt),
            iv: STANDARD.encode(envelope.encryption.iv),
            tag: STANDARD.encode(envelope.encryption.tag),
            recipient_cert_fingerprint: envelope.encryption.recipient_cert_fingerprint.clone(),
        },
        signature: WireSignature {
            algorithm: Some(SIGNATURE_ALGORITHM.to_string()),
            signer_certificate: envelope.signature.signer_certificate.clone(),
            signature: STANDARD.encode(&envelope.signature.signature),
            signed_at: envelope.signature.signed_at.clone(),
            is_official: envelope.signature.is_official,
            scope,
        },
        payload: STANDARD.encode(&envelope.ciphertext),
    };
    serde_json::to_string_pretty(&wire)
        .map_err(|e| PackError::InvalidArgument(format!("failed to serialize envelope: {e}")))
}

/// Canonical byte encoding of everything the envelope signature scope covers.
///
/// Every field is written as a 4-byte big-endian length followed by its
/// bytes; optional fields carry a presence byte first.
pub fn canonical_signing_input(envelope: &ConfigPackEnvelope) -> Vec<u8> {
    let mut out = Vec::with_capacity(envelope.ciphertext.len() + 1024);
    put(&mut out, ENVELOPE_DOMAIN);
    put(&mut out, envelope.version.as_bytes());

    let metadata = &envelope.metadata;
    for field in [
        &metadata.name,
        &metadata.description,
        &metadata.created_at,
        &metadata.created_by,
        &metadata.target_device,
        &metadata.source_file,
        &metadata.content_hash,
    ] {
        put_optional(&mut out, field.as_deref());
    }

    let encryption = &envelope.encryption;
    put(&mut out, ENCRYPTION_ALGORITHM.as_bytes());
    put(&mut out, KDF_ALGORITHM.as_bytes());
    put(&mut out, &encryption.ephemeral_public_key);
    put(&mut out, &encryption.salt);
    put(&mut out, &encryption.iv);
    put(&mut out, &encryption.tag);
    put(&mut out, encryption.recipient_cert_fingerprint.as_bytes());

    put(&mut out, envelope.signature.signer_certificate.as_bytes());
    put_optional(&mut out, envelope.signature.signed_at.as_deref());
    put(&mut out, &envelope.ciphertext);
    out
}

fn put(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_optional(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(text) => {
            out.push(1);
            put(out, text.as_bytes());
        }
        None => out.push(0),
    }
}

fn check_label(field: &str, value: Option<&str>, expected: &str) -> Result<()> {
    match value {
        Some(actual) if actual != expected => Err(PackError::Parse(format!(
            "unsupported {field} '{actual}', expected '{expected}'"
        ))),
        _ => Ok(()),
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| PackError::Parse(format!("invalid base64 in {field}: {e}")))
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    let bytes = decode_field(field, value)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| PackError::Parse(format!("{field} must be {N} bytes, got {len}")))
}
