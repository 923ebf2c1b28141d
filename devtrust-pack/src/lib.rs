//! DevTrust Pack – encrypted configuration packs
//!
//! A `.tscfg` pack carries configuration content encrypted for exactly one
//! device certificate and signed by the exporting device:
//!
//! - [`codec`] maps the JSON envelope to [`ConfigPackEnvelope`]
//! - [`crypto`] holds the ECDH/HKDF/AES-GCM and ECDSA primitives
//! - [`ConfigPackEngine`] runs the protocol on top of a
//!   [`devtrust_keys::DeviceIdentityManager`]

pub mod codec;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod policy;
pub mod types;

pub use codec::{
    ConfigPackEnvelope, EncryptionParams, EnvelopeMetadata, SignatureBlock, SignatureScope,
    PACK_EXTENSION, PACK_VERSION,
};
pub use config::PackConfig;
pub use engine::{validate_pack_name, ConfigPackEngine};
pub use error::{strerror, PackError, PackErrorKind, Result};
pub use policy::{ChainValidation, ExportPolicy};
pub use types::{
    CreateOptions, ImportedPack, LoadedPack, PackMetadata, PackStatus, PriorityLoad,
    SignatureInfo,
};
