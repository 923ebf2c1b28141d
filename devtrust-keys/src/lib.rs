//! DevTrust Keys – device identity facade
//!
//! The [`DeviceIdentityManager`] owns the device key pair and certificate
//! lifecycle. Supporting modules provide certificate parsing, CSR
//! generation, the identity store, secret buffers and a lab CA.

pub mod authority;
pub mod certificate;
pub mod config;
pub mod error;
pub mod identity;
pub mod secret;
pub mod store;

pub use error::{KeyError, Result};

pub use authority::CertificateAuthority;
pub use certificate::{
    parse_certificate, parse_csr, pem_fingerprint, CertInfo, CertValidity, CertificateRequest,
    CertificateValidator, CsrDetails, CsrOptions, EcdsaKeyPair, X509Certificate,
};
pub use config::IdentityConfig;
pub use identity::{DeviceCredentials, DeviceIdentityManager, PkiStatus, PkiStatusReport};
pub use secret::{SecretArray, SecretBytes};
pub use store::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
