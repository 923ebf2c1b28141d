use thiserror::Error;

/// Error types for the devtrust-keys crate
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Out of memory: {0}")]
    NoMemory(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Chain validation error: {0}")]
    ChainValidationError(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<der::Error> for KeyError {
    fn from(err: der::Error) -> Self {
        KeyError::CertificateError(format!("DER encoding error: {}", err))
    }
}

impl From<openssl::error::ErrorStack> for KeyError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        KeyError::CertificateError(format!("OpenSSL error: {}", err))
    }
}

impl From<pkcs8::Error> for KeyError {
    fn from(err: pkcs8::Error) -> Self {
        KeyError::InvalidKeyFormat(format!("PKCS#8 error: {}", err))
    }
}

/// Result type for devtrust-keys operations
pub type Result<T> = std::result::Result<T, KeyError>;
