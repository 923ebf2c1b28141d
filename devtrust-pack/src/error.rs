use devtrust_keys::KeyError;
use thiserror::Error;

/// Error types for config pack operations
#[derive(Error, Debug)]
pub enum PackError {
    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("Unsupported version: {0}")]
    Version(String),

    #[error("Not intended for this device: {0}")]
    Recipient(String),

    #[error("Certificate chain validation failed: {0}")]
    CertChain(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Content hash mismatch: {0}")]
    Integrity(String),

    #[error("Package expired: {0}")]
    Expired(String),

    #[error("Memory allocation failed: {0}")]
    NoMemory(String),

    #[error("File I/O error: {0}")]
    Io(String),

    #[error("Permission denied (not a developer device): {0}")]
    Permission(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("System not initialized: {0}")]
    NotInitialized(String),
}

/// Fieldless error classification with stable numeric result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackErrorKind {
    Parse = 1,
    Version = 2,
    Recipient = 3,
    CertChain = 4,
    Signature = 5,
    Decrypt = 6,
    Integrity = 7,
    Expired = 8,
    NoMemory = 9,
    Io = 10,
    Permission = 11,
    InvalidArgument = 12,
    NotInitialized = 13,
}

/// Result code for success
pub const RESULT_OK: i32 = 0;

const MESSAGES: [&str; 14] = [
    "Success",
    "JSON parse error",
    "Unsupported version",
    "Not intended for this device",
    "Certificate chain validation failed",
    "Signature verification failed",
    "Decryption failed",
    "Content hash mismatch",
    "Package expired",
    "Memory allocation failed",
    "File I/O error",
    "Permission denied (not a developer device)",
    "Invalid argument",
    "System not initialized",
];

/// Human-readable message for a result code
pub fn strerror(code: i32) -> &'static str {
    usize::try_from(code)
        .ok()
        .and_then(|index| MESSAGES.get(index).copied())
        .unwrap_or("Unknown error")
}

impl PackErrorKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn message(self) -> &'static str {
        strerror(self.code())
    }
}

impl PackError {
    pub fn kind(&self) -> PackErrorKind {
        match self {
            PackError::Parse(_) => PackErrorKind::Parse,
            PackError::Version(_) => PackErrorKind::Version,
            PackError::Recipient(_) => PackErrorKind::Recipient,
            PackError::CertChain(_) => PackErrorKind::CertChain,
            PackError::Signature(_) => PackErrorKind::Signature,
            PackError::Decrypt(_) => PackErrorKind::Decrypt,
            PackError::Integrity(_) => PackErrorKind::Integrity,
            PackError::Expired(_) => PackErrorKind::Expired,
            PackError::NoMemory(_) => PackErrorKind::NoMemory,
            PackError::Io(_) => PackErrorKind::Io,
            PackError::Permission(_) => PackErrorKind::Permission,
            PackError::InvalidArgument(_) => PackErrorKind::InvalidArgument,
            PackError::NotInitialized(_) => PackErrorKind::NotInitialized,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

impl From<std::io::Error> for PackError {
    fn from(err: std::io::Error) -> Self {
        PackError::Io(err.to_string())
    }
}

impl From<KeyError> for PackError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::NotFound(msg) | KeyError::InvalidState(msg) => PackError::NotInitialized(msg),
            KeyError::NoMemory(msg) => PackError::NoMemory(msg),
            KeyError::StorageError(msg) => PackError::Io(msg),
            KeyError::IoError(e) => PackError::Io(e.to_string()),
            other => PackError::InvalidArgument(other.to_string()),
        }
    }
}

/// Result type for config pack operations
pub type Result<T> = std::result::Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strerror_table() {
        assert_eq!(strerror(RESULT_OK), "Success");
        assert_eq!(strerror(PackErrorKind::Recipient.code()), "Not intended for this device");
        assert_eq!(
            PackErrorKind::Permission.message(),
            "Permission denied (not a developer device)"
        );
        assert_eq!(PackErrorKind::NotInitialized.message(), "System not initialized");
        assert_eq!(strerror(14), "Unknown error");
        assert_eq!(strerror(-1), "Unknown error");
    }

    #[test]
    fn test_codes_are_stable() {
        let kinds = [
            PackErrorKind::Parse,
            PackErrorKind::Version,
            PackErrorKind::Recipient,
            PackErrorKind::CertChain,
            PackErrorKind::Signature,
            PackErrorKind::Decrypt,
            PackErrorKind::Integrity,
            PackErrorKind::Expired,
            PackErrorKind::NoMemory,
            PackErrorKind::Io,
            PackErrorKind::Permission,
            PackErrorKind::InvalidArgument,
            PackErrorKind::NotInitialized,
        ];
        for (index, kind) in kinds.iter().enumerate() {
            assert_eq!(kind.code(), index as i32 + 1);
        }
    }

    #[test]
    fn test_key_error_mapping() {
        let err: PackError = KeyError::NotFound("no certificate".into()).into();
        assert_eq!(err.kind(), PackErrorKind::NotInitialized);
        let err: PackError = KeyError::CertificateError("bad".into()).into();
        assert_eq!(err.kind(), PackErrorKind::InvalidArgument);
        let err: PackError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), PackErrorKind::Io);
    }
}
