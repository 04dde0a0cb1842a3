//! Error types for kdbxcore

use thiserror::Error;

use crate::model::Identifier;

/// Main error type for database operations
#[derive(Error, Debug)]
pub enum KdbxError {
    /// The crypto adapter has not passed its self-test yet
    #[error("Crypto backend is not initialized")]
    CryptoNotInitialized,

    /// A known-answer self-test failed
    #[error("Crypto self-test failed: {0}")]
    SelfTest(String),

    /// Cipher construction or processing failed
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Key transformation (KDF) failed
    #[error("Unable to calculate master key: {0}")]
    KeyTransform(String),

    /// File does not start with the expected signatures
    #[error("Not a KeePass database.")]
    BadSignature,

    /// Major version outside the supported range
    #[error("Unsupported KeePass database version.")]
    UnsupportedVersion,

    /// A header field is malformed or names an unsupported algorithm
    #[error("{0}")]
    InvalidHeader(String),

    /// One or more required header fields were absent
    #[error("missing database headers")]
    MissingHeaders,

    /// Stream start bytes did not match after decryption
    #[error("Wrong key or database file is corrupt.")]
    WrongKey,

    /// The hashed block stream failed verification
    #[error("Block verification failed: {0}")]
    BlockVerification(String),

    /// The gzip layer could not be decoded
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// The document is not well-formed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// The document is well-formed but violates the database schema
    #[error("Invalid database document: {0}")]
    Document(String),

    /// The header hash stored in the document does not match the header
    #[error("Header doesn't match hash")]
    HeaderHashMismatch,

    /// A key file could not be loaded or created
    #[error("Key file error: {0}")]
    KeyFile(String),

    /// Operation not allowed on the current model state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(Identifier),

    /// Group not found
    #[error("Group not found: {0}")]
    GroupNotFound(Identifier),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<xml::reader::Error> for KdbxError {
    fn from(err: xml::reader::Error) -> Self {
        KdbxError::Xml(err.to_string())
    }
}

impl From<xml::writer::Error> for KdbxError {
    fn from(err: xml::writer::Error) -> Self {
        KdbxError::Xml(err.to_string())
    }
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, KdbxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KdbxError::WrongKey;
        assert_eq!(err.to_string(), "Wrong key or database file is corrupt.");

        let err = KdbxError::MissingHeaders;
        assert_eq!(err.to_string(), "missing database headers");

        let err = KdbxError::InvalidHeader("Unsupported cipher".to_string());
        assert_eq!(err.to_string(), "Unsupported cipher");

        let err = KdbxError::KeyTransform("Invalid seed length".to_string());
        assert!(err.to_string().contains("Invalid seed length"));

        let id = Identifier::from_bytes([0xAB; 16]);
        let err = KdbxError::EntryNotFound(id);
        assert!(err.to_string().contains(&id.to_hex()));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: KdbxError = io_err.into();
        match err {
            KdbxError::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::UnexpectedEof),
            _ => panic!("Expected Io"),
        }
    }
}
