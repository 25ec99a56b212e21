use super::header;
use crate::crypto;
use thiserror::Error;

#[derive(Error, Debug)]
/// Errors encountered loading a database prior to decryption
pub enum OpenError {
    /// KeePass database magic number missing
    #[error("Unsupported file type - not a keepass database")]
    NonKeepassFormat,
    /// Second header magic number is not that for kdbx
    #[error("Unsupported file type - not kdbx")]
    UnsupportedFileFormat,
    /// The KDBX version is not v3
    #[error("Unsupported kdbx version {0} - only KDBX v3 is supported")]
    UnsupportedMajorVersion(u16),
    /// There was some error parsing the unencrypted database header
    #[error("Error reading database header - {0}")]
    InvalidHeader(#[from] HeaderError),
    /// Error encountered reading the database
    #[error("IO error reading file - {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
/// Errors encountered unlocking an encrypted database
pub enum UnlockError {
    /// The header checksum was correct but the decrypted stream's first
    /// bytes do not match `StreamStartBytes`. This indicates an invalid
    /// password or keyfile - KDBX3 has no other way to distinguish a wrong
    /// key from a corrupt ciphertext at this point.
    #[error("Decryption failed - wrong password, wrong keyfile, or corrupt database")]
    BadPassword,
    /// A hashed-block frame claimed a length outside the configured limit
    #[error("Corrupt database - hashed block frame malformed")]
    CorruptFrame,
    /// A hashed-block frame's payload did not match its recorded SHA-256 hash
    #[error("Corrupt database - hashed block failed integrity check")]
    IntegrityFailure,
    /// The database's cipher is not supported by this library
    #[error("Incompatible database - unsupported cipher {0:?}")]
    UnsupportedCipher(uuid::Uuid),
    /// The database's inner-stream cipher is not supported by this library
    #[error("Incompatible database - unsupported inner stream cipher {0:?}")]
    UnsupportedInnerStreamCipher(crate::binary::header_fields::InnerStreamCipherAlgorithm),
    /// There was some error generating the keys
    #[error("Key generation failed - {0}")]
    KeyGen(#[from] crypto::KeyGenerationError),
    /// The composite key could not be built from the supplied credentials
    #[error("Invalid credentials - {0}")]
    CompositeKey(#[from] crypto::CompositeKeyError),
    /// The decrypted XML could not be parsed
    #[error("Corrupt database - invalid XML - {0}")]
    InvalidXml(#[from] crate::xml::parse::Error),
    /// Error encountered decrypting or decompressing the database content
    #[error("Decryption failed - {0}")]
    Decrypt(std::io::Error),
}

impl From<std::io::Error> for UnlockError {
    fn from(err: std::io::Error) -> UnlockError {
        match crate::stream::PipelineError::from_io(&err) {
            Some(crate::stream::PipelineError::BadPassword) => UnlockError::BadPassword,
            Some(crate::stream::PipelineError::CorruptFrame) => UnlockError::CorruptFrame,
            Some(crate::stream::PipelineError::IntegrityFailure) => UnlockError::IntegrityFailure,
            None => UnlockError::Decrypt(err),
        }
    }
}

#[derive(Debug, Error)]
/// Errors encountered validating the database header
pub enum HeaderError {
    /// The reader failed before the header was entirely read
    #[error("Error reading database header - {0}")]
    Io(#[from] std::io::Error),
    /// A supported field had an unexpected format
    #[error("Incompatible database - Malformed field of type {0:?}: {1}")]
    MalformedField(header::OuterHeaderId, String),
    /// A required field is missing from the unencrypted header
    #[error("Incompatible database - Missing required field of type {0:?}")]
    MissingRequiredField(header::OuterHeaderId),
    /// Validating the header against the unencrypted SHA-256 hash failed
    #[error("Corrupt database - Header checksum failed")]
    ChecksumFailed,
}

#[derive(Debug, Error)]
/// Errors encountered writing a database
pub enum WriteError {
    /// Writing the encrypted or framed bytes failed
    #[error("Error writing database - {0}")]
    Io(#[from] std::io::Error),
    /// The database could not be written because `set_key()` has not been called
    #[error("No key to write database with")]
    MissingKeys,
    /// The header's inner-stream cipher is not supported by this library
    #[error("Incompatible database - unsupported inner stream cipher {0:?}")]
    UnsupportedInnerStreamCipher(crate::binary::header_fields::InnerStreamCipherAlgorithm),
    /// The XML event writer failed
    #[error("Error writing database XML - {0}")]
    Xml(#[from] crate::xml::serialize::Error),
}
