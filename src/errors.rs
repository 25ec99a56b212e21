//! Error types for kdbx-rs

pub use crate::binary::errors::{HeaderError, OpenError, UnlockError, WriteError};
pub use crate::binary::FailedUnlock;
pub use crate::crypto::{CompositeKeyError, KeyGenerationError};
pub use crate::xml::parse::Error as XmlReadError;
pub use crate::xml::serialize::Error as XmlWriteError;
use thiserror::Error;

#[derive(Error, Debug)]
/// Wrapper error type for this library
pub enum Error {
    /// Failed to open a database
    #[error("Could not open database: {0}")]
    Open(#[from] OpenError),
    /// Failed unlocking a database
    #[error("Could not unlock database: {0}")]
    Unlock(#[from] UnlockError),
    /// Failed parsing database XML
    #[error("Failed to parse database XML: {0}")]
    XmlRead(#[from] XmlReadError),
    /// Failed writing a database
    #[error("Could not write database: {0}")]
    Write(#[from] WriteError),
    /// Failed generating crypto keys
    #[error("Failed to create encryption keys")]
    KeyGeneration(#[from] KeyGenerationError),
}

impl From<FailedUnlock> for Error {
    /// Discards the returned locked database, keeping only the failure
    /// reason - for callers that don't intend to retry with new credentials
    /// and just want to propagate the error with `?`
    fn from(failed: FailedUnlock) -> Error {
        Error::Unlock(failed.into())
    }
}
