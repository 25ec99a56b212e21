//! The KDBX3 streaming cryptographic pipeline
//!
//! Stages compose bottom-up: [`block_cipher`] wraps the outer AES-256-CBC
//! cipher, [`block`] frames/deframes the decrypted plaintext into
//! SHA-256-hashed blocks, and [`random`] builds the inner-stream cipher used
//! to mask individual protected XML field values. [`pipeline`] wires the
//! stages together (plus optional gzip) and runs the read side on a
//! background thread so outer decryption can overlap with XML parsing.

mod block;
mod block_cipher;
mod pipeline;
pub(crate) mod random;

use std::io;

pub(crate) use block_cipher::{BlockCipherReader, BlockCipherWriter, BlockCipherWriterExt};
pub(crate) use pipeline::{spawn_read_pipeline, write_pipeline, PipelineStage, WritePipeline};

/// Errors from inside the pipeline that need to surface as a specific
/// [`crate::errors::UnlockError`] variant rather than a generic I/O failure.
///
/// Carried as the source of an [`io::Error`] of kind [`io::ErrorKind::Other`]
/// so it can cross a [`Read`](io::Read)/[`Write`](io::Write) boundary and
/// still be told apart by [`crate::binary::kdbx`] once it reaches the
/// orchestration layer.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PipelineError {
    /// Decrypted stream-start-bytes did not match the header
    #[error("wrong password or keyfile")]
    BadPassword,
    /// A hashed-block frame claimed a length outside the configured limit
    #[error("hashed block frame corrupt")]
    CorruptFrame,
    /// A hashed-block frame's payload did not match its recorded hash
    #[error("hashed block failed integrity check")]
    IntegrityFailure,
}

impl PipelineError {
    pub(crate) fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::Other, self)
    }

    /// Recover a [`PipelineError`] from an [`io::Error`] that may have
    /// originated from [`PipelineError::into_io`], if any stage raised one
    pub(crate) fn from_io(err: &io::Error) -> Option<&PipelineError> {
        err.get_ref().and_then(|e| e.downcast_ref::<PipelineError>())
    }
}
