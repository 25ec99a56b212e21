//! Key derivation for KDBX3 databases
//!
//! Credentials (a password, a keyfile, or both) are hashed into an ordered
//! list of 32-byte factors, combined into a [`ComposedKey`], run through the
//! legacy AES-256 transform to get a [`TransformedKey`], and finally mixed
//! with the database's master seed to get the [`MasterKey`] used to key the
//! outer cipher. There is no HMAC key on this path - KDBX3 checks a
//! plaintext SHA-256 per hashed block instead of an HMAC per encrypted one.

use crate::binary::header_fields::KdfParams;
use crate::safebuf::SafeVec;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncryptMut, KeyInit};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Credentials needed to unlock the database
///
/// Currently supports unlocking a database with a combination of a password,
/// a keyfile, or both - at least one is required.
///
/// ```
/// # use kdbx3core::CompositeKey;
/// CompositeKey::from_password("abcdef");
/// ```
pub struct CompositeKey {
    factors: Vec<SafeVec>,
}

impl CompositeKey {
    /// Build a composite key from a password and/or a keyfile's raw bytes
    ///
    /// The keyfile bytes are parsed as a KeePass keyfile (XML v1/v2, hex, or
    /// raw 32/64-byte binary) via [`crate::keyfile`]. At least one of
    /// `password` or `keyfile` must be `Some`.
    pub fn new(
        password: Option<&str>,
        keyfile: Option<&[u8]>,
    ) -> Result<CompositeKey, CompositeKeyError> {
        let mut factors = Vec::new();
        if let Some(pw) = password {
            factors.push(SafeVec::new(Sha256::digest(pw.as_bytes()).to_vec()));
        }
        if let Some(contents) = keyfile {
            factors.push(crate::keyfile::key_file_digest(contents)?);
        }
        if factors.is_empty() {
            return Err(CompositeKeyError::NoCredentials);
        }
        Ok(CompositeKey { factors })
    }

    /// Utility method for making a key with just a password
    pub fn from_password(pw: &str) -> CompositeKey {
        CompositeKey {
            factors: vec![SafeVec::new(Sha256::digest(pw.as_bytes()).to_vec())],
        }
    }

    pub(crate) fn composed(&self) -> ComposedKey {
        let mut hasher = Sha256::new();
        for factor in &self.factors {
            hasher.update(&**factor);
        }
        ComposedKey(SafeVec::new(hasher.finalize().to_vec()))
    }
}

#[derive(Debug, Error)]
/// Errors building a [`CompositeKey`]
pub enum CompositeKeyError {
    /// Neither a password nor a keyfile was provided
    #[error("At least one of a password or keyfile is required to unlock a database")]
    NoCredentials,
    /// The keyfile contents could not be parsed
    #[error("Invalid keyfile - {0}")]
    KeyFile(#[from] crate::keyfile::KeyFileError),
}

#[derive(Debug)]
/// Hashed combined input credentials, ready to be run through the KDF
pub struct ComposedKey(SafeVec);

impl ComposedKey {
    /// Run the composed key through the database's configured KDF
    pub(crate) fn transform(
        &self,
        kdf_options: &KdfParams,
    ) -> Result<TransformedKey, KeyGenerationError> {
        use aes::Aes256;
        let KdfParams::Aes { rounds, salt } = kdf_options;

        let cipher = Aes256::new_from_slice(salt)
            .map_err(|e| KeyGenerationError::KeyGeneration(e.to_string()))?;
        let chunked: Vec<GenericArray<u8, _>> = self
            .0
            .chunks_exact(16)
            .map(|chunk| *GenericArray::from_slice(chunk))
            .collect();
        if chunked.len() != 2 {
            return Err(KeyGenerationError::KeyGeneration(
                "composed key is not 32 bytes".into(),
            ));
        }
        let mut halves = [chunked[0], chunked[1]];

        let started = std::time::Instant::now();
        // The two 16-byte halves are transformed independently - AES-ECB on
        // a single block has no cross-block dependency, so the (possibly
        // billions of) rounds for each half can run on separate threads.
        halves.par_iter_mut().for_each(|half| {
            let mut one_block = [*half];
            for _ in 0..*rounds {
                cipher.encrypt_blocks_mut(&mut one_block);
            }
            *half = one_block[0];
        });
        tracing::debug!(rounds, elapsed_ms = started.elapsed().as_millis() as u64, "KDF transform finished");

        let mut hasher = Sha256::new();
        hasher.update(halves[0]);
        hasher.update(halves[1]);
        Ok(TransformedKey(SafeVec::new(hasher.finalize().to_vec())))
    }
}

/// Output of the legacy AES-256 transform, not yet seeded with the database's
/// master seed
#[derive(Debug)]
pub(crate) struct TransformedKey(SafeVec);

impl TransformedKey {
    pub(crate) fn master_key(&self, master_seed: &[u8]) -> MasterKey {
        let mut hasher = Sha256::new();
        hasher.update(master_seed);
        hasher.update(&*self.0);
        MasterKey(SafeVec::new(hasher.finalize().to_vec()))
    }
}

/// Master key used to key the outer block cipher
#[derive(Debug)]
pub struct MasterKey(SafeVec);

impl MasterKey {
    /// Derive the key used to initialise the outer cipher
    ///
    /// For KDBX3 this is the master key itself - there is no separate HMAC
    /// key to derive since data integrity is checked per hashed block
    /// instead of via HMAC.
    pub(crate) fn cipher_key(&self) -> CipherKey {
        CipherKey(self.0.clone())
    }
}

/// Used to initialise the encryption/decryption cipher
pub(crate) struct CipherKey(pub(crate) SafeVec);

/// Confirm the hash of a given block of data for data corruption detection
pub(crate) fn verify_sha256(data: &[u8], expected_sha: &[u8]) -> bool {
    expected_sha == &*Sha256::digest(data)
}

pub(crate) fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).as_slice().to_vec()
}

#[derive(Debug, Error)]
/// Errors encountered generating crypto keys
pub enum KeyGenerationError {
    /// Unexpected error when generating a key
    #[error("Could not generate key: {0}")]
    KeyGeneration(String),
    /// KDF options are not supported by this library
    #[error("Generation for KDF options {0:?} not implemented")]
    UnimplementedKdfOptions(KdfParams),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_composes_identically() {
        let a = CompositeKey::from_password("hunter2").composed();
        let b = CompositeKey::from_password("hunter2").composed();
        assert_eq!(&*a.0, &*b.0);
    }

    #[test]
    fn different_passwords_compose_differently() {
        let a = CompositeKey::from_password("hunter2").composed();
        let b = CompositeKey::from_password("hunter3").composed();
        assert_ne!(&*a.0, &*b.0);
    }

    #[test]
    fn transform_is_deterministic() {
        let composed = CompositeKey::from_password("hunter2").composed();
        let kdf = KdfParams::Aes {
            rounds: 4,
            salt: vec![0x11; 32],
        };
        let a = composed.transform(&kdf).unwrap();
        let b = composed.transform(&kdf).unwrap();
        assert_eq!(&*a.0, &*b.0);
    }

    #[test]
    fn rejects_empty_credentials() {
        assert!(matches!(
            CompositeKey::new(None, None),
            Err(CompositeKeyError::NoCredentials)
        ));
    }
}
