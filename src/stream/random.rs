//! Inner-stream ciphers used to mask protected field values
//!
//! Unlike the outer cipher, these run over the plaintext XML after framing
//! and (de)compression have already been undone, masking only the contents
//! of fields KeePass marks `Protected="True"` (passwords, and anything else
//! the user chose to protect).

use cipher::{KeyIvInit, StreamCipher};
use rc4::{consts::U32, KeyInit as Rc4KeyInit, Rc4};
use salsa20::Salsa20;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::binary::InnerStreamCipherAlgorithm;

/// Fixed Salsa20 nonce used by KeePass for masking protected values -
/// not a secret, just part of the wire format
pub const SALSA20_IV: [u8; 8] = [0xe8, 0x30, 0x09, 0x4b, 0x97, 0x20, 0x5d, 0x2a];

#[derive(Debug, Error)]
/// Errors creating the inner stream cipher used to mask protected values
pub enum InnerStreamError {
    #[error("Unsupported inner stream type: {0:?}")]
    /// The cipher type is not supported by this library
    UnsupportedCipher(InnerStreamCipherAlgorithm),
    #[error("Inner stream key is not the required length")]
    /// The header's `ProtectedStreamKey` was not exactly 32 bytes
    InvalidKeyLength,
}

impl InnerStreamCipherAlgorithm {
    /// Create a stream cipher instance for this algorithm
    pub fn stream_cipher(self, key: &[u8]) -> Result<Box<dyn StreamCipher>, InnerStreamError> {
        match self {
            InnerStreamCipherAlgorithm::ArcFour => {
                let cipher: Rc4<U32> = Rc4::new_from_slice(key)
                    .map_err(|_| InnerStreamError::InvalidKeyLength)?;
                Ok(Box::new(cipher))
            }
            InnerStreamCipherAlgorithm::Salsa20 => {
                let iv = Sha256::digest(key);
                Ok(Box::new(
                    Salsa20::new_from_slices(&iv[0..32], &SALSA20_IV).unwrap(),
                ))
            }
            InnerStreamCipherAlgorithm::Unknown(_) => {
                Err(InnerStreamError::UnsupportedCipher(self))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salsa20_masking_is_its_own_inverse() {
        let key = [7u8; 32];
        let plaintext = b"a protected password value";

        let mut cipher = InnerStreamCipherAlgorithm::Salsa20
            .stream_cipher(&key)
            .unwrap();
        let mut masked = plaintext.to_vec();
        cipher.apply_keystream(&mut masked);
        assert_ne!(masked, plaintext);

        let mut cipher = InnerStreamCipherAlgorithm::Salsa20
            .stream_cipher(&key)
            .unwrap();
        let mut unmasked = masked.clone();
        cipher.apply_keystream(&mut unmasked);
        assert_eq!(unmasked, plaintext);
    }

    #[test]
    fn arcfour_masking_is_its_own_inverse() {
        let key = [9u8; 32];
        let plaintext = b"another protected value";

        let mut cipher = InnerStreamCipherAlgorithm::ArcFour
            .stream_cipher(&key)
            .unwrap();
        let mut masked = plaintext.to_vec();
        cipher.apply_keystream(&mut masked);

        let mut cipher = InnerStreamCipherAlgorithm::ArcFour
            .stream_cipher(&key)
            .unwrap();
        let mut unmasked = masked.clone();
        cipher.apply_keystream(&mut unmasked);
        assert_eq!(unmasked, plaintext);
    }

    #[test]
    fn unknown_cipher_is_rejected() {
        assert!(InnerStreamCipherAlgorithm::Unknown(99)
            .stream_cipher(&[0u8; 32])
            .is_err());
    }
}
