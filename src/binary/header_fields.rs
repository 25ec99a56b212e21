use super::header::{HeaderField, OuterHeaderId};
use crate::utils;

pub(crate) const KEEPASS_MAGIC_NUMBER: u32 = 0x9AA2_D903;
pub(crate) const KDBX_MAGIC_NUMBER: u32 = 0xB54B_FB67;

const AES256_UUID: &str = "31c1f2e6-bf71-4350-be58-05216afc5aff";
const COMPRESSION_TYPE_NONE: u32 = 0;
const COMPRESSION_TYPE_GZIP: u32 = 1;

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
/// Encryption cipher used for decrypting the main database data
///
/// KDBX3 only ever uses AES-256 in CBC mode; other identifiers are
/// recognised only so that a database using one produces a clear
/// "unsupported cipher" error rather than a garbled one.
pub enum Cipher {
    /// AES 256 in CBC mode - the only cipher this library can decrypt
    Aes256,
    /// Cipher unknown to, or unsupported by, this library
    Unknown(uuid::Uuid),
}

const CIPHER_TABLE: [(&str, Cipher); 1] = [(AES256_UUID, Cipher::Aes256)];

impl From<uuid::Uuid> for Cipher {
    fn from(uuid: uuid::Uuid) -> Cipher {
        utils::value_from_uuid_table(&CIPHER_TABLE, uuid).unwrap_or(Cipher::Unknown(uuid))
    }
}

impl From<Cipher> for uuid::Uuid {
    fn from(cipher: Cipher) -> uuid::Uuid {
        match cipher {
            Cipher::Unknown(uuid) => uuid,
            _ => utils::uuid_from_uuid_table(&CIPHER_TABLE, cipher).unwrap(),
        }
    }
}

impl From<Cipher> for HeaderField<OuterHeaderId> {
    fn from(cipher: Cipher) -> HeaderField<OuterHeaderId> {
        let uuid: uuid::Uuid = cipher.into();
        HeaderField::new(OuterHeaderId::CipherId, uuid.as_bytes().to_vec())
    }
}

/// Inner stream cipher identifier used for masking protected field values
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InnerStreamCipherAlgorithm {
    /// ARC4/RC4 stream cipher
    ArcFour,
    /// Salsa20 stream cipher - the default KeePass 2.x uses for new KDBX3 databases
    Salsa20,
    /// Unknown stream cipher
    Unknown(u32),
}

impl From<InnerStreamCipherAlgorithm> for u32 {
    fn from(id: InnerStreamCipherAlgorithm) -> u32 {
        match id {
            InnerStreamCipherAlgorithm::ArcFour => 1,
            InnerStreamCipherAlgorithm::Salsa20 => 2,
            InnerStreamCipherAlgorithm::Unknown(x) => x,
        }
    }
}

impl From<u32> for InnerStreamCipherAlgorithm {
    fn from(id: u32) -> InnerStreamCipherAlgorithm {
        match id {
            1 => InnerStreamCipherAlgorithm::ArcFour,
            2 => InnerStreamCipherAlgorithm::Salsa20,
            x => InnerStreamCipherAlgorithm::Unknown(x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Options for converting credentials to crypto keys
///
/// KDBX3 only supports the legacy AES-256 transform - there is no KDF
/// parameter block (that is a KDBX4 concept); rounds and salt come straight
/// out of the `LegacyTransformRounds`/`LegacyTransformSeed` header fields.
pub enum KdfParams {
    /// Legacy AES-256 transform
    Aes {
        /// Rounds of AES-256 to apply to each half of the composed key
        rounds: u64,
        /// Random seed used to key the transform cipher
        salt: Vec<u8>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Compression method used prior to encryption
pub enum CompressionType {
    /// The encrypted data is uncompressed
    None,
    /// The encrypted data uses gzip compression
    Gzip,
    /// The encrypted data uses a compression method unsupported by this library
    Unknown(u32),
}

impl From<CompressionType> for u32 {
    fn from(compression_type: CompressionType) -> u32 {
        match compression_type {
            CompressionType::None => COMPRESSION_TYPE_NONE,
            CompressionType::Gzip => COMPRESSION_TYPE_GZIP,
            CompressionType::Unknown(val) => val,
        }
    }
}

impl From<u32> for CompressionType {
    fn from(id: u32) -> CompressionType {
        match id {
            COMPRESSION_TYPE_NONE => CompressionType::None,
            COMPRESSION_TYPE_GZIP => CompressionType::Gzip,
            _ => CompressionType::Unknown(id),
        }
    }
}

impl From<CompressionType> for HeaderField<OuterHeaderId> {
    fn from(compression_type: CompressionType) -> HeaderField<OuterHeaderId> {
        let compression_type_id: u32 = compression_type.into();
        HeaderField::new(
            OuterHeaderId::CompressionFlags,
            Vec::from(compression_type_id.to_le_bytes().as_ref()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use uuid::Uuid;

    #[test]
    fn cipher_from_uuid_roundtrips() {
        let aes256 = Uuid::parse_str(AES256_UUID).unwrap();
        assert_eq!(Cipher::from(aes256), Cipher::Aes256);
        assert_eq!(uuid::Uuid::from(Cipher::Aes256), aes256);
    }

    #[test]
    fn unknown_cipher_preserves_uuid() {
        let other = Uuid::parse_str("61ab05a1-9464-41c3-8d74-3a563df8dd35").unwrap();
        assert_eq!(Cipher::from(other), Cipher::Unknown(other));
    }

    #[test]
    fn compression_type_roundtrips() {
        assert_eq!(CompressionType::from(0u32), CompressionType::None);
        assert_eq!(CompressionType::from(1u32), CompressionType::Gzip);
        assert_eq!(u32::from(CompressionType::Gzip), 1);
    }
}
