//! The unencrypted outer header of a `.kdbx` v3 file
//!
//! Unlike KDBX4, KDBX3 keeps everything - including the inner-stream cipher
//! used to mask protected field values - in one unencrypted, length-prefixed
//! TLV header. There is no separate encrypted inner header and no KDF
//! parameter block; key stretching parameters are just two more header
//! fields (`LegacyTransformSeed`/`LegacyTransformRounds`).

use super::errors::HeaderError as Error;
use super::header_fields;
use crate::crypto;
use crate::utils;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::marker::PhantomData;
use uuid::Uuid;

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
/// Field types for the unencrypted outer header
pub enum OuterHeaderId {
    /// Last header field
    EndOfHeader,
    /// Custom comment to describe the database
    Comment,
    /// UUID indicating the cipher for the database
    CipherId,
    /// Compression algorithm in use
    CompressionFlags,
    /// Seed to make database keys unique
    MasterSeed,
    /// Seed used for converting passwords to keys
    LegacyTransformSeed,
    /// Number of rounds of AES-256 to use to generate keys
    LegacyTransformRounds,
    /// Initial value for the outer block cipher
    EncryptionIv,
    /// Key used for the inner-stream cipher that masks protected field values
    ProtectedStreamKey,
    /// First bytes of the decrypted data, checked to confirm the key is correct
    StreamStartBytes,
    /// Cipher identifier for the inner stream that masks protected field values
    InnerRandomStreamId,
    /// Some header field not supported by this library
    Unknown(u8),
}

impl From<u8> for OuterHeaderId {
    fn from(id: u8) -> OuterHeaderId {
        match id {
            0 => OuterHeaderId::EndOfHeader,
            0x1 => OuterHeaderId::Comment,
            0x2 => OuterHeaderId::CipherId,
            0x3 => OuterHeaderId::CompressionFlags,
            0x4 => OuterHeaderId::MasterSeed,
            0x5 => OuterHeaderId::LegacyTransformSeed,
            0x6 => OuterHeaderId::LegacyTransformRounds,
            0x7 => OuterHeaderId::EncryptionIv,
            0x8 => OuterHeaderId::ProtectedStreamKey,
            0x9 => OuterHeaderId::StreamStartBytes,
            0xA => OuterHeaderId::InnerRandomStreamId,
            x => OuterHeaderId::Unknown(x),
        }
    }
}

impl From<OuterHeaderId> for u8 {
    fn from(id: OuterHeaderId) -> u8 {
        match id {
            OuterHeaderId::EndOfHeader => 0,
            OuterHeaderId::Comment => 0x1,
            OuterHeaderId::CipherId => 0x2,
            OuterHeaderId::CompressionFlags => 0x3,
            OuterHeaderId::MasterSeed => 0x4,
            OuterHeaderId::LegacyTransformSeed => 0x5,
            OuterHeaderId::LegacyTransformRounds => 0x6,
            OuterHeaderId::EncryptionIv => 0x7,
            OuterHeaderId::ProtectedStreamKey => 0x8,
            OuterHeaderId::StreamStartBytes => 0x9,
            OuterHeaderId::InnerRandomStreamId => 0xA,
            OuterHeaderId::Unknown(x) => x,
        }
    }
}

impl OuterHeaderId {
    fn is_final(&self) -> bool {
        *self == OuterHeaderId::EndOfHeader
    }
}

/// A single raw TLV entry from the unencrypted outer header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField<T> {
    pub(crate) ty: T,
    pub(crate) data: Vec<u8>,
}

impl<T> HeaderField<T> {
    pub(crate) fn new(ty: T, data: Vec<u8>) -> HeaderField<T> {
        HeaderField { ty, data }
    }
}

pub(crate) struct HeaderParser<'a, R: Read + 'a> {
    _id: PhantomData<OuterHeaderId>,
    reader: &'a mut R,
}

impl<'a, R> HeaderParser<'a, R>
where
    R: Read + 'a,
{
    pub(crate) fn new(reader: &'a mut R) -> HeaderParser<'a, R> {
        HeaderParser {
            _id: PhantomData,
            reader,
        }
    }

    fn read_one_header(&mut self) -> Result<HeaderField<OuterHeaderId>> {
        let mut ty_buffer = [0u8];
        self.reader.read_exact(&mut ty_buffer)?;
        let ty = OuterHeaderId::from(ty_buffer[0]);

        // KDBX3 uses a 16-bit length prefix; KDBX4's 32-bit prefix is out
        // of scope for this library.
        let mut len_buffer = [0u8; 2];
        self.reader.read_exact(&mut len_buffer)?;
        let len = u16::from_le_bytes(len_buffer) as usize;

        let mut header_buffer = utils::buffer(len);
        self.reader.read_exact(&mut header_buffer)?;

        Ok(HeaderField {
            ty,
            data: header_buffer,
        })
    }

    pub(crate) fn read_all_headers(&mut self) -> Result<Vec<HeaderField<OuterHeaderId>>> {
        let mut headers = Vec::new();
        let mut header = self.read_one_header()?;
        while !header.ty.is_final() {
            headers.push(header);
            header = self.read_one_header()?;
        }

        Ok(headers)
    }
}

#[derive(Default)]
struct KdbxHeaderBuilder {
    cipher: Option<header_fields::Cipher>,
    compression_type: Option<header_fields::CompressionType>,
    master_seed: Option<Vec<u8>>,
    encryption_iv: Option<Vec<u8>>,
    legacy_transform_seed: Option<Vec<u8>>,
    legacy_transform_rounds: Option<u64>,
    stream_start_bytes: Option<Vec<u8>>,
    inner_stream_cipher: Option<header_fields::InnerStreamCipherAlgorithm>,
    inner_stream_key: Option<Vec<u8>>,
    other_headers: Vec<HeaderField<OuterHeaderId>>,
}

impl KdbxHeaderBuilder {
    fn add_header(&mut self, header: HeaderField<OuterHeaderId>) -> Result<()> {
        match header.ty {
            OuterHeaderId::CipherId => {
                let cipher = Uuid::from_slice(&header.data)
                    .map(From::from)
                    .map_err(|_e| {
                        Error::MalformedField(header.ty, "Cipher UUID not valid".into())
                    })?;
                self.cipher = Some(cipher);
            }
            OuterHeaderId::CompressionFlags => {
                if header.data.len() != 4 {
                    return Err(Error::MalformedField(
                        OuterHeaderId::CompressionFlags,
                        "Wrong size for compression ID".into(),
                    ));
                }
                self.compression_type =
                    Some(header_fields::CompressionType::from(u32::from_le_bytes([
                        header.data[0],
                        header.data[1],
                        header.data[2],
                        header.data[3],
                    ])))
            }
            OuterHeaderId::MasterSeed => self.master_seed = Some(header.data),
            OuterHeaderId::EncryptionIv => self.encryption_iv = Some(header.data),
            OuterHeaderId::LegacyTransformSeed => self.legacy_transform_seed = Some(header.data),
            OuterHeaderId::LegacyTransformRounds => {
                if header.data.len() != 8 {
                    return Err(Error::MalformedField(
                        OuterHeaderId::LegacyTransformRounds,
                        "Wrong size for transform rounds".into(),
                    ));
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&header.data);
                self.legacy_transform_rounds = Some(u64::from_le_bytes(buf));
            }
            OuterHeaderId::StreamStartBytes => self.stream_start_bytes = Some(header.data),
            OuterHeaderId::InnerRandomStreamId => {
                if header.data.len() != 4 {
                    return Err(Error::MalformedField(
                        OuterHeaderId::InnerRandomStreamId,
                        "Wrong size for inner stream cipher ID".into(),
                    ));
                }
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&header.data);
                self.inner_stream_cipher = Some(u32::from_le_bytes(buf).into());
            }
            OuterHeaderId::ProtectedStreamKey => self.inner_stream_key = Some(header.data),
            OuterHeaderId::Comment | OuterHeaderId::Unknown(_) | OuterHeaderId::EndOfHeader => {
                self.other_headers.push(header)
            }
        }

        Ok(())
    }

    fn build(self) -> Result<KdbxHeader> {
        let rounds = self
            .legacy_transform_rounds
            .ok_or(Error::MissingRequiredField(OuterHeaderId::LegacyTransformRounds))?;
        let salt = self
            .legacy_transform_seed
            .ok_or(Error::MissingRequiredField(OuterHeaderId::LegacyTransformSeed))?;

        Ok(KdbxHeader {
            cipher: self
                .cipher
                .ok_or(Error::MissingRequiredField(OuterHeaderId::CipherId))?,
            compression_type: self
                .compression_type
                .ok_or(Error::MissingRequiredField(OuterHeaderId::CompressionFlags))?,
            master_seed: self
                .master_seed
                .ok_or(Error::MissingRequiredField(OuterHeaderId::MasterSeed))?,
            encryption_iv: self
                .encryption_iv
                .ok_or(Error::MissingRequiredField(OuterHeaderId::EncryptionIv))?,
            kdf_params: header_fields::KdfParams::Aes { rounds, salt },
            stream_start_bytes: self
                .stream_start_bytes
                .ok_or(Error::MissingRequiredField(OuterHeaderId::StreamStartBytes))?,
            inner_stream_cipher: self
                .inner_stream_cipher
                .ok_or(Error::MissingRequiredField(OuterHeaderId::InnerRandomStreamId))?,
            inner_stream_key: self
                .inner_stream_key
                .ok_or(Error::MissingRequiredField(OuterHeaderId::ProtectedStreamKey))?,
            other_headers: self.other_headers,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
/// Unencrypted database configuration, including the inner-stream cipher
/// setup used to mask protected field values
///
/// [`KdbxHeader::from_os_random()`] provides a header with the default
/// encryption settings and new random keys from the OS secure RNG.
pub struct KdbxHeader {
    /// Encryption cipher used for the outer, on-disk encryption
    pub cipher: header_fields::Cipher,
    /// Parameters for converting credentials to crypto keys
    pub kdf_params: header_fields::KdfParams,
    /// Compression applied prior to encryption
    pub compression_type: header_fields::CompressionType,
    /// First bytes of the decrypted data, used to confirm the key is correct
    pub stream_start_bytes: Vec<u8>,
    /// Cipher used to mask protected field values in the decrypted XML
    pub inner_stream_cipher: header_fields::InnerStreamCipherAlgorithm,
    /// Key for the inner-stream cipher
    pub inner_stream_key: Vec<u8>,
    /// Custom and unrecognized header fields, kept so round-tripping a
    /// database this library only partially understands doesn't lose data
    pub other_headers: Vec<HeaderField<OuterHeaderId>>,
    /// Master seed used to make crypto keys database-specific
    pub master_seed: Vec<u8>,
    /// IV used for initializing the outer cipher
    pub encryption_iv: Vec<u8>,
}

impl KdbxHeader {
    /// Create a new header to encrypt a database with keys from the OS secure RNG
    ///
    /// Under the hood this uses the [`rand`] crate's [`OsRng`]. The default
    /// encryption is AES-256-CBC with 6,000,000 rounds of the legacy AES
    /// transform and Salsa20 for masking protected field values, matching
    /// what KeePass 2.x itself writes for new KDBX3 databases.
    pub fn from_os_random() -> KdbxHeader {
        let mut master_seed = vec![0u8; 32];
        let mut encryption_iv = vec![0u8; 16];
        let mut transform_seed = vec![0u8; 32];
        let mut stream_start_bytes = vec![0u8; 32];
        let mut inner_stream_key = vec![0u8; 32];
        OsRng.fill_bytes(&mut master_seed);
        OsRng.fill_bytes(&mut encryption_iv);
        OsRng.fill_bytes(&mut transform_seed);
        OsRng.fill_bytes(&mut stream_start_bytes);
        OsRng.fill_bytes(&mut inner_stream_key);

        KdbxHeader {
            cipher: header_fields::Cipher::Aes256,
            kdf_params: header_fields::KdfParams::Aes {
                rounds: 6_000_000,
                salt: transform_seed,
            },
            compression_type: header_fields::CompressionType::Gzip,
            stream_start_bytes,
            inner_stream_cipher: header_fields::InnerStreamCipherAlgorithm::Salsa20,
            inner_stream_key,
            other_headers: Vec::new(),
            master_seed,
            encryption_iv,
        }
    }

    pub(crate) fn read<R: Read>(
        mut caching_reader: utils::CachingReader<R>,
    ) -> Result<(KdbxHeader, Vec<u8>)> {
        let mut header_builder = KdbxHeaderBuilder::default();
        let headers = HeaderParser::new(&mut caching_reader).read_all_headers()?;
        for header in headers {
            header_builder.add_header(header)?;
        }

        let (header_bin, input) = caching_reader.into_inner();

        let mut checksum = utils::buffer(Sha256::output_size());
        input.read_exact(&mut checksum)?;
        if !crypto::verify_sha256(&header_bin, &checksum) {
            return Err(Error::ChecksumFailed);
        }

        Ok((header_builder.build()?, header_bin))
    }

    pub(crate) fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        use std::iter::once;
        let headers = self
            .other_headers
            .iter()
            .cloned()
            .filter(|h| h.ty != OuterHeaderId::EndOfHeader)
            .chain(once(self.cipher.into()))
            .chain(once(self.compression_type.into()))
            .chain(once(HeaderField::new(
                OuterHeaderId::MasterSeed,
                self.master_seed.clone(),
            )))
            .chain(once(HeaderField::new(
                OuterHeaderId::EncryptionIv,
                self.encryption_iv.clone(),
            )))
            .chain(legacy_transform_fields(&self.kdf_params))
            .chain(once(HeaderField::new(
                OuterHeaderId::StreamStartBytes,
                self.stream_start_bytes.clone(),
            )))
            .chain(once(HeaderField::new(
                OuterHeaderId::InnerRandomStreamId,
                u32::from(self.inner_stream_cipher).to_le_bytes().to_vec(),
            )))
            .chain(once(HeaderField::new(
                OuterHeaderId::ProtectedStreamKey,
                self.inner_stream_key.clone(),
            )))
            .chain(once(HeaderField::new(
                OuterHeaderId::EndOfHeader,
                Vec::new(),
            )));

        for header in headers {
            writer.write_all(&[header.ty.into()])?;
            writer.write_all(&(header.data.len() as u16).to_le_bytes())?;
            writer.write_all(&header.data)?;
        }
        Ok(())
    }
}

fn legacy_transform_fields(
    kdf_params: &header_fields::KdfParams,
) -> impl Iterator<Item = HeaderField<OuterHeaderId>> {
    let header_fields::KdfParams::Aes { rounds, salt } = kdf_params;
    [
        HeaderField::new(OuterHeaderId::LegacyTransformSeed, salt.clone()),
        HeaderField::new(
            OuterHeaderId::LegacyTransformRounds,
            rounds.to_le_bytes().to_vec(),
        ),
    ]
    .into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_write_and_read() {
        let header = KdbxHeader::from_os_random();
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        buf.extend(crypto::sha256(&buf));

        let mut reader = buf.as_slice();
        let mut caching = utils::CachingReader::new(&mut reader);
        // Consume the header itself through the caching reader so the
        // trailing checksum lines up, mirroring how read.rs drives this.
        let mut parser = HeaderParser::new(&mut caching);
        let fields = parser.read_all_headers().unwrap();
        let mut builder = KdbxHeaderBuilder::default();
        for f in fields {
            builder.add_header(f).unwrap();
        }
        let rebuilt = builder.build().unwrap();

        assert_eq!(rebuilt.cipher, header.cipher);
        assert_eq!(rebuilt.master_seed, header.master_seed);
        assert_eq!(rebuilt.inner_stream_key, header.inner_stream_key);
    }
}
