use super::{errors, header, header_fields};
use crate::config::Config;
use crate::crypto;
use crate::stream;
use std::io::{Cursor, Read, Write};
use std::ops::{Deref, DerefMut};

/// Common operations available on a `Kdbx` regardless of whether it's
/// currently locked or unlocked
pub trait KdbxState: std::fmt::Debug {
    /// Encryption configuration and unencrypted custom data
    fn header(&self) -> &header::KdbxHeader;
    /// Mutable encryption configuration and unencrypted custom data
    fn header_mut(&mut self) -> &mut header::KdbxHeader;
    /// Major archive version - always 3 for a database this library can open
    fn major_version(&self) -> u16;
    /// Minor archive version
    fn minor_version(&self) -> u16;
    /// Write this archive's current state to the given output stream
    fn write<W: Write>(&self, output: W) -> Result<(), errors::WriteError>;
}

#[derive(Debug)]
/// A KeePass 2 archive wrapping a password database
///
/// Most methods are available on a specific state like `Kdbx<Locked>`
/// or `Kdbx<Unlocked>`.
///
/// A KeePass 2 archive can be obtained with [`kdbx3core::open`][crate::open]
/// or [`kdbx3core::from_reader`][crate::from_reader].
///
/// You can also create a password database using [`Database`][crate::Database],
/// then turn it into an archive using [`Kdbx::from_database`].
pub struct Kdbx<S>
where
    S: KdbxState,
{
    pub(super) state: S,
}

impl<T: KdbxState> Kdbx<T> {
    /// Encryption configuration and unencrypted custom data
    pub fn header(&self) -> &header::KdbxHeader {
        self.state.header()
    }

    /// Mutable encryption configuration and unencrypted custom data
    pub fn header_mut(&mut self) -> &mut header::KdbxHeader {
        self.state.header_mut()
    }

    /// Major archive version - always 3 for a database this library can open
    pub fn major_version(&self) -> u16 {
        self.state.major_version()
    }

    /// Minor archive version
    pub fn minor_version(&self) -> u16 {
        self.state.minor_version()
    }

    /// Write this archive to the given output stream
    pub fn write<W: Write>(&self, output: W) -> Result<(), errors::WriteError> {
        self.state.write(output)?;
        Ok(())
    }
}

/// Represents a failed attempt at unlocking a database
///
/// Includes the locked database and the reason the unlock failed, so a
/// caller can prompt for new credentials and retry without re-reading the
/// file. `FailedUnlock` also implements `Into<errors::UnlockError>` and
/// `Into<crate::Error>` for easy use with the `?` operator when retrying
/// isn't needed.
pub struct FailedUnlock(pub Kdbx<Locked>, pub errors::UnlockError);

impl From<FailedUnlock> for errors::UnlockError {
    fn from(failed: FailedUnlock) -> errors::UnlockError {
        failed.1
    }
}

#[derive(Debug)]
/// An unlocked kdbx file, allowing access to stored credentials
pub struct Unlocked {
    /// Header data of the kdbx archive, includes unencrypted metadata and
    /// the inner-stream cipher setup
    pub(crate) header: header::KdbxHeader,
    /// Minor version of the database file format
    pub(crate) minor_version: u16,
    /// Composed credentials, kept so a future `write()` can re-derive the
    /// master key without asking the caller again
    pub(crate) composed_key: Option<crypto::ComposedKey>,
    /// Master key used to key the outer cipher
    pub(crate) master_key: Option<crypto::MasterKey>,
    /// Raw decrypted XML, present only for databases loaded from a source
    pub(crate) xml_data: Option<Vec<u8>>,
    /// The password database itself
    pub(crate) database: crate::Database,
}

impl KdbxState for Unlocked {
    fn header(&self) -> &header::KdbxHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut header::KdbxHeader {
        &mut self.header
    }

    fn major_version(&self) -> u16 {
        3
    }

    fn minor_version(&self) -> u16 {
        self.minor_version
    }

    fn write<W: Write>(&self, mut output: W) -> Result<(), errors::WriteError> {
        let master_key = self
            .master_key
            .as_ref()
            .ok_or(errors::WriteError::MissingKeys)?;

        let mut header_buf = Vec::new();
        header_buf.extend_from_slice(&super::KEEPASS_MAGIC_NUMBER.to_le_bytes());
        header_buf.extend_from_slice(&super::KDBX_MAGIC_NUMBER.to_le_bytes());
        header_buf.extend_from_slice(&self.minor_version.to_le_bytes());
        header_buf.extend_from_slice(&3u16.to_le_bytes());
        self.header.write(&mut header_buf)?;

        output.write_all(&header_buf)?;
        output.write_all(&crypto::sha256(&header_buf))?;

        let cipher_key = master_key.cipher_key();
        let mut pipeline = stream::write_pipeline(
            output,
            cipher_key,
            self.header.cipher,
            &self.header.encryption_iv,
            self.header.compression_type,
            &self.header.stream_start_bytes,
        )?;
        let mut stream_cipher = self
            .header
            .inner_stream_cipher
            .stream_cipher(&self.header.inner_stream_key)
            .map_err(|_| {
                errors::WriteError::UnsupportedInnerStreamCipher(self.header.inner_stream_cipher)
            })?;
        crate::xml::write_xml(&mut pipeline, &self.database, stream_cipher.as_mut())?;
        pipeline.finish()?;
        Ok(())
    }
}

impl Kdbx<Unlocked> {
    /// Use the given composite key to encrypt the database on the next
    /// [`Kdbx::write`]
    pub fn set_key(&mut self, key: crypto::CompositeKey) -> Result<(), crypto::KeyGenerationError> {
        let composed_key = key.composed();
        let master_key = composed_key
            .transform(&self.header().kdf_params)?
            .master_key(&self.header().master_seed);
        self.state.composed_key = Some(composed_key);
        self.state.master_key = Some(master_key);
        Ok(())
    }

    /// Raw decrypted XML, for handling fields this library doesn't parse
    ///
    /// Only present for databases loaded from an existing source.
    pub fn raw_xml(&self) -> Option<&[u8]> {
        self.state.xml_data.as_deref()
    }

    /// The password database stored in this archive
    pub fn database(&self) -> &crate::Database {
        &self.state.database
    }

    /// Mutable access to the password database stored in this archive
    pub fn database_mut(&mut self) -> &mut crate::Database {
        &mut self.state.database
    }

    /// Build a new, empty archive around the given database
    ///
    /// Uses the OS secure RNG (via [`header::KdbxHeader::from_os_random`])
    /// to generate all required seeds and IVs, with the same defaults
    /// KeePass 2.x itself writes for new KDBX3 databases. You need to call
    /// [`Kdbx::set_key`] before the archive can be written.
    pub fn from_database(database: crate::Database) -> Kdbx<Unlocked> {
        Kdbx {
            state: Unlocked {
                header: header::KdbxHeader::from_os_random(),
                minor_version: 1,
                composed_key: None,
                master_key: None,
                xml_data: None,
                database,
            },
        }
    }
}

impl Deref for Kdbx<Unlocked> {
    type Target = crate::Database;

    fn deref(&self) -> &crate::Database {
        &self.state.database
    }
}

impl DerefMut for Kdbx<Unlocked> {
    fn deref_mut(&mut self) -> &mut crate::Database {
        &mut self.state.database
    }
}

#[derive(Debug, PartialEq, Eq)]
/// A locked kdbx file, use [`Kdbx::unlock`] to unlock
pub struct Locked {
    /// Header data of the kdbx archive, includes unencrypted metadata
    pub(crate) header: header::KdbxHeader,
    /// Raw bytes of the header, used to compute the checksum on write
    pub(crate) header_data: Vec<u8>,
    /// Major version of the database file format - always 3
    pub(crate) major_version: u16,
    /// Minor version of the database file format
    pub(crate) minor_version: u16,
    /// Encrypted vault data, everything after the header checksum
    pub(crate) encrypted_data: Vec<u8>,
}

impl KdbxState for Locked {
    fn header(&self) -> &header::KdbxHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut header::KdbxHeader {
        &mut self.header
    }

    fn major_version(&self) -> u16 {
        self.major_version
    }

    fn minor_version(&self) -> u16 {
        self.minor_version
    }

    fn write<W: Write>(&self, mut output: W) -> Result<(), errors::WriteError> {
        let mut header_buf = Vec::new();
        header_buf.extend_from_slice(&super::KEEPASS_MAGIC_NUMBER.to_le_bytes());
        header_buf.extend_from_slice(&super::KDBX_MAGIC_NUMBER.to_le_bytes());
        header_buf.extend_from_slice(&self.minor_version.to_le_bytes());
        header_buf.extend_from_slice(&self.major_version.to_le_bytes());
        self.header.write(&mut header_buf)?;
        output.write_all(&header_buf)?;
        output.write_all(&crypto::sha256(&header_buf))?;
        output.write_all(&self.encrypted_data)?;
        Ok(())
    }
}

impl Kdbx<Locked> {
    /// Unlocks the kdbx file using the default [`Config`]
    ///
    /// If unlock fails, returns the locked kdbx file along with the error so
    /// the caller can retry with different credentials.
    pub fn unlock(self, key: &crypto::CompositeKey) -> Result<Kdbx<Unlocked>, FailedUnlock> {
        self.unlock_with_config(key, Config::default())
    }

    /// Unlocks the kdbx file, tuning the streaming pipeline's inter-stage
    /// buffer size and maximum accepted hashed-block frame size
    pub fn unlock_with_config(
        self,
        key: &crypto::CompositeKey,
        config: Config,
    ) -> Result<Kdbx<Unlocked>, FailedUnlock> {
        let cipher = self.state.header.cipher;
        if cipher != header_fields::Cipher::Aes256 {
            let uuid = uuid::Uuid::from(cipher);
            return Err(FailedUnlock(self, errors::UnlockError::UnsupportedCipher(uuid)));
        }

        let composed_key = key.composed();
        let master_key = match composed_key
            .transform(&self.state.header.kdf_params)
            .map(|transformed| transformed.master_key(&self.state.header.master_seed))
        {
            Ok(master_key) => master_key,
            Err(e) => return Err(FailedUnlock(self, errors::UnlockError::from(e))),
        };

        match self.decrypt_and_parse(&master_key, config) {
            Ok((data, db)) => Ok(Kdbx {
                state: Unlocked {
                    header: self.state.header,
                    minor_version: self.state.minor_version,
                    composed_key: Some(composed_key),
                    master_key: Some(master_key),
                    database: db,
                    xml_data: Some(data),
                },
            }),
            Err(e) => Err(FailedUnlock(self, e)),
        }
    }

    fn decrypt_and_parse(
        &self,
        master_key: &crypto::MasterKey,
        config: Config,
    ) -> Result<(Vec<u8>, crate::Database), errors::UnlockError> {
        let cipher_key = master_key.cipher_key();
        let header = &self.state.header;
        let mut pipeline = stream::spawn_read_pipeline(
            Cursor::new(self.state.encrypted_data.clone()),
            cipher_key,
            header.cipher,
            header.encryption_iv.clone(),
            header.compression_type,
            header.stream_start_bytes.clone(),
            config,
        );
        let mut data = Vec::new();
        pipeline.read_to_end(&mut data)?;

        let mut stream_cipher = header
            .inner_stream_cipher
            .stream_cipher(&header.inner_stream_key)
            .map_err(|_| {
                errors::UnlockError::UnsupportedInnerStreamCipher(header.inner_stream_cipher)
            })?;
        let database = crate::xml::parse_xml(data.as_slice(), stream_cipher.as_mut())?;
        Ok((data, database))
    }
}
