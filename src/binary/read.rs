use super::{errors, header, Kdbx, Locked};
use crate::utils;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read a database from an input stream
///
/// The database starts locked, use [`Kdbx::unlock`] to unlock it.
pub fn from_reader<R: Read>(mut input: R) -> Result<Kdbx<Locked>, errors::OpenError> {
    let mut caching_reader = utils::CachingReader::new(&mut input);
    let mut buffer = [0u8; 4];
    caching_reader.read_exact(&mut buffer)?;

    if u32::from_le_bytes(buffer) != super::KEEPASS_MAGIC_NUMBER {
        return Err(errors::OpenError::NonKeepassFormat);
    }

    caching_reader.read_exact(&mut buffer)?;

    if u32::from_le_bytes(buffer) != super::KDBX_MAGIC_NUMBER {
        return Err(errors::OpenError::UnsupportedFileFormat);
    }

    caching_reader.read_exact(&mut buffer)?;

    let minor_version = u16::from_le_bytes([buffer[0], buffer[1]]);
    let major_version = u16::from_le_bytes([buffer[2], buffer[3]]);

    if major_version != 3 {
        return Err(errors::OpenError::UnsupportedMajorVersion(major_version));
    }

    let (header, header_data) = header::KdbxHeader::read(caching_reader)?;

    let mut encrypted_data = Vec::new();
    input.read_to_end(&mut encrypted_data)?;

    let state = Locked {
        header,
        header_data,
        major_version,
        minor_version,
        encrypted_data,
    };

    Ok(Kdbx { state })
}

/// Read a database from a given path
///
/// The database starts locked, use [`Kdbx::unlock`] to unlock it.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Kdbx<Locked>, errors::OpenError> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    from_reader(&mut file)
}
