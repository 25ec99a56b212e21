//! Parsing for KeePass keyfiles
//!
//! A keyfile can take four shapes: the XML v1 form (a base64-encoded 32-byte
//! key), the XML v2 form (a hex-encoded 32-byte key with a truncated SHA-256
//! checksum attribute), a plain 64-character hex file, or a raw 32-byte
//! binary file. Anything else is hashed with SHA-256 and used as-is, which
//! is what KeePass itself does for an arbitrary file picked as a keyfile.

use crate::safebuf::SafeVec;
use base64::prelude::{Engine, BASE64_STANDARD};
use sha2::{Digest, Sha256};
use thiserror::Error;
use xml::reader::{EventReader, XmlEvent};

#[derive(Debug, Error)]
/// Errors parsing a keyfile
pub enum KeyFileError {
    /// The file looked like an XML keyfile but could not be parsed as XML
    #[error("Malformed keyfile XML - {0}")]
    Xml(#[from] xml::reader::Error),
    /// The `<Key><Data>` element was missing or empty
    #[error("Keyfile XML is missing a Key/Data element")]
    MissingKey,
    /// The key data itself could not be decoded
    #[error("Keyfile key data is not validly encoded")]
    MalformedData,
    /// The v2 keyfile's data did not match its Hash attribute
    #[error("Keyfile key data does not match its checksum")]
    ChecksumMismatch,
}

/// Turn the raw bytes of a keyfile into the 32-byte digest used as a
/// [`crate::crypto::CompositeKey`] factor
pub(crate) fn key_file_digest(contents: &[u8]) -> Result<SafeVec, KeyFileError> {
    let trimmed = trim_ascii_whitespace(contents);

    if looks_like_xml(trimmed) {
        return parse_xml_keyfile(contents);
    }

    if trimmed.len() == 64 && trimmed.iter().all(u8::is_ascii_hexdigit) {
        if let Ok(key) = decode_hex(trimmed) {
            return Ok(SafeVec::new(key));
        }
    }

    if contents.len() == 32 {
        return Ok(SafeVec::new(contents.to_vec()));
    }

    Ok(SafeVec::new(Sha256::digest(contents).to_vec()))
}

fn looks_like_xml(trimmed: &[u8]) -> bool {
    trimmed.starts_with(b"<?xml") || trimmed.starts_with(b"<KeyFile")
}

fn parse_xml_keyfile(contents: &[u8]) -> Result<SafeVec, KeyFileError> {
    let parser = EventReader::new(contents);
    let mut in_data = false;
    let mut hash_attr = None;
    let mut data_text = String::new();

    for event in parser {
        match event? {
            XmlEvent::StartElement {
                name, attributes, ..
            } if name.local_name == "Data" => {
                in_data = true;
                hash_attr = attributes
                    .iter()
                    .find(|a| a.name.local_name == "Hash")
                    .map(|a| a.value.clone());
            }
            XmlEvent::Characters(text) if in_data => data_text.push_str(&text),
            XmlEvent::EndElement { name } if name.local_name == "Data" => break,
            _ => {}
        }
    }

    let cleaned: String = data_text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(KeyFileError::MissingKey);
    }

    let key = match hash_attr {
        // v2: hex-encoded key, checked against a truncated SHA-256 hash
        Some(expected_hash_hex) => {
            let key = decode_hex(cleaned.as_bytes()).map_err(|_| KeyFileError::MalformedData)?;
            let expected_hash =
                decode_hex(expected_hash_hex.as_bytes()).map_err(|_| KeyFileError::MalformedData)?;
            let actual_hash = Sha256::digest(&key);
            if expected_hash.is_empty() || actual_hash[..expected_hash.len()] != expected_hash[..] {
                return Err(KeyFileError::ChecksumMismatch);
            }
            key
        }
        // v1: base64-encoded key, used directly with no integrity check
        None => BASE64_STANDARD
            .decode(cleaned)
            .map_err(|_| KeyFileError::MalformedData)?,
    };

    Ok(SafeVec::new(key))
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 {
        return Err(());
    }
    hex.chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).ok_or(())?;
            let lo = (pair[1] as char).to_digit(16).ok_or(())?;
            Ok((hi as u8) << 4 | lo as u8)
        })
        .collect()
}

fn trim_ascii_whitespace(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(0, |p| p + 1);
    &data[start..end.max(start)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_32_byte_keyfile_used_as_is() {
        let key = [0x42u8; 32];
        let digest = key_file_digest(&key).unwrap();
        assert_eq!(&*digest, &key[..]);
    }

    #[test]
    fn hex_keyfile_decodes_to_raw_key() {
        let raw = [0x09u8; 32];
        let hex: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
        let digest = key_file_digest(hex.as_bytes()).unwrap();
        assert_eq!(&*digest, &raw[..]);
    }

    #[test]
    fn other_files_are_hashed() {
        let contents = b"not a keyfile at all, just some notes";
        let digest = key_file_digest(contents).unwrap();
        assert_eq!(&*digest, &Sha256::digest(contents)[..]);
    }

    #[test]
    fn v1_xml_keyfile_decodes_base64_data() {
        let raw = [0x07u8; 32];
        let xml = format!(
            "<?xml version=\"1.0\"?><KeyFile><Key><Data>{}</Data></Key></KeyFile>",
            BASE64_STANDARD.encode(raw)
        );
        let digest = key_file_digest(xml.as_bytes()).unwrap();
        assert_eq!(&*digest, &raw[..]);
    }

    #[test]
    fn v2_xml_keyfile_validates_checksum() {
        let raw = [0x11u8; 32];
        let hash = Sha256::digest(raw);
        let hash_hex: String = hash[..4].iter().map(|b| format!("{:02X}", b)).collect();
        let key_hex: String = raw.iter().map(|b| format!("{:02X}", b)).collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><KeyFile><Meta><Version>2.0</Version></Meta><Key><Data Hash=\"{}\">{}</Data></Key></KeyFile>",
            hash_hex, key_hex
        );
        let digest = key_file_digest(xml.as_bytes()).unwrap();
        assert_eq!(&*digest, &raw[..]);
    }

    #[test]
    fn v2_xml_keyfile_rejects_bad_checksum() {
        let raw = [0x11u8; 32];
        let key_hex: String = raw.iter().map(|b| format!("{:02X}", b)).collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><KeyFile><Key><Data Hash=\"DEADBEEF\">{}</Data></Key></KeyFile>",
            key_hex
        );
        assert!(matches!(
            key_file_digest(xml.as_bytes()),
            Err(KeyFileError::ChecksumMismatch)
        ));
    }
}
