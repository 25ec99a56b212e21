//! Wrong-credential and tamper-detection behaviour of `Kdbx::unlock`: a
//! wrong password must be rejected with the locked database handed back for
//! retry, and corrupting the encrypted body must be caught rather than
//! silently accepted or panicking.

use kdbx3core::binary::Kdbx;
use kdbx3core::errors::UnlockError;
use kdbx3core::{CompositeKey, Database};

fn sample_bytes(password: &str) -> Vec<u8> {
    let mut kdbx = Kdbx::from_database(Database::default());
    kdbx.set_key(CompositeKey::from_password(password)).unwrap();
    let mut out = Vec::new();
    kdbx.write(&mut out).unwrap();
    out
}

#[test]
fn wrong_password_is_rejected() {
    let bytes = sample_bytes("A");
    let locked = kdbx3core::from_reader(bytes.as_slice()).unwrap();
    let failed = locked.unlock(&CompositeKey::from_password("B")).unwrap_err();
    assert!(matches!(failed.1, UnlockError::BadPassword));
    // The locked database is returned back so a caller can retry.
    assert_eq!(failed.0.major_version(), 3);
}

#[test]
fn corrupted_ciphertext_past_the_header_fails() {
    let mut bytes = sample_bytes("hunter2");
    // Flip a byte well inside the encrypted body, past the header and its
    // checksum, so the outer CBC decryption itself still succeeds but the
    // hashed-block integrity check (or padding) catches the tamper.
    let tail = bytes.len() - 5;
    bytes[tail] ^= 0xFF;

    let locked = kdbx3core::from_reader(bytes.as_slice()).unwrap();
    let result = locked.unlock(&CompositeKey::from_password("hunter2"));
    assert!(result.is_err());
}

#[test]
fn truncated_file_is_an_io_error_not_a_panic() {
    let bytes = sample_bytes("hunter2");
    let truncated = &bytes[..bytes.len() / 2];
    let locked = kdbx3core::from_reader(truncated);
    // Truncation may be caught either while reading the header or once the
    // pipeline hits an unexpected end of stream during unlock - either is
    // an acceptable error, a panic is not.
    if let Ok(locked) = locked {
        assert!(locked.unlock(&CompositeKey::from_password("hunter2")).is_err());
    }
}

#[test]
fn rejects_database_with_no_credentials() {
    assert!(kdbx3core::CompositeKey::new(None, None).is_err());
}
