//! End to end round trips through the full write/read pipeline - no static
//! fixture files, everything is generated and reloaded within the test.

use kdbx3core::binary::{CompressionType, Kdbx};
use kdbx3core::types::{Entry, Field, Group, Value};
use kdbx3core::{CompositeKey, Database};

const DATABASE_NAME: &str = "BarName";
const DATABASE_DESC: &str = "BazDesc";
const GROUP_NAME: &str = "FooGroup";
const ENTRY_PASSWORD: &str = "kdbxrs";
const DATABASE_PASSWORD: &str = "blahblahblah";

fn sample_database() -> Database {
    let mut db = Database::default();
    db.set_name(DATABASE_NAME);
    db.set_description(DATABASE_DESC);

    let mut group = Group::default();
    group.name = GROUP_NAME.to_string();

    let mut entry = Entry::default();
    entry.add_field(Field::new("Title", "Bar"));
    entry.add_field(Field {
        key: "Password".to_string(),
        value: Value::Protected(ENTRY_PASSWORD.to_string()),
    });
    group.add_entry(entry);
    db.groups.push(group);
    db
}

fn written_bytes(db: Database, key: CompositeKey) -> Vec<u8> {
    let mut kdbx = Kdbx::from_database(db);
    kdbx.set_key(key).unwrap();
    let mut out = Vec::new();
    kdbx.write(&mut out).unwrap();
    out
}

#[test]
fn roundtrip_minimal_password_only() {
    let bytes = written_bytes(
        sample_database(),
        CompositeKey::from_password(DATABASE_PASSWORD),
    );

    let locked = kdbx3core::from_reader(bytes.as_slice()).unwrap();
    let unlocked = locked
        .unlock(&CompositeKey::from_password(DATABASE_PASSWORD))
        .unwrap();

    let db = unlocked.database();
    assert_eq!(db.name(), DATABASE_NAME);
    assert_eq!(db.description(), DATABASE_DESC);
    let group = &db.groups[0];
    assert_eq!(group.name, GROUP_NAME);
    let entry = &group.entries[0];
    assert_eq!(entry.title(), Some("Bar"));
    assert_eq!(entry.password(), Some(ENTRY_PASSWORD));
    assert!(matches!(
        entry.find("Password").unwrap().value,
        Value::Protected(_)
    ));
}

#[test]
fn roundtrip_preserves_protected_field_exactly() {
    // A protected value round trips through base64 + inner stream cipher
    // masking on write and unmasking on read without corruption.
    let mut db = Database::default();
    let mut entry = Entry::default();
    entry.add_field(Field {
        key: "Notes".to_string(),
        value: Value::Protected("correct horse battery staple".to_string()),
    });
    db.add_entry(entry);

    let bytes = written_bytes(db, CompositeKey::from_password("hunter2"));
    let unlocked = kdbx3core::from_reader(bytes.as_slice())
        .unwrap()
        .unlock(&CompositeKey::from_password("hunter2"))
        .unwrap();

    let entry = &unlocked.database().groups[0].entries[0];
    assert_eq!(
        entry.find("Notes").unwrap().value,
        Value::Protected("correct horse battery staple".to_string())
    );
}

#[test]
fn roundtrip_with_gzip_compression() {
    let mut kdbx = Kdbx::from_database(sample_database());
    kdbx.header_mut().compression_type = CompressionType::Gzip;
    kdbx.set_key(CompositeKey::from_password(DATABASE_PASSWORD))
        .unwrap();

    let mut out = Vec::new();
    kdbx.write(&mut out).unwrap();

    let unlocked = kdbx3core::from_reader(out.as_slice())
        .unwrap()
        .unlock(&CompositeKey::from_password(DATABASE_PASSWORD))
        .unwrap();
    assert_eq!(unlocked.database().name(), DATABASE_NAME);
}

#[test]
fn compression_shrinks_repetitive_payloads() {
    let mut db = sample_database();
    let mut entry = Entry::default();
    entry.add_field(Field {
        key: "Notes".to_string(),
        value: Value::Standard("x".repeat(200_000)),
    });
    db.groups[0].add_entry(entry);

    let mut uncompressed = Kdbx::from_database(db.clone());
    uncompressed.header_mut().compression_type = CompressionType::None;
    uncompressed
        .set_key(CompositeKey::from_password(DATABASE_PASSWORD))
        .unwrap();
    let mut plain_bytes = Vec::new();
    uncompressed.write(&mut plain_bytes).unwrap();

    let mut compressed = Kdbx::from_database(db);
    compressed.header_mut().compression_type = CompressionType::Gzip;
    compressed
        .set_key(CompositeKey::from_password(DATABASE_PASSWORD))
        .unwrap();
    let mut gzip_bytes = Vec::new();
    compressed.write(&mut gzip_bytes).unwrap();

    assert!(gzip_bytes.len() < plain_bytes.len() / 10);

    let unlocked = kdbx3core::from_reader(gzip_bytes.as_slice())
        .unwrap()
        .unlock(&CompositeKey::from_password(DATABASE_PASSWORD))
        .unwrap();
    assert_eq!(
        unlocked.database().groups[0].entries[1].find("Notes").unwrap().value,
        Value::Standard("x".repeat(200_000))
    );
}

#[test]
fn roundtrip_with_key_file_only() {
    let key_file = [0x42u8; 32];
    let bytes = written_bytes(
        sample_database(),
        CompositeKey::new(None, Some(&key_file)).unwrap(),
    );

    let unlocked = kdbx3core::from_reader(bytes.as_slice())
        .unwrap()
        .unlock(&CompositeKey::new(None, Some(&key_file)).unwrap())
        .unwrap();
    assert_eq!(unlocked.database().name(), DATABASE_NAME);
}

#[test]
fn roundtrip_with_password_and_key_file() {
    let key_file = [0x07u8; 32];
    let key = || CompositeKey::new(Some(DATABASE_PASSWORD), Some(&key_file)).unwrap();
    let bytes = written_bytes(sample_database(), key());

    let unlocked = kdbx3core::from_reader(bytes.as_slice())
        .unwrap()
        .unlock(&key())
        .unwrap();
    assert_eq!(unlocked.database().name(), DATABASE_NAME);

    // Password alone, without the key file, must not unlock it.
    let locked_again = kdbx3core::from_reader(bytes.as_slice()).unwrap();
    assert!(locked_again
        .unlock(&CompositeKey::from_password(DATABASE_PASSWORD))
        .is_err());
}
