//! Header-only inspection (no unlock) and the inner-stream field protector's
//! document-order keystream guarantee.

use kdbx3core::binary::{Cipher, CompressionType, InnerStreamCipherAlgorithm, Kdbx};
use kdbx3core::types::{Entry, Field, Value};
use kdbx3core::{xml, CompositeKey, Database};

#[test]
fn open_exposes_header_before_unlock() {
    let mut kdbx = Kdbx::from_database(Database::default());
    kdbx.set_key(CompositeKey::from_password("hunter2")).unwrap();
    let mut bytes = Vec::new();
    kdbx.write(&mut bytes).unwrap();

    let locked = kdbx3core::from_reader(bytes.as_slice()).unwrap();
    assert_eq!(locked.major_version(), 3);
    assert_eq!(locked.header().cipher, Cipher::Aes256);
    assert_eq!(locked.header().compression_type, CompressionType::Gzip);
    assert_eq!(
        locked.header().inner_stream_cipher,
        InnerStreamCipherAlgorithm::Salsa20
    );
}

#[test]
fn protected_fields_unmask_in_document_order() {
    // Three protected text nodes of different lengths - a, bc, def - must
    // come back out exactly as written when the keystream is consumed in
    // document order.
    let mut db = Database::default();
    let mut entry = Entry::default();
    entry.add_field(Field {
        key: "One".to_string(),
        value: Value::Protected("a".to_string()),
    });
    entry.add_field(Field {
        key: "Two".to_string(),
        value: Value::Protected("bc".to_string()),
    });
    entry.add_field(Field {
        key: "Three".to_string(),
        value: Value::Protected("def".to_string()),
    });
    db.add_entry(entry);

    let inner_key = [0x55u8; 32];
    let mut write_cipher = InnerStreamCipherAlgorithm::Salsa20
        .stream_cipher(&inner_key)
        .unwrap();
    let mut xml_bytes = Vec::new();
    xml::write_xml(&mut xml_bytes, &db, write_cipher.as_mut()).unwrap();

    let mut read_cipher = InnerStreamCipherAlgorithm::Salsa20
        .stream_cipher(&inner_key)
        .unwrap();
    let parsed = xml::parse_xml(xml_bytes.as_slice(), read_cipher.as_mut()).unwrap();

    let entry = &parsed.groups[0].entries[0];
    assert_eq!(entry.find("One").unwrap().value, Value::Protected("a".into()));
    assert_eq!(entry.find("Two").unwrap().value, Value::Protected("bc".into()));
    assert_eq!(
        entry.find("Three").unwrap().value,
        Value::Protected("def".into())
    );
}

#[test]
fn arcfour_inner_cipher_round_trips_through_full_pipeline() {
    let mut kdbx = Kdbx::from_database(Database::default());
    kdbx.header_mut().inner_stream_cipher = InnerStreamCipherAlgorithm::ArcFour;
    let mut entry = Entry::default();
    entry.add_field(Field {
        key: "Password".to_string(),
        value: Value::Protected("arcfour-secret".to_string()),
    });
    kdbx.database_mut().add_entry(entry);
    kdbx.set_key(CompositeKey::from_password("hunter2")).unwrap();

    let mut bytes = Vec::new();
    kdbx.write(&mut bytes).unwrap();

    let unlocked = kdbx3core::from_reader(bytes.as_slice())
        .unwrap()
        .unlock(&CompositeKey::from_password("hunter2"))
        .unwrap();
    assert_eq!(
        unlocked.database().groups[0].entries[0].password(),
        Some("arcfour-secret")
    );
}
