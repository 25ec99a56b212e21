use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// The epoch (`0001-01-01T00:00:00`) KDBX4's base64-encoded timestamps count
/// seconds from
pub fn keepass_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Decode a UUID from a Keepass XML file
///
/// The UUID in Keepass XML files is stored base 64 encoded
pub fn decode_uuid(b64uuid: &str) -> Option<Uuid> {
    let decoded = BASE64_STANDARD.decode(b64uuid).ok()?;
    Uuid::from_slice(&decoded).ok()
}

pub(crate) fn decode_datetime_b64(b64date: &str) -> Option<NaiveDateTime> {
    let decoded = BASE64_STANDARD.decode(b64date).ok()?;
    let mut bytes = [0u8; 8];
    for i in 0..usize::min(bytes.len(), decoded.len()) {
        bytes[i] = decoded[i];
    }
    let timestamp = Duration::seconds(i64::from_le_bytes(bytes));

    keepass_epoch().checked_add_signed(timestamp)
}

/// Decode a Datetime from a Keepass XML file
///
/// This handles either ISO8601 date strings (as used in KDBX3)
/// or base64 encoded seconds since 1/1/1 00:00:00 as used in KDBX 4
pub fn decode_datetime(strdate: &str) -> Option<NaiveDateTime> {
    if strdate.contains('-') {
        let dt = DateTime::parse_from_rfc3339(strdate).ok()?;
        Some(dt.naive_utc())
    } else {
        decode_datetime_b64(strdate)
    }
}

pub(crate) fn encode_uuid(uuid: Uuid) -> String {
    BASE64_STANDARD.encode(uuid.as_bytes())
}

/// Encode a Datetime for a KDBX3 XML file
///
/// KDBX3 stores times as ISO8601 strings; the base64-encoded seconds form
/// `decode_datetime` also accepts is a KDBX4 convention, read-only here so
/// databases written by a KDBX4-aware client still parse.
pub(crate) fn encode_datetime(date: NaiveDateTime) -> String {
    DateTime::<chrono::Utc>::from_naive_utc_and_offset(date, chrono::Utc).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_round_trips_through_iso8601() {
        let original = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let encoded = encode_datetime(original);
        assert!(encoded.contains('-'));
        assert_eq!(decode_datetime(&encoded).unwrap(), original);
    }

    #[test]
    fn decode_accepts_kdbx4_base64_form_too() {
        let original = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let seconds = original
            .signed_duration_since(keepass_epoch())
            .num_seconds();
        let b64 = BASE64_STANDARD.encode(seconds.to_le_bytes());
        assert_eq!(decode_datetime(&b64).unwrap(), original);
    }

    #[test]
    fn uuid_round_trips() {
        let uuid = Uuid::new_v4();
        assert_eq!(decode_uuid(&encode_uuid(uuid)).unwrap(), uuid);
    }
}
