//! JSON serialization adapter for records.
//!
//! The schema is strict: unknown fields are rejected instead of being
//! dropped, and decoded records are validated before they are handed back.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::model::Record;

/// Encode a single record as compact JSON.
pub fn to_json(record: &Record) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Decode a single record.
///
/// Fails with `Error::Parse` on malformed JSON or unknown fields and with
/// `Error::Validation` when a field breaks a record invariant.
pub fn from_json(text: &str) -> Result<Record> {
    let record: Record = serde_json::from_str(text)?;
    record.validate()?;
    Ok(record)
}

/// Decode import input: either a JSON array of records or a single record.
pub fn from_json_many(text: &str) -> Result<Vec<Record>> {
    let records: Vec<Record> = match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<serde_json::Result<_>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    for record in &records {
        record.validate()?;
    }
    Ok(records)
}

/// Encode a fallible stream of records as a JSON array.
///
/// The array is buffered; the first error aborts encoding and nothing
/// partial is returned.
pub fn to_json_array<I>(records: I) -> Result<String>
where
    I: IntoIterator<Item = Result<Record>>,
{
    let mut out = String::from("[");
    for (i, record) in records.into_iter().enumerate() {
        let record = record?;
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(&record)?);
    }
    out.push(']');
    Ok(out)
}

/// Encode any serializable report value (duplicate groups, history).
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::RecordId;
    use chrono::{TimeZone, Utc};

    fn sample_records() -> Vec<Record> {
        let when = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap();
        vec![
            Record::new(RecordId::new(1).unwrap(), "Alice"),
            Record::new(RecordId::new(2).unwrap(), "music/track 01.flac")
                .with_size(0)
                .with_hash("0123456789abcdef")
                .with_modified_at(when),
            Record::new(RecordId::new(i64::MAX).unwrap(), "ünïcödé \"quoted\"")
                .with_size(i64::MAX)
                .with_modified_at(when + chrono::Duration::nanoseconds(123_456_789)),
        ]
    }

    #[test]
    fn test_round_trip() {
        for record in sample_records() {
            let text = to_json(&record).unwrap();
            assert_eq!(from_json(&text).unwrap(), record);
        }
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = from_json(r#"{"id":1,"name":"Alice","colour":"red"}"#).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        for text in ["", "{", r#"{"id":"one","name":"x"}"#, r#"{"name":"x"}"#] {
            assert!(matches!(from_json(text).unwrap_err(), Error::Parse(_)), "{text}");
        }
    }

    #[test]
    fn test_invalid_field_is_validation_error() {
        let err = from_json(r#"{"id":1,"name":"x","size":-5}"#).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_array_encoding() {
        let records = sample_records();
        let text = to_json_array(records.iter().cloned().map(Ok)).unwrap();
        assert_eq!(from_json_many(&text).unwrap(), records);
        assert_eq!(to_json_array(std::iter::empty()).unwrap(), "[]");
    }

    #[test]
    fn test_array_encoding_stops_on_error() {
        let items = vec![
            Ok(Record::new(RecordId::new(1).unwrap(), "a")),
            Err(Error::Timeout("busy".to_string())),
        ];
        assert!(matches!(to_json_array(items), Err(Error::Timeout(_))));
    }

    #[test]
    fn test_many_accepts_single_object() {
        let records = from_json_many(r#"{"id":4,"name":"solo"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "solo");
    }
}
