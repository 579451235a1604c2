//! Conversion between in-memory attribute values and the form a table store
//! accepts.

use super::reference::FKEY_EMPTY_STRING;
use crate::core::{Item, MapperError, Result, Value};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Text form of timestamps in stored rows.
pub const DATETIME_FORMAT: &str = "datetime:%Y-%m-%dT%H:%M:%S%.6fZ";
const DATETIME_PARSE_FORMAT: &str = "datetime:%Y-%m-%dT%H:%M:%S%.fZ";
const DATETIME_PREFIX: &str = "datetime:";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if !text.starts_with(DATETIME_PREFIX) {
        return None;
    }
    NaiveDateTime::parse_from_str(text, DATETIME_PARSE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Recursively rewrites a value so the store will accept it.
///
/// Empty strings become the sentinel, floats become exact decimal text and
/// timestamps become `datetime:` text. NaN and infinities are rejected.
pub fn to_store_safe(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Text(s) if s.is_empty() => Value::Text(FKEY_EMPTY_STRING.to_string()),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(MapperError::Validation(format!(
                    "non-finite number {} cannot be stored",
                    f
                )));
            }
            Value::Decimal(f.to_string())
        }
        Value::Timestamp(ts) => Value::Text(format_timestamp(ts)),
        Value::List(items) => Value::List(items.iter().map(to_store_safe).collect::<Result<_>>()?),
        Value::Map(map) => Value::Map(item_to_store_safe(map)?),
        other => other.clone(),
    })
}

pub fn item_to_store_safe(item: &Item) -> Result<Item> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), to_store_safe(value)?)))
        .collect()
}

/// Undoes the constant substitutions made by [`to_store_safe`].
pub fn restore_constants(value: Value) -> Value {
    match value {
        Value::Text(s) if s == FKEY_EMPTY_STRING => Value::Text(String::new()),
        Value::List(items) => Value::List(items.into_iter().map(restore_constants).collect()),
        Value::Map(map) => Value::Map(restore_item(map)),
        other => other,
    }
}

pub fn restore_item(item: Item) -> Item {
    item.into_iter()
        .map(|(name, value)| (name, restore_constants(value)))
        .collect()
}

/// Read-side conversion of a single attribute: `datetime:` text comes back as
/// a timestamp.
pub fn revive(value: &Value) -> Value {
    if let Value::Text(text) = value
        && let Some(ts) = parse_timestamp(text)
    {
        return Value::Timestamp(ts);
    }
    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_store_safe_nested() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let mut inner = Item::new();
        inner.insert("blank".into(), Value::from(""));
        inner.insert("ratio".into(), Value::Float(0.25));
        let value = Value::List(vec![Value::Map(inner), Value::Timestamp(ts)]);

        let safe = to_store_safe(&value).unwrap();
        let Value::List(items) = &safe else {
            panic!("expected list, got {:?}", safe)
        };
        let Value::Map(map) = &items[0] else {
            panic!("expected map")
        };
        assert_eq!(map["blank"], Value::from(FKEY_EMPTY_STRING));
        assert_eq!(map["ratio"], Value::Decimal("0.25".into()));
        assert_eq!(items[1], Value::from("datetime:2024-03-01T12:30:05.000000Z"));

        let restored = restore_constants(safe);
        let Value::List(items) = restored else {
            panic!("expected list")
        };
        let Value::Map(map) = &items[0] else {
            panic!("expected map")
        };
        assert_eq!(map["blank"], Value::from(""));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(matches!(
            to_store_safe(&Value::Float(f64::NAN)),
            Err(MapperError::Validation(_))
        ));
    }

    #[test]
    fn test_timestamp_text_revives() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let text = Value::Text(format_timestamp(&ts));
        assert_eq!(revive(&text), Value::Timestamp(ts));
        assert_eq!(revive(&Value::from("datetime:nope")), Value::from("datetime:nope"));
    }
}
