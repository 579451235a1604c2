use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A flat attribute map: one row of a table.
pub type Item = BTreeMap<String, Value>;

/// Attribute value as seen by callers and by table stores.
///
/// `Float` and `Timestamp` only live in memory; before a write they are turned
/// into `Decimal` and `Text` by [`crate::codec::safe`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal text, the store-native number form.
    Decimal(String),
    Text(String),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

const TAG_DECIMAL: &str = "$decimal";
const TAG_BINARY: &str = "$binary";
const TAG_DATETIME: &str = "$datetime";
const TAG_FLOAT: &str = "$float";

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Int(_) => "INT",
            Self::Float(_) => "FLOAT",
            Self::Decimal(_) => "DECIMAL",
            Self::Text(_) => "TEXT",
            Self::Binary(_) => "BINARY",
            Self::Timestamp(_) => "TIMESTAMP",
            Self::List(_) => "LIST",
            Self::Map(_) => "MAP",
        }
    }

    /// Compares two values of compatible types.
    ///
    /// Numbers compare across `Int`, `Float` and `Decimal`. Returns `None`
    /// for incompatible types, which conditions treat as "false".
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.as_f64()?, b.as_f64()?);
                a.partial_cmp(&b)
            }
            _ => None,
        }
    }

    /// Total order used to lay rows out by key.
    ///
    /// Values of different kinds order by kind; comparable values by
    /// [`Value::compare`].
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match self.compare(other) {
            Some(ordering) => ordering,
            None => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) | Self::Decimal(_) => 2,
            Self::Text(_) => 3,
            Self::Binary(_) => 4,
            Self::Timestamp(_) => 5,
            Self::List(_) => 6,
            Self::Map(_) => 7,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_) | Self::Decimal(_))
    }

    /// Null and zero-length values do not satisfy a required attribute.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) | Self::Decimal(s) => s.is_empty(),
            Self::Binary(b) => b.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            Self::Decimal(d) => d.parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Decimal(d) => d.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// JSON rendering used by the reference and pagination codecs.
    ///
    /// Kinds that JSON cannot tell apart are wrapped in a single-key object
    /// (`{"$decimal": "1.50"}`), so [`Value::from_json`] restores them exactly.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => Json::Number(n),
                None => tagged(TAG_FLOAT, f.to_string()),
            },
            Self::Decimal(d) => tagged(TAG_DECIMAL, d.clone()),
            Self::Text(s) => Json::String(s.clone()),
            Self::Binary(b) => tagged(TAG_BINARY, BASE64.encode(b)),
            Self::Timestamp(ts) => tagged(TAG_DATETIME, ts.to_rfc3339()),
            Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::Text(s.clone()),
            Json::Array(items) => Self::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => {
                if let Some(value) = untag(map) {
                    return value;
                }
                Self::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

fn tagged(tag: &str, payload: String) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(tag.to_string(), serde_json::Value::String(payload));
    serde_json::Value::Object(map)
}

fn untag(map: &serde_json::Map<String, serde_json::Value>) -> Option<Value> {
    if map.len() != 1 {
        return None;
    }
    let (tag, payload) = map.iter().next()?;
    let payload = payload.as_str()?;
    match tag.as_str() {
        TAG_DECIMAL => Some(Value::Decimal(payload.to_string())),
        TAG_BINARY => BASE64.decode(payload).ok().map(Value::Binary),
        TAG_DATETIME => DateTime::parse_from_rfc3339(payload)
            .ok()
            .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
        TAG_FLOAT => payload.parse::<f64>().ok().map(Value::Float),
        _ => None,
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Text(s) => write!(f, "{}", s),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::List(_) | Self::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison_across_kinds() {
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(
            Value::Decimal("10".into()).compare(&Value::Int(10)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Text("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_json_keeps_ambiguous_kinds_apart() {
        let mut nested = BTreeMap::new();
        nested.insert("d".to_string(), Value::Decimal("1.50".into()));
        nested.insert("b".to_string(), Value::Binary(vec![0, 255, 7]));
        nested.insert("f".to_string(), Value::Float(1.0));
        nested.insert("i".to_string(), Value::Int(1));
        let value = Value::Map(nested);

        assert_eq!(Value::from_json(&value.to_json()), value);
    }

    #[test]
    fn test_empty_values() {
        assert!(Value::Null.is_empty_value());
        assert!(Value::Text(String::new()).is_empty_value());
        assert!(!Value::Int(0).is_empty_value());
        assert!(!Value::Bool(false).is_empty_value());
    }
}
