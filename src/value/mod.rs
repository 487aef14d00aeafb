//! Preference value model.
//!
//! A closed sum type for the values a preference domain can hold, plus the
//! conversion from the `plist` crate's tree. Keys of a [`Dictionary`] are kept
//! in sorted order so every walk over a domain is deterministic.

/// Simplicity checks and scalar string forms.
pub mod classify;
/// Recursive removal of binary data fields.
pub mod sanitize;

use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// A preference root or nested mapping.
pub type Dictionary = BTreeMap<String, Value>;

/// One preference value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    /// Wide enough for both signed and unsigned 64-bit plist integers.
    Integer(i128),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    /// Object reference found in keyed archives.
    Uid(u64),
}

impl Value {
    /// Short name of the variant, for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Data(_) => "data",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
            Value::Uid(_) => "uid",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Dictionary(_))
    }

    /// Convert a decoded plist value. Variants this model does not know
    /// about yield `None` and are dropped from their parent.
    pub fn from_plist(value: plist::Value) -> Option<Value> {
        let converted = match value {
            plist::Value::Boolean(b) => Value::Boolean(b),
            plist::Value::Integer(i) => Value::Integer(
                i.as_signed()
                    .map(i128::from)
                    .or_else(|| i.as_unsigned().map(i128::from))?,
            ),
            plist::Value::Real(f) => Value::Real(f),
            plist::Value::String(s) => Value::String(s),
            plist::Value::Data(bytes) => Value::Data(bytes),
            plist::Value::Date(date) => Value::Date(DateTime::<Utc>::from(SystemTime::from(date))),
            plist::Value::Array(items) => {
                Value::Array(items.into_iter().filter_map(Value::from_plist).collect())
            }
            plist::Value::Dictionary(dict) => Value::Dictionary(dictionary_from_plist(dict)),
            plist::Value::Uid(uid) => Value::Uid(uid.get()),
            _ => return None,
        };
        Some(converted)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Data(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Dictionary> for Value {
    fn from(dict: Dictionary) -> Self {
        Value::Dictionary(dict)
    }
}

fn dictionary_from_plist(dict: plist::Dictionary) -> Dictionary {
    dict.into_iter()
        .filter_map(|(key, value)| Value::from_plist(value).map(|v| (key, v)))
        .collect()
}

/// Parse a property list (binary or XML) into a preference root.
///
/// A document whose top level is not a dictionary yields an empty root.
pub fn parse_root(bytes: &[u8]) -> Result<Dictionary, plist::Error> {
    let value = plist::Value::from_reader(Cursor::new(bytes))?;
    Ok(match value {
        plist::Value::Dictionary(dict) => dictionary_from_plist(dict),
        _ => Dictionary::new(),
    })
}
