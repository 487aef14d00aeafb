use super::Value;

/// True when every element can be written as one flat shell argument.
///
/// Nested collections, dates, uids, and data that is not UTF-8 text make a
/// container ineligible for `-array`/`-dict` rendering. An empty container
/// is simple.
pub fn is_simple<'a, I>(values: I) -> bool
where
    I: IntoIterator<Item = &'a Value>,
{
    values.into_iter().all(|value| match value {
        Value::Array(_) | Value::Dictionary(_) | Value::Date(_) | Value::Uid(_) => false,
        Value::Data(bytes) => can_decode_utf8(bytes),
        Value::Boolean(_) | Value::Integer(_) | Value::Real(_) | Value::String(_) => true,
    })
}

pub fn can_decode_utf8(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok()
}

/// String form of a scalar, as used for array elements and dict pairs.
///
/// Data decodes as UTF-8 text, falling back to lowercase hex. Returns `None`
/// for collections, dates and uids.
pub fn to_str(value: &Value) -> Option<String> {
    match value {
        Value::Boolean(b) => Some(b.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(float_repr(*f)),
        Value::String(s) => Some(s.clone()),
        Value::Data(bytes) => Some(match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => hex::encode(bytes),
        }),
        Value::Date(_) | Value::Uid(_) | Value::Array(_) | Value::Dictionary(_) => None,
    }
}

/// Shortest round-trip decimal form. Integral values keep a trailing `.0`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let mut repr = f.to_string();
    if !repr.contains('.') {
        repr.push_str(".0");
    }
    repr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dictionary;
    use chrono::TimeZone;

    #[test]
    fn empty_is_simple() {
        assert!(is_simple(&Vec::<Value>::new()));
        assert!(is_simple(Dictionary::new().values()));
    }

    #[test]
    fn scalars_are_simple() {
        let values = vec![
            Value::Boolean(true),
            Value::Integer(-3),
            Value::Real(0.5),
            Value::from("text"),
            Value::Data(b"utf8".to_vec()),
        ];
        assert!(is_simple(&values));
    }

    #[test]
    fn nested_collections_are_not_simple() {
        assert!(!is_simple(&vec![Value::Array(vec![])]));
        assert!(!is_simple(&vec![Value::Dictionary(Dictionary::new())]));
    }

    #[test]
    fn dates_and_uids_are_not_simple() {
        let date = chrono::Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_simple(&vec![Value::Date(date)]));
        assert!(!is_simple(&vec![Value::Uid(1)]));
    }

    #[test]
    fn binary_data_is_not_simple() {
        assert!(!is_simple(&vec![Value::Data(vec![0xff, 0xfe])]));
    }

    #[test]
    fn to_str_forms() {
        assert_eq!(to_str(&Value::Boolean(false)).as_deref(), Some("false"));
        assert_eq!(to_str(&Value::Integer(42)).as_deref(), Some("42"));
        assert_eq!(to_str(&Value::Real(2.0)).as_deref(), Some("2.0"));
        assert_eq!(to_str(&Value::from("x y")).as_deref(), Some("x y"));
        assert_eq!(to_str(&Value::Data(b"abc".to_vec())).as_deref(), Some("abc"));
        assert_eq!(
            to_str(&Value::Data(vec![0xff, 0x01])).as_deref(),
            Some("ff01")
        );
        assert_eq!(to_str(&Value::Array(vec![])), None);
        assert_eq!(to_str(&Value::Uid(3)), None);
    }

    #[test]
    fn float_forms() {
        assert_eq!(float_repr(1.5), "1.5");
        assert_eq!(float_repr(-2.0), "-2.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(f64::NAN), "nan");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(f64::NEG_INFINITY), "-inf");
    }
}
