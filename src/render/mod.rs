//! Rendering of preference values as `defaults write` command lines.

/// Per-domain compilation of a preference root into script lines.
pub mod compile;

use std::borrow::Cow;

use serde::Serialize;

use crate::value::Value;
use crate::value::classify::{float_repr, is_simple, to_str};

/// Longest string (characters) or data (bytes) that is still emitted.
pub const MAX_VALUE_LENGTH: usize = 120;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S +0000";

/// Why a key that passed the filters produced no command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OmitReason {
    /// String or data longer than the length cap.
    Oversized,
    /// Array or dictionary with nested collections, dates or binary data.
    NotSimple,
    /// Key or value cannot be written as a shell word (NUL byte).
    Unquotable,
    /// No `defaults` type flag exists for the value.
    Unsupported,
}

impl OmitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            OmitReason::Oversized => "oversized",
            OmitReason::NotSimple => "not-simple",
            OmitReason::Unquotable => "unquotable",
            OmitReason::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Omission {
    pub domain: String,
    pub key: String,
    pub reason: OmitReason,
}

/// Renders single values with a configurable length cap.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    max_length: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(MAX_VALUE_LENGTH)
    }
}

impl Renderer {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Render `prefix key <flag> <value>` for one key.
    ///
    /// Arrays and dictionaries put their first element on the flag line and
    /// each following one on a continuation line aligned under it.
    pub fn render(&self, key: &str, value: &Value, prefix: &str) -> Result<String, OmitReason> {
        let qkey = quote(key)?;
        let line = match value {
            Value::Boolean(b) => format!("{prefix} {qkey} -bool {b}"),
            Value::Integer(i) => format!("{prefix} {qkey} -int {i}"),
            Value::Real(f) => format!("{prefix} {qkey} -float {}", quote(&float_repr(*f))?),
            Value::Data(bytes) => {
                if bytes.len() > self.max_length {
                    return Err(OmitReason::Oversized);
                }
                format!("{prefix} {qkey} -data {}", quote(&hex::encode(bytes))?)
            }
            Value::String(s) => {
                if s.chars().count() > self.max_length {
                    return Err(OmitReason::Oversized);
                }
                format!("{prefix} {qkey} -string {}", quote(s)?)
            }
            Value::Date(date) => {
                let formatted = date.format(DATE_FORMAT).to_string();
                format!("{prefix} {qkey} -date {}", quote(&formatted)?)
            }
            Value::Array(items) => {
                if !is_simple(items) {
                    return Err(OmitReason::NotSimple);
                }
                let words = items
                    .iter()
                    .map(quote_scalar)
                    .collect::<Result<Vec<_>, _>>()?;
                continued(prefix, &qkey, "-array", &words)
            }
            Value::Dictionary(dict) => {
                if !is_simple(dict.values()) {
                    return Err(OmitReason::NotSimple);
                }
                let pairs = dict
                    .iter()
                    .map(|(k, v)| -> Result<String, OmitReason> {
                        Ok(format!("{} {}", quote(k)?, quote_scalar(v)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                continued(prefix, &qkey, "-dict", &pairs)
            }
            Value::Uid(_) => return Err(OmitReason::Unsupported),
        };
        Ok(line)
    }
}

/// Lines for one key, rendered with the default length cap.
pub fn convert_value(key: &str, value: &Value, prefix: &str) -> Vec<String> {
    Renderer::default().render(key, value, prefix).into_iter().collect()
}

/// Quote one shell word.
pub fn quote(s: &str) -> Result<Cow<'_, str>, OmitReason> {
    shlex::try_quote(s).map_err(|_| OmitReason::Unquotable)
}

fn quote_scalar(value: &Value) -> Result<String, OmitReason> {
    let text = to_str(value).ok_or(OmitReason::NotSimple)?;
    Ok(quote(&text)?.into_owned())
}

/// Join words after `flag`, one per line, aligned under the first word.
fn continued<S: AsRef<str>>(prefix: &str, qkey: &str, flag: &str, words: &[S]) -> String {
    let head = format!("{prefix} {qkey} {flag}");
    if words.is_empty() {
        return head;
    }
    let width = prefix.chars().count() + 1 + qkey.chars().count() + 1 + flag.len() + 1;
    let separator = format!(" \\\n{}", " ".repeat(width));
    let body = words
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(&separator);
    format!("{head} {body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dictionary;
    use chrono::TimeZone;

    const PREFIX: &str = "defaults write domain";

    fn render(value: Value) -> Result<String, OmitReason> {
        Renderer::default().render("key", &value, PREFIX)
    }

    #[test]
    fn boolean() {
        assert_eq!(
            convert_value("key", &Value::Boolean(true), PREFIX),
            vec!["defaults write domain key -bool true"]
        );
    }

    #[test]
    fn integer_and_negative() {
        assert_eq!(render(Value::Integer(7)).unwrap(), format!("{PREFIX} key -int 7"));
        assert_eq!(render(Value::Integer(-7)).unwrap(), format!("{PREFIX} key -int -7"));
    }

    #[test]
    fn real() {
        assert_eq!(render(Value::Real(1.0)).unwrap(), format!("{PREFIX} key -float 1.0"));
    }

    #[test]
    fn string_is_quoted() {
        assert_eq!(
            render(Value::from("string 2")).unwrap(),
            format!("{PREFIX} key -string 'string 2'")
        );
    }

    #[test]
    fn empty_string() {
        assert_eq!(render(Value::from("")).unwrap(), format!("{PREFIX} key -string ''"));
    }

    #[test]
    fn data_is_zero_padded_hex() {
        assert_eq!(
            render(Value::Data(vec![0x00, 0x0f, 0xab])).unwrap(),
            format!("{PREFIX} key -data 000fab")
        );
    }

    #[test]
    fn string_length_boundary() {
        assert!(render(Value::from("a".repeat(120))).is_ok());
        assert_eq!(render(Value::from("a".repeat(121))), Err(OmitReason::Oversized));
    }

    #[test]
    fn string_length_counts_chars() {
        assert!(render(Value::from("é".repeat(120))).is_ok());
    }

    #[test]
    fn data_length_boundary() {
        assert!(render(Value::Data(vec![1; 120])).is_ok());
        assert_eq!(render(Value::Data(vec![1; 121])), Err(OmitReason::Oversized));
    }

    #[test]
    fn custom_cap() {
        let renderer = Renderer::new(3);
        assert!(renderer.render("k", &Value::from("abc"), PREFIX).is_ok());
        assert_eq!(
            renderer.render("k", &Value::from("abcd"), PREFIX),
            Err(OmitReason::Oversized)
        );
    }

    #[test]
    fn date_uses_24_hour_clock() {
        let date = chrono::Utc.with_ymd_and_hms(2023, 1, 1, 15, 4, 5).unwrap();
        assert_eq!(
            render(Value::Date(date)).unwrap(),
            format!("{PREFIX} key -date '2023-01-01 15:04:05 +0000'")
        );
    }

    #[test]
    fn array_continuation_alignment() {
        let value = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let expected = format!("{PREFIX} key -array 1 \\\n{}2", " ".repeat(33));
        assert_eq!(render(value).unwrap(), expected);
    }

    #[test]
    fn single_element_array() {
        let value = Value::Array(vec![Value::from("only one")]);
        assert_eq!(render(value).unwrap(), format!("{PREFIX} key -array 'only one'"));
    }

    #[test]
    fn empty_collections_render_bare_flag() {
        assert_eq!(render(Value::Array(vec![])).unwrap(), format!("{PREFIX} key -array"));
        assert_eq!(
            render(Value::Dictionary(Dictionary::new())).unwrap(),
            format!("{PREFIX} key -dict")
        );
    }

    #[test]
    fn dict_pairs_sorted_and_aligned() {
        let mut dict = Dictionary::new();
        dict.insert("b".into(), Value::Integer(2));
        dict.insert("a".into(), Value::from("x y"));
        let expected = format!("{PREFIX} key -dict a 'x y' \\\n{}b 2", " ".repeat(32));
        assert_eq!(render(Value::Dictionary(dict)).unwrap(), expected);
    }

    #[test]
    fn nested_array_not_simple() {
        let value = Value::Array(vec![Value::Array(vec![Value::Integer(1)])]);
        assert_eq!(render(value), Err(OmitReason::NotSimple));
    }

    #[test]
    fn utf8_data_in_array_renders_as_text() {
        let value = Value::Array(vec![Value::Data(b"hi".to_vec())]);
        assert_eq!(render(value).unwrap(), format!("{PREFIX} key -array hi"));
    }

    #[test]
    fn uid_is_unsupported() {
        assert_eq!(render(Value::Uid(1)), Err(OmitReason::Unsupported));
        assert!(convert_value("key", &Value::Uid(1), PREFIX).is_empty());
    }

    #[test]
    fn nul_is_unquotable() {
        assert_eq!(render(Value::from("a\0b")), Err(OmitReason::Unquotable));
        assert_eq!(
            Renderer::default().render("k\0", &Value::Boolean(true), PREFIX),
            Err(OmitReason::Unquotable)
        );
    }

    #[test]
    fn key_with_space_is_quoted() {
        let line = Renderer::default()
            .render("NSWindow Frame", &Value::Boolean(false), PREFIX)
            .unwrap();
        assert_eq!(line, format!("{PREFIX} 'NSWindow Frame' -bool false"));
    }
}
