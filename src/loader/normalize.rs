//! Field normalization applied to every mapped value before insert.

use std::fmt;

use bytes::BytesMut;
use serde::{Serialize, Serializer};
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};

/// Tokens treated as SQL NULL when blank-to-null conversion is on.
/// Matched case-insensitively against the trimmed value.
const NULL_TOKENS: &[&str] = &["null", "none", "n/a", "na", "."];

/// A field value after normalization, as it will be sent to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedValue {
    /// SQL NULL.
    Null,
    /// A boolean-like literal collapsed to -1 (true) or 0 (false).
    Flag(i16),
    /// Any other value, whitespace-trimmed.
    Text(String),
}

/// Normalize one raw field.
///
/// Non-breaking spaces become ordinary spaces and surrounding whitespace is
/// trimmed. The literals `true`/`false` (any case) collapse to flags before
/// blank handling, so `null_blank` never turns them into NULL. With
/// `null_blank` set, empty values, quote pairs (`""`, `''`) and the
/// [`NULL_TOKENS`] placeholders become [`NormalizedValue::Null`]. A field
/// missing from a short row is NULL regardless.
pub fn normalize(raw: Option<&str>, null_blank: bool) -> NormalizedValue {
    let Some(raw) = raw else {
        return NormalizedValue::Null;
    };

    let v = raw.replace('\u{a0}', " ");
    let v = v.trim();
    let lower = v.to_lowercase();

    if lower == "true" {
        return NormalizedValue::Flag(-1);
    }
    if lower == "false" {
        return NormalizedValue::Flag(0);
    }

    if null_blank && (v.is_empty() || v == "\"\"" || v == "''" || NULL_TOKENS.contains(&lower.as_str())) {
        return NormalizedValue::Null;
    }

    NormalizedValue::Text(v.to_string())
}

impl NormalizedValue {
    /// Key text for duplicate detection, matching the wire text of the value.
    /// NULL has no text so it keys as `None`.
    pub fn as_key(&self) -> Option<String> {
        match self {
            NormalizedValue::Null => None,
            NormalizedValue::Flag(f) => Some(f.to_string()),
            NormalizedValue::Text(t) => Some(t.clone()),
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Null => f.write_str("NULL"),
            NormalizedValue::Flag(v) => write!(f, "{v}"),
            NormalizedValue::Text(t) => f.write_str(t),
        }
    }
}

/// Every value is sent in text format and cast by the server, so one Rust
/// type can feed columns of any PostgreSQL type the target table declares.
impl ToSql for NormalizedValue {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            NormalizedValue::Null => Ok(IsNull::Yes),
            NormalizedValue::Flag(v) => {
                out.extend_from_slice(v.to_string().as_bytes());
                Ok(IsNull::No)
            }
            NormalizedValue::Text(t) => {
                out.extend_from_slice(t.as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

impl Serialize for NormalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NormalizedValue::Null => serializer.serialize_unit(),
            NormalizedValue::Flag(v) => serializer.serialize_i16(*v),
            NormalizedValue::Text(t) => serializer.serialize_str(t),
        }
    }
}
