// crates/survey-deploy-core/src/model/extended_json.rs
// ============================================================================
// Module: Extended JSON Dialect
// Description: JSON superset with date/time, object id, and binary literals.
// Purpose: Parse untrusted filter/sort/projection strings into typed trees.
// Dependencies: base64, serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Submission filters arrive as JSON text that may embed typed literals using
//! single-purpose wrapper objects (`{"$date": ...}`, `{"$oid": ...}`,
//! `{"$binary": ...}`, `{"$uuid": ...}`, `{"$numberLong": ...}`). Parsing
//! converts wrappers into [`ExtendedValue`] variants and leaves every other
//! object, including query operators such as `{"$gt": 1}`, untouched.
//! Object key order is preserved because sort specifications depend on it.
//!
//! Malformed wrappers are parse failures, never silently passed through.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Binary subtype used for UUID literals.
pub const BINARY_SUBTYPE_UUID: u8 = 0x04;
/// Object id length in bytes.
const OBJECT_ID_LEN: usize = 12;
/// UUID length in bytes.
const UUID_LEN: usize = 16;
/// Nanoseconds per millisecond.
const NANOS_PER_MILLI: i128 = 1_000_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Extended JSON parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtendedJsonError {
    /// Input is not syntactically valid JSON.
    #[error("invalid json: {0}")]
    Syntax(String),
    /// A typed literal wrapper carried an invalid payload.
    #[error("invalid {wrapper} literal: {message}")]
    InvalidLiteral {
        /// Wrapper key, e.g. `$date`.
        wrapper: &'static str,
        /// Failure description.
        message: String,
    },
}

impl ExtendedJsonError {
    /// Builds an invalid-literal error.
    fn literal(wrapper: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidLiteral {
            wrapper,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Literal Types
// ============================================================================

/// 12-byte document object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Parses a 24-character hexadecimal object id.
    ///
    /// # Errors
    ///
    /// Returns [`ExtendedJsonError`] when the text is not 24 hex characters.
    pub fn parse_hex(text: &str) -> Result<Self, ExtendedJsonError> {
        let bytes = decode_hex(text)
            .ok_or_else(|| ExtendedJsonError::literal("$oid", "expected hexadecimal text"))?;
        let bytes: [u8; OBJECT_ID_LEN] = bytes
            .try_into()
            .map_err(|_| ExtendedJsonError::literal("$oid", "expected 24 hex characters"))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Returns the lowercase hexadecimal form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

/// Binary literal with its subtype byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary {
    /// Binary subtype.
    pub subtype: u8,
    /// Raw payload.
    pub bytes: Vec<u8>,
}

/// Parsed extended JSON value.
///
/// # Invariants
/// - `Object` preserves source key order.
/// - Typed variants are only produced from well-formed wrapper objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(Number),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<ExtendedValue>),
    /// JSON object with ordered keys.
    Object(Vec<(String, ExtendedValue)>),
    /// `$date` literal.
    DateTime(OffsetDateTime),
    /// `$oid` literal.
    ObjectId(ObjectId),
    /// `$binary` or `$uuid` literal.
    Binary(Binary),
    /// `$numberLong` literal.
    Int64(i64),
}

impl Default for ExtendedValue {
    fn default() -> Self {
        Self::empty_object()
    }
}

impl ExtendedValue {
    /// Returns an empty object, the neutral filter.
    #[must_use]
    pub const fn empty_object() -> Self {
        Self::Object(Vec::new())
    }

    /// Returns the ordered entries when the value is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&[(String, Self)]> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the items when the value is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the text when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Returns an integer view of numeric values.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(number) => number.as_i64(),
            Self::Int64(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders the value back into canonical extended JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Number(number) => Value::Number(number.clone()),
            Self::String(text) => Value::String(text.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
            Self::DateTime(moment) => wrap("$date", date_to_json(*moment)),
            Self::ObjectId(oid) => wrap("$oid", Value::String(oid.to_hex())),
            Self::Binary(binary) => {
                let mut inner = Map::new();
                inner.insert("base64".to_string(), Value::String(BASE64.encode(&binary.bytes)));
                inner.insert("subType".to_string(), Value::String(format!("{:02x}", binary.subtype)));
                wrap("$binary", Value::Object(inner))
            }
            Self::Int64(value) => wrap("$numberLong", Value::String(value.to_string())),
        }
    }
}

impl Serialize for ExtendedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses extended JSON text.
///
/// # Errors
///
/// Returns [`ExtendedJsonError`] on invalid JSON or malformed literals.
pub fn parse(text: &str) -> Result<ExtendedValue, ExtendedJsonError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ExtendedJsonError::Syntax(err.to_string()))?;
    from_json(value)
}

/// Converts an already-decoded JSON value, resolving literal wrappers.
///
/// # Errors
///
/// Returns [`ExtendedJsonError`] when a wrapper carries an invalid payload.
pub fn from_json(value: Value) -> Result<ExtendedValue, ExtendedJsonError> {
    Ok(match value {
        Value::Null => ExtendedValue::Null,
        Value::Bool(flag) => ExtendedValue::Bool(flag),
        Value::Number(number) => ExtendedValue::Number(number),
        Value::String(text) => ExtendedValue::String(text),
        Value::Array(items) => {
            ExtendedValue::Array(items.into_iter().map(from_json).collect::<Result<_, _>>()?)
        }
        Value::Object(map) => {
            if let Some(literal) = literal_from_object(&map)? {
                return Ok(literal);
            }
            let mut entries = Vec::with_capacity(map.len());
            for (key, value) in map {
                entries.push((key, from_json(value)?));
            }
            ExtendedValue::Object(entries)
        }
    })
}

/// Recognizes a literal wrapper object, returning `None` for plain objects.
fn literal_from_object(map: &Map<String, Value>) -> Result<Option<ExtendedValue>, ExtendedJsonError> {
    if map.len() == 1 {
        let Some((key, value)) = map.iter().next() else {
            return Ok(None);
        };
        return match key.as_str() {
            "$date" => parse_date(value).map(|moment| Some(ExtendedValue::DateTime(moment))),
            "$oid" => {
                let text = value
                    .as_str()
                    .ok_or_else(|| ExtendedJsonError::literal("$oid", "expected a string"))?;
                ObjectId::parse_hex(text).map(|oid| Some(ExtendedValue::ObjectId(oid)))
            }
            "$uuid" => parse_uuid(value).map(|binary| Some(ExtendedValue::Binary(binary))),
            "$numberLong" => {
                parse_number_long("$numberLong", value).map(|n| Some(ExtendedValue::Int64(n)))
            }
            "$binary" => parse_canonical_binary(value).map(|binary| Some(ExtendedValue::Binary(binary))),
            _ => Ok(None),
        };
    }
    if map.len() == 2
        && let (Some(payload), Some(subtype)) = (map.get("$binary"), map.get("$type"))
    {
        let payload = payload
            .as_str()
            .ok_or_else(|| ExtendedJsonError::literal("$binary", "expected base64 text"))?;
        return parse_binary(payload, subtype).map(|binary| Some(ExtendedValue::Binary(binary)));
    }
    Ok(None)
}

/// Parses a `$date` payload.
fn parse_date(value: &Value) -> Result<OffsetDateTime, ExtendedJsonError> {
    match value {
        Value::String(text) => OffsetDateTime::parse(text, &Rfc3339)
            .map_err(|err| ExtendedJsonError::literal("$date", err.to_string())),
        Value::Number(number) => {
            let millis = number
                .as_i64()
                .ok_or_else(|| ExtendedJsonError::literal("$date", "expected integer millis"))?;
            date_from_millis(millis)
        }
        Value::Object(inner) if inner.len() == 1 => match inner.get("$numberLong") {
            Some(long) => date_from_millis(parse_number_long("$date", long)?),
            None => Err(ExtendedJsonError::literal("$date", "unsupported date payload")),
        },
        _ => Err(ExtendedJsonError::literal("$date", "unsupported date payload")),
    }
}

/// Builds a date-time from unix milliseconds.
fn date_from_millis(millis: i64) -> Result<OffsetDateTime, ExtendedJsonError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * NANOS_PER_MILLI)
        .map_err(|err| ExtendedJsonError::literal("$date", err.to_string()))
}

/// Renders a date-time as RFC 3339, falling back to unix millis.
fn date_to_json(moment: OffsetDateTime) -> Value {
    moment.format(&Rfc3339).map_or_else(
        |_| {
            let millis = moment.unix_timestamp_nanos() / NANOS_PER_MILLI;
            let millis = i64::try_from(millis).unwrap_or(i64::MAX);
            wrap("$numberLong", Value::String(millis.to_string()))
        },
        Value::String,
    )
}

/// Parses a `$numberLong` string payload.
fn parse_number_long(wrapper: &'static str, value: &Value) -> Result<i64, ExtendedJsonError> {
    value
        .as_str()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| ExtendedJsonError::literal(wrapper, "expected a 64-bit integer string"))
}

/// Parses the canonical `{"$binary": {"base64": .., "subType": ..}}` form.
fn parse_canonical_binary(value: &Value) -> Result<Binary, ExtendedJsonError> {
    let inner = value
        .as_object()
        .ok_or_else(|| ExtendedJsonError::literal("$binary", "expected an object payload"))?;
    let payload = inner
        .get("base64")
        .and_then(Value::as_str)
        .ok_or_else(|| ExtendedJsonError::literal("$binary", "missing base64 payload"))?;
    let subtype = inner
        .get("subType")
        .ok_or_else(|| ExtendedJsonError::literal("$binary", "missing subType"))?;
    parse_binary(payload, subtype)
}

/// Decodes a base64 payload and hexadecimal subtype.
fn parse_binary(payload: &str, subtype: &Value) -> Result<Binary, ExtendedJsonError> {
    let subtype = subtype
        .as_str()
        .filter(|text| !text.is_empty() && text.len() <= 2)
        .and_then(|text| u8::from_str_radix(text, 16).ok())
        .ok_or_else(|| ExtendedJsonError::literal("$binary", "subtype must be one hex byte"))?;
    let bytes = BASE64
        .decode(payload)
        .map_err(|err| ExtendedJsonError::literal("$binary", err.to_string()))?;
    Ok(Binary {
        subtype,
        bytes,
    })
}

/// Parses a canonical hyphenated UUID string.
fn parse_uuid(value: &Value) -> Result<Binary, ExtendedJsonError> {
    let text = value
        .as_str()
        .ok_or_else(|| ExtendedJsonError::literal("$uuid", "expected a string"))?;
    let hyphens_ok = text.len() == 36
        && text
            .char_indices()
            .all(|(idx, ch)| matches!(idx, 8 | 13 | 18 | 23) == (ch == '-'));
    if !hyphens_ok {
        return Err(ExtendedJsonError::literal("$uuid", "expected canonical uuid text"));
    }
    let compact: String = text.chars().filter(|ch| *ch != '-').collect();
    let bytes = decode_hex(&compact)
        .filter(|bytes| bytes.len() == UUID_LEN)
        .ok_or_else(|| ExtendedJsonError::literal("$uuid", "expected hexadecimal digits"))?;
    Ok(Binary {
        subtype: BINARY_SUBTYPE_UUID,
        bytes,
    })
}

/// Builds a single-key wrapper object.
fn wrap(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Decodes an even-length hexadecimal string.
fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0 .. text.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(text.get(idx .. idx + 2)?, 16).ok())
        .collect()
}

/// Encodes bytes as lowercase hexadecimal.
fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
