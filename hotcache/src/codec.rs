//! Value encodings used at the store boundary.
//!
//! Scalars carry a [`ValueKind`] chosen by the reader; integers and floats are
//! ASCII decimal so the store can increment them in place. Structured records
//! travel inside a versioned JSON envelope:
//!
//! ```json
//! {"schema": "session", "version": 1, "data": { ... }}
//! ```

use crate::error::{CacheError, Result};
use crate::types::CacheValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type descriptor for a scalar value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bytes,
    Text,
    Integer,
    Float,
    Json,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bytes => "bytes",
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// A scalar value tagged with its kind
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bytes(Vec<u8>),
    Text(String),
    Integer(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Bytes(_) => ValueKind::Bytes,
            TypedValue::Text(_) => ValueKind::Text,
            TypedValue::Integer(_) => ValueKind::Integer,
            TypedValue::Float(_) => ValueKind::Float,
            TypedValue::Json(_) => ValueKind::Json,
        }
    }

    /// Encode to the byte form stored under a key
    pub fn encode(&self) -> Result<CacheValue> {
        match self {
            TypedValue::Bytes(bytes) => Ok(bytes.clone()),
            TypedValue::Text(text) => Ok(text.as_bytes().to_vec()),
            TypedValue::Integer(n) => Ok(n.to_string().into_bytes()),
            TypedValue::Float(x) if x.is_finite() => Ok(x.to_string().into_bytes()),
            TypedValue::Float(x) => Err(CacheError::SerializationError(format!(
                "cannot store non-finite float {}",
                x
            ))),
            TypedValue::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Decode stored bytes as `kind`
    pub fn decode(kind: ValueKind, bytes: &[u8]) -> Result<Self> {
        match kind {
            ValueKind::Bytes => Ok(TypedValue::Bytes(bytes.to_vec())),
            ValueKind::Text => Ok(TypedValue::Text(utf8(bytes)?.to_string())),
            ValueKind::Integer => utf8(bytes)?
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|e| CacheError::SerializationError(format!("not an integer: {}", e))),
            ValueKind::Float => utf8(bytes)?
                .parse::<f64>()
                .map(TypedValue::Float)
                .map_err(|e| CacheError::SerializationError(format!("not a float: {}", e))),
            ValueKind::Json => Ok(TypedValue::Json(serde_json::from_slice(bytes)?)),
        }
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        TypedValue::Integer(n)
    }
}

impl From<f64> for TypedValue {
    fn from(x: f64) -> Self {
        TypedValue::Float(x)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::Text(s.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::Text(s)
    }
}

impl From<serde_json::Value> for TypedValue {
    fn from(value: serde_json::Value) -> Self {
        TypedValue::Json(value)
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| CacheError::SerializationError(format!("invalid utf-8: {}", e)))
}

/// A structured type stored inside a versioned envelope
pub trait Record: Serialize + DeserializeOwned {
    /// Schema name written into the envelope
    const SCHEMA: &'static str;

    /// Version of the `data` layout
    const VERSION: u32;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema: &'a str,
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    schema: String,
    version: u32,
    data: serde_json::Value,
}

/// Wrap `record` in its envelope and serialize it
pub fn encode_record<T: Record>(record: &T) -> Result<CacheValue> {
    let envelope = EnvelopeRef {
        schema: T::SCHEMA,
        version: T::VERSION,
        data: record,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse an envelope, checking schema name and version
pub fn decode_record<T: Record>(bytes: &[u8]) -> Result<T> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    if envelope.schema != T::SCHEMA {
        return Err(CacheError::SerializationError(format!(
            "expected schema '{}', found '{}'",
            T::SCHEMA,
            envelope.schema
        )));
    }
    if envelope.version != T::VERSION {
        return Err(CacheError::SerializationError(format!(
            "unsupported {} version {} (expected {})",
            T::SCHEMA,
            envelope.version,
            T::VERSION
        )));
    }

    Ok(serde_json::from_value(envelope.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        level: u32,
    }

    impl Record for Profile {
        const SCHEMA: &'static str = "profile";
        const VERSION: u32 = 2;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other {
        name: String,
    }

    impl Record for Other {
        const SCHEMA: &'static str = "other";
        const VERSION: u32 = 2;
    }

    #[test]
    fn test_integer_is_ascii_decimal() {
        assert_eq!(TypedValue::Integer(-42).encode().unwrap(), b"-42".to_vec());
        assert_eq!(
            TypedValue::decode(ValueKind::Integer, b"15").unwrap(),
            TypedValue::Integer(15)
        );
    }

    #[test]
    fn test_decode_wrong_kind_fails() {
        let result = TypedValue::decode(ValueKind::Integer, b"abc");
        assert!(matches!(result, Err(CacheError::SerializationError(_))));

        let result = TypedValue::decode(ValueKind::Text, &[0xff, 0xfe]);
        assert!(matches!(result, Err(CacheError::SerializationError(_))));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(TypedValue::Float(f64::NAN).encode().is_err());
        assert_eq!(
            TypedValue::decode(ValueKind::Float, b"2.5").unwrap(),
            TypedValue::Float(2.5)
        );
    }

    #[test]
    fn test_record_envelope() {
        let profile = Profile {
            name: "ada".to_string(),
            level: 3,
        };
        let bytes = encode_record(&profile).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw["schema"], "profile");
        assert_eq!(raw["version"], 2);
        assert_eq!(raw["data"]["name"], "ada");

        let decoded: Profile = decode_record(&bytes).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn test_record_schema_mismatch() {
        let bytes = encode_record(&Other {
            name: "x".to_string(),
        })
        .unwrap();
        let result = decode_record::<Profile>(&bytes);
        assert!(matches!(result, Err(CacheError::SerializationError(_))));

        let stale = br#"{"schema":"profile","version":1,"data":{"name":"a","level":1}}"#;
        assert!(decode_record::<Profile>(stale).is_err());
    }
}
