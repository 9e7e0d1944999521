use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Bit of [`SpanRecord::trace_options`] that marks a span as sampled.
pub const TRACE_OPTION_SAMPLED: u8 = 0x01;

/// 128-bit trace identifier in its byte representation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TraceId(pub [u8; 16]);

/// 64-bit span identifier in its byte representation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpanId(pub [u8; 8]);

impl TraceId {
    /// Builds a trace id from a 128-bit integer, most significant byte first
    pub fn from_u128(id: u128) -> Self {
        Self(id.to_be_bytes())
    }
}

impl SpanId {
    /// Builds a span id from a 64-bit integer, most significant byte first
    pub fn from_u64(id: u64) -> Self {
        Self(id.to_be_bytes())
    }

    /// Returns true for the all-zero id used by root spans
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 8]
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", u64::from_be_bytes(self.0))
    }
}

/// Attribute value types for span metadata
///
/// Only `Bool`, `String`, `Int64`, `Int32` and `Float64` have a wire representation;
/// the remaining kinds are dropped during translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int64(i64),
    Int32(i32),
    Float64(f64),
    String(String),
    Array(Vec<String>),
    Bytes(Vec<u8>),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Span kind as reported by the instrumentation layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    #[default]
    Unspecified,
    /// Server-side RPC span
    Server,
    /// Client-side RPC span
    Client,
}

/// Span completion status; code 0 means OK
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub const OK: i32 = 0;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::OK
    }
}

/// Timestamped annotation recorded while the span was open
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub time: SystemTime,
    pub message: String,
    pub attributes: HashMap<String, AttributeValue>,
}

/// Reference from one span to another span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

/// A finished span as handed over by the instrumentation layer.
///
/// The exporter only ever reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// All zero for root spans
    pub parent_span_id: SpanId,
    pub trace_options: u8,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub attributes: HashMap<String, AttributeValue>,
    pub annotations: Vec<Annotation>,
    pub links: Vec<Link>,
    pub status: Status,
}

impl SpanRecord {
    /// Creates a sampled span with no attributes that starts and ends now
    pub fn new(trace_id: TraceId, span_id: SpanId, name: impl Into<String>, kind: SpanKind) -> Self {
        let now = SystemTime::now();
        Self {
            trace_id,
            span_id,
            parent_span_id: SpanId::default(),
            trace_options: TRACE_OPTION_SAMPLED,
            name: name.into(),
            kind,
            start_time: now,
            end_time: now,
            attributes: HashMap::new(),
            annotations: Vec::new(),
            links: Vec::new(),
            status: Status::default(),
        }
    }

    pub fn is_sampled(&self) -> bool {
        self.trace_options & TRACE_OPTION_SAMPLED != 0
    }

    /// Adds an attribute to the span
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Records an annotation with the given message and attributes
    pub fn annotate(
        &mut self,
        time: SystemTime,
        message: impl Into<String>,
        attributes: HashMap<String, AttributeValue>,
    ) {
        self.annotations.push(Annotation {
            time,
            message: message.into(),
            attributes,
        });
    }

    /// Marks the span as completed with the given status
    pub fn finish(&mut self, end_time: SystemTime, status: Status) {
        self.end_time = end_time;
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_flag() {
        let mut span = SpanRecord::new(TraceId::from_u128(1), SpanId::from_u64(1), "op", SpanKind::Unspecified);
        assert!(span.is_sampled());

        span.trace_options = 0;
        assert!(!span.is_sampled());

        span.trace_options = 0x03;
        assert!(span.is_sampled());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(
            TraceId::from_u128(0xab).to_string(),
            "000000000000000000000000000000ab"
        );
        assert_eq!(SpanId::from_u64(0x0102).to_string(), "0000000000000102");
        assert!(SpanId::default().is_zero());
    }

    #[test]
    fn test_attribute_value_deserialize_untagged() {
        let values: Vec<AttributeValue> =
            serde_json::from_str(r#"[true, 7, 1.5, "x", ["a", "b"]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                AttributeValue::Bool(true),
                AttributeValue::Int64(7),
                AttributeValue::Float64(1.5),
                AttributeValue::String("x".to_string()),
                AttributeValue::Array(vec!["a".to_string(), "b".to_string()]),
            ]
        );
    }
}
