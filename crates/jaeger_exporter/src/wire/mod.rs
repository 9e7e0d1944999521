//! Jaeger wire model
//!
//! Mirrors the structs of the Jaeger Thrift IDL that the exporter produces. Everything here is
//! transient: built per translation or per delivery and dropped after the attempt.
//! [`codec`] turns these structs into bytes and back.

pub mod codec;

pub use codec::{
    decode_emit_batch, deserialize_binary, encode_emit_batch, serialize_binary, CodecError,
    EMIT_BATCH_METHOD, THRIFT_CONTENT_TYPE,
};

/// Wire type discriminator of a [`Tag`], numbered as in the IDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TagType {
    String = 0,
    Double = 1,
    Bool = 2,
    Long = 3,
}

impl TagType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::String),
            1 => Some(Self::Double),
            2 => Some(Self::Bool),
            3 => Some(Self::Long),
            _ => None,
        }
    }
}

/// Tag value; exactly one wire field is populated, matching [`TagValue::tag_type`]
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    String(String),
    Double(f64),
    Bool(bool),
    Long(i64),
}

impl TagValue {
    pub fn tag_type(&self) -> TagType {
        match self {
            Self::String(_) => TagType::String,
            Self::Double(_) => TagType::Double,
            Self::Bool(_) => TagType::Bool,
            Self::Long(_) => TagType::Long,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub key: String,
    pub value: TagValue,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: TagValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, TagValue::String(value.into()))
    }

    pub fn double(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, TagValue::Double(value))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, TagValue::Bool(value))
    }

    pub fn long(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, TagValue::Long(value))
    }
}

/// Timestamped set of fields attached to a span
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Log {
    /// Microseconds since the Unix epoch
    pub timestamp: i64,
    pub fields: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(i32)]
pub enum SpanRefType {
    #[default]
    ChildOf = 0,
    FollowsFrom = 1,
}

impl SpanRefType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::ChildOf),
            1 => Some(Self::FollowsFrom),
            _ => None,
        }
    }
}

/// Reference to another span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanRef {
    pub ref_type: SpanRefType,
    pub trace_id_low: i64,
    pub trace_id_high: i64,
    pub span_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Span {
    pub trace_id_low: i64,
    pub trace_id_high: i64,
    pub span_id: i64,
    pub parent_span_id: i64,
    pub operation_name: String,
    pub references: Vec<SpanRef>,
    pub flags: i32,
    /// Microseconds since the Unix epoch
    pub start_time: i64,
    /// Microseconds
    pub duration: i64,
    pub tags: Vec<Tag>,
    pub logs: Vec<Log>,
}

/// Describes the process that emitted a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Process {
    pub service_name: String,
    pub tags: Vec<Tag>,
}

/// The unit of transmission: shared process metadata plus a group of spans
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub process: Process,
    pub spans: Vec<Span>,
}

impl Batch {
    pub fn new(process: Process, spans: Vec<Span>) -> Self {
        Self { process, spans }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_type_matches_value() {
        assert_eq!(Tag::string("k", "v").value.tag_type(), TagType::String);
        assert_eq!(Tag::double("k", 1.0).value.tag_type(), TagType::Double);
        assert_eq!(Tag::bool("k", true).value.tag_type(), TagType::Bool);
        assert_eq!(Tag::long("k", 1).value.tag_type(), TagType::Long);
    }

    #[test]
    fn test_enum_discriminants_follow_idl() {
        for ty in [TagType::String, TagType::Double, TagType::Bool, TagType::Long] {
            assert_eq!(TagType::from_i32(ty as i32), Some(ty));
        }
        assert_eq!(TagType::from_i32(4), None);
        assert_eq!(SpanRefType::from_i32(1), Some(SpanRefType::FollowsFrom));
        assert_eq!(SpanRefType::from_i32(-1), None);
    }

    #[test]
    fn test_codec_constants_are_public() {
        assert_eq!(THRIFT_CONTENT_TYPE, "application/x-thrift");
        assert_eq!(EMIT_BATCH_METHOD, "emitBatch");
    }
}
