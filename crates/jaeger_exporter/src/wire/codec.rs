//! Thrift encoding of the wire model
//!
//! Two framings are used on the network:
//!
//! - **Collector**: the [`Batch`] struct alone, strict binary protocol, sent as an HTTP body.
//! - **Agent**: a one-way `emitBatch` message in the compact protocol whose argument struct
//!   carries the batch in field 1. One message is one UDP datagram.

use super::{Batch, Log, Process, Span, SpanRef, SpanRefType, Tag, TagType, TagValue};
use thiserror::Error;
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TCompactInputProtocol, TCompactOutputProtocol,
    TFieldIdentifier, TInputProtocol, TListIdentifier, TMessageIdentifier, TMessageType,
    TOutputProtocol, TSerializable, TStructIdentifier, TType,
};
use thrift::{ProtocolError, ProtocolErrorKind};

/// Name of the agent service method carrying Jaeger batches
pub const EMIT_BATCH_METHOD: &str = "emitBatch";

/// Media type of a binary-encoded batch
pub const THRIFT_CONTENT_TYPE: &str = "application/x-thrift";

#[derive(Debug, Error)]
#[error("thrift codec error: {0}")]
pub struct CodecError(#[from] thrift::Error);

/// Encodes a batch with the strict binary protocol
pub fn serialize_binary(batch: &Batch) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    {
        let mut o_prot = TBinaryOutputProtocol::new(&mut buf, true);
        batch.write_to_out_protocol(&mut o_prot)?;
        o_prot.flush()?;
    }
    Ok(buf)
}

pub fn deserialize_binary(bytes: &[u8]) -> Result<Batch, CodecError> {
    let mut i_prot = TBinaryInputProtocol::new(bytes, true);
    Ok(Batch::read_from_in_protocol(&mut i_prot)?)
}

/// Encodes a batch as a compact `emitBatch` one-way message, ready to be sent as one datagram
pub fn encode_emit_batch(batch: &Batch, seq_id: i32) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    {
        let mut o_prot = TCompactOutputProtocol::new(&mut buf);
        o_prot.write_message_begin(&TMessageIdentifier::new(
            EMIT_BATCH_METHOD,
            TMessageType::OneWay,
            seq_id,
        ))?;
        o_prot.write_struct_begin(&TStructIdentifier::new("Agent_emitBatch_args"))?;
        o_prot.write_field_begin(&field("batch", TType::Struct, 1))?;
        batch.write_to_out_protocol(&mut o_prot)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()?;
        o_prot.write_message_end()?;
        o_prot.flush()?;
    }
    Ok(buf)
}

/// Decodes an `emitBatch` datagram, returning its sequence id and batch
pub fn decode_emit_batch(bytes: &[u8]) -> Result<(i32, Batch), CodecError> {
    let mut i_prot = TCompactInputProtocol::new(bytes);
    let ident = i_prot.read_message_begin()?;
    if ident.name != EMIT_BATCH_METHOD || ident.message_type != TMessageType::OneWay {
        return Err(invalid_data(format!(
            "unexpected message {} of type {:?}",
            ident.name, ident.message_type
        ))
        .into());
    }

    i_prot.read_struct_begin()?;
    let mut batch = None;
    loop {
        let field_ident = i_prot.read_field_begin()?;
        if field_ident.field_type == TType::Stop {
            break;
        }
        match field_ident.id {
            Some(1) => batch = Some(Batch::read_from_in_protocol(&mut i_prot)?),
            _ => i_prot.skip(field_ident.field_type)?,
        }
        i_prot.read_field_end()?;
    }
    i_prot.read_struct_end()?;
    i_prot.read_message_end()?;

    Ok((ident.sequence_number, required("Agent_emitBatch_args.batch", batch)?))
}

fn field(name: &str, field_type: TType, id: i16) -> TFieldIdentifier {
    TFieldIdentifier::new(name, field_type, id)
}

fn invalid_data(message: impl Into<String>) -> thrift::Error {
    thrift::Error::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidData, message))
}

fn required<T>(name: &str, value: Option<T>) -> thrift::Result<T> {
    value.ok_or_else(|| invalid_data(format!("missing required field {name}")))
}

fn write_list<T: TSerializable>(o_prot: &mut dyn TOutputProtocol, items: &[T]) -> thrift::Result<()> {
    o_prot.write_list_begin(&TListIdentifier::new(TType::Struct, items.len() as i32))?;
    for item in items {
        item.write_to_out_protocol(o_prot)?;
    }
    o_prot.write_list_end()
}

fn read_list<T: TSerializable>(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Vec<T>> {
    let list_ident = i_prot.read_list_begin()?;
    if list_ident.size < 0 {
        return Err(invalid_data(format!("negative list size {}", list_ident.size)));
    }
    // the declared size is untrusted input
    let mut items = Vec::with_capacity((list_ident.size as usize).min(1024));
    for _ in 0..list_ident.size {
        items.push(T::read_from_in_protocol(i_prot)?);
    }
    i_prot.read_list_end()?;
    Ok(items)
}

// ++++++++++++++++++++ Tag ++++++++++++++++++++

impl TSerializable for Tag {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        i_prot.read_struct_begin()?;
        let mut key = None;
        let mut v_type = None;
        let mut v_str = None;
        let mut v_double = None;
        let mut v_bool = None;
        let mut v_long = None;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_ident.id {
                Some(1) => key = Some(i_prot.read_string()?),
                Some(2) => {
                    let raw = i_prot.read_i32()?;
                    let ty = TagType::from_i32(raw)
                        .ok_or_else(|| invalid_data(format!("unsupported tag type {raw}")))?;
                    v_type = Some(ty);
                }
                Some(3) => v_str = Some(i_prot.read_string()?),
                Some(4) => v_double = Some(i_prot.read_double()?),
                Some(5) => v_bool = Some(i_prot.read_bool()?),
                Some(6) => v_long = Some(i_prot.read_i64()?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;

        let value = match required("Tag.vType", v_type)? {
            TagType::String => TagValue::String(required("Tag.vStr", v_str)?),
            TagType::Double => TagValue::Double(required("Tag.vDouble", v_double)?),
            TagType::Bool => TagValue::Bool(required("Tag.vBool", v_bool)?),
            TagType::Long => TagValue::Long(required("Tag.vLong", v_long)?),
        };
        Ok(Tag {
            key: required("Tag.key", key)?,
            value,
        })
    }

    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Tag"))?;
        o_prot.write_field_begin(&field("key", TType::String, 1))?;
        o_prot.write_string(&self.key)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("vType", TType::I32, 2))?;
        o_prot.write_i32(self.value.tag_type() as i32)?;
        o_prot.write_field_end()?;
        match &self.value {
            TagValue::String(v) => {
                o_prot.write_field_begin(&field("vStr", TType::String, 3))?;
                o_prot.write_string(v)?;
            }
            TagValue::Double(v) => {
                o_prot.write_field_begin(&field("vDouble", TType::Double, 4))?;
                o_prot.write_double(*v)?;
            }
            TagValue::Bool(v) => {
                o_prot.write_field_begin(&field("vBool", TType::Bool, 5))?;
                o_prot.write_bool(*v)?;
            }
            TagValue::Long(v) => {
                o_prot.write_field_begin(&field("vLong", TType::I64, 6))?;
                o_prot.write_i64(*v)?;
            }
        }
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

// ++++++++++++++++++++ Log ++++++++++++++++++++

impl TSerializable for Log {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        i_prot.read_struct_begin()?;
        let mut timestamp = None;
        let mut fields = None;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_ident.id {
                Some(1) => timestamp = Some(i_prot.read_i64()?),
                Some(2) => fields = Some(read_list(i_prot)?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(Log {
            timestamp: required("Log.timestamp", timestamp)?,
            fields: required("Log.fields", fields)?,
        })
    }

    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Log"))?;
        o_prot.write_field_begin(&field("timestamp", TType::I64, 1))?;
        o_prot.write_i64(self.timestamp)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("fields", TType::List, 2))?;
        write_list(o_prot, &self.fields)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

// ++++++++++++++++++++ SpanRef ++++++++++++++++++++

impl TSerializable for SpanRef {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        i_prot.read_struct_begin()?;
        let mut ref_type = None;
        let mut trace_id_low = None;
        let mut trace_id_high = None;
        let mut span_id = None;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_ident.id {
                Some(1) => {
                    let raw = i_prot.read_i32()?;
                    let ty = SpanRefType::from_i32(raw)
                        .ok_or_else(|| invalid_data(format!("unsupported span ref type {raw}")))?;
                    ref_type = Some(ty);
                }
                Some(2) => trace_id_low = Some(i_prot.read_i64()?),
                Some(3) => trace_id_high = Some(i_prot.read_i64()?),
                Some(4) => span_id = Some(i_prot.read_i64()?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(SpanRef {
            ref_type: required("SpanRef.refType", ref_type)?,
            trace_id_low: required("SpanRef.traceIdLow", trace_id_low)?,
            trace_id_high: required("SpanRef.traceIdHigh", trace_id_high)?,
            span_id: required("SpanRef.spanId", span_id)?,
        })
    }

    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("SpanRef"))?;
        o_prot.write_field_begin(&field("refType", TType::I32, 1))?;
        o_prot.write_i32(self.ref_type as i32)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("traceIdLow", TType::I64, 2))?;
        o_prot.write_i64(self.trace_id_low)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("traceIdHigh", TType::I64, 3))?;
        o_prot.write_i64(self.trace_id_high)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("spanId", TType::I64, 4))?;
        o_prot.write_i64(self.span_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

// ++++++++++++++++++++ Span ++++++++++++++++++++

impl TSerializable for Span {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        i_prot.read_struct_begin()?;
        let mut trace_id_low = None;
        let mut trace_id_high = None;
        let mut span_id = None;
        let mut parent_span_id = None;
        let mut operation_name = None;
        let mut references = Vec::new();
        let mut flags = None;
        let mut start_time = None;
        let mut duration = None;
        let mut tags = Vec::new();
        let mut logs = Vec::new();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_ident.id {
                Some(1) => trace_id_low = Some(i_prot.read_i64()?),
                Some(2) => trace_id_high = Some(i_prot.read_i64()?),
                Some(3) => span_id = Some(i_prot.read_i64()?),
                Some(4) => parent_span_id = Some(i_prot.read_i64()?),
                Some(5) => operation_name = Some(i_prot.read_string()?),
                Some(6) => references = read_list(i_prot)?,
                Some(7) => flags = Some(i_prot.read_i32()?),
                Some(8) => start_time = Some(i_prot.read_i64()?),
                Some(9) => duration = Some(i_prot.read_i64()?),
                Some(10) => tags = read_list(i_prot)?,
                Some(11) => logs = read_list(i_prot)?,
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(Span {
            trace_id_low: required("Span.traceIdLow", trace_id_low)?,
            trace_id_high: required("Span.traceIdHigh", trace_id_high)?,
            span_id: required("Span.spanId", span_id)?,
            parent_span_id: required("Span.parentSpanId", parent_span_id)?,
            operation_name: required("Span.operationName", operation_name)?,
            references,
            flags: required("Span.flags", flags)?,
            start_time: required("Span.startTime", start_time)?,
            duration: required("Span.duration", duration)?,
            tags,
            logs,
        })
    }

    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Span"))?;
        o_prot.write_field_begin(&field("traceIdLow", TType::I64, 1))?;
        o_prot.write_i64(self.trace_id_low)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("traceIdHigh", TType::I64, 2))?;
        o_prot.write_i64(self.trace_id_high)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("spanId", TType::I64, 3))?;
        o_prot.write_i64(self.span_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("parentSpanId", TType::I64, 4))?;
        o_prot.write_i64(self.parent_span_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("operationName", TType::String, 5))?;
        o_prot.write_string(&self.operation_name)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("references", TType::List, 6))?;
        write_list(o_prot, &self.references)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("flags", TType::I32, 7))?;
        o_prot.write_i32(self.flags)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("startTime", TType::I64, 8))?;
        o_prot.write_i64(self.start_time)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("duration", TType::I64, 9))?;
        o_prot.write_i64(self.duration)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("tags", TType::List, 10))?;
        write_list(o_prot, &self.tags)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("logs", TType::List, 11))?;
        write_list(o_prot, &self.logs)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

// ++++++++++++++++++++ Process ++++++++++++++++++++

impl TSerializable for Process {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        i_prot.read_struct_begin()?;
        let mut service_name = None;
        let mut tags = Vec::new();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_ident.id {
                Some(1) => service_name = Some(i_prot.read_string()?),
                Some(2) => tags = read_list(i_prot)?,
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(Process {
            service_name: required("Process.serviceName", service_name)?,
            tags,
        })
    }

    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Process"))?;
        o_prot.write_field_begin(&field("serviceName", TType::String, 1))?;
        o_prot.write_string(&self.service_name)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("tags", TType::List, 2))?;
        write_list(o_prot, &self.tags)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

// ++++++++++++++++++++ Batch ++++++++++++++++++++

impl TSerializable for Batch {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        i_prot.read_struct_begin()?;
        let mut process = None;
        let mut spans = None;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_ident.id {
                Some(1) => process = Some(Process::read_from_in_protocol(i_prot)?),
                Some(2) => spans = Some(read_list(i_prot)?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(Batch {
            process: required("Batch.process", process)?,
            spans: required("Batch.spans", spans)?,
        })
    }

    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Batch"))?;
        o_prot.write_field_begin(&field("process", TType::Struct, 1))?;
        self.process.write_to_out_protocol(o_prot)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&field("spans", TType::List, 2))?;
        write_list(o_prot, &self.spans)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}
