//! SpanRecord to wire span translation
//!
//! Pure and infallible: malformed identifiers are passed through as they are.

use crate::span::{SpanId, SpanKind, SpanRecord, TraceId};
use crate::tag::{attribute_to_tag, attributes_to_tags};
use crate::wire::{Log, Span, SpanRef, SpanRefType, Tag};
use std::time::{SystemTime, UNIX_EPOCH};

/// Reads 8 bytes as a big-endian integer, reinterpreted as signed
pub fn bytes_to_i64(buf: [u8; 8]) -> i64 {
    i64::from_be_bytes(buf)
}

/// Splits a trace id into its (high, low) halves
pub fn split_trace_id(trace_id: &TraceId) -> (i64, i64) {
    let [h0, h1, h2, h3, h4, h5, h6, h7, l0, l1, l2, l3, l4, l5, l6, l7] = trace_id.0;
    (
        bytes_to_i64([h0, h1, h2, h3, h4, h5, h6, h7]),
        bytes_to_i64([l0, l1, l2, l3, l4, l5, l6, l7]),
    )
}

pub fn span_id_to_i64(span_id: &SpanId) -> i64 {
    bytes_to_i64(span_id.0)
}

/// Signed microseconds since the Unix epoch, truncated toward zero
fn unix_micros(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_micros() as i64,
        Err(before) => -(before.duration().as_micros() as i64),
    }
}

/// Signed microseconds from `start` to `end`; negative when `end` precedes `start`
fn duration_micros(start: SystemTime, end: SystemTime) -> i64 {
    match end.duration_since(start) {
        Ok(elapsed) => elapsed.as_micros() as i64,
        Err(before) => -(before.duration().as_micros() as i64),
    }
}

/// Operation name, prefixed by direction for RPC spans
pub fn operation_name(span: &SpanRecord) -> String {
    match span.kind {
        SpanKind::Client => format!("Sent.{}", span.name),
        SpanKind::Server => format!("Recv.{}", span.name),
        SpanKind::Unspecified => span.name.clone(),
    }
}

/// Translates a finished span into its wire representation.
///
/// Tags are the supported attributes (in attribute-set order), then `status.code` and
/// `status.message`, then `error=true` when the status is not OK.
pub fn span_to_wire(span: &SpanRecord) -> Span {
    let mut tags = attributes_to_tags(&span.attributes);
    tags.push(Tag::long("status.code", i64::from(span.status.code)));
    tags.push(Tag::string("status.message", span.status.message.clone()));
    if !span.status.is_ok() {
        tags.push(Tag::bool("error", true));
    }

    let logs = span
        .annotations
        .iter()
        .map(|annotation| {
            let mut fields: Vec<Tag> = annotation
                .attributes
                .iter()
                .filter_map(|(key, value)| attribute_to_tag(key, value))
                .collect();
            fields.push(Tag::string("message", annotation.message.clone()));
            Log {
                timestamp: unix_micros(annotation.time),
                fields,
            }
        })
        .collect();

    let references = span
        .links
        .iter()
        .map(|link| {
            let (trace_id_high, trace_id_low) = split_trace_id(&link.trace_id);
            SpanRef {
                ref_type: SpanRefType::ChildOf,
                trace_id_low,
                trace_id_high,
                span_id: span_id_to_i64(&link.span_id),
            }
        })
        .collect();

    let (trace_id_high, trace_id_low) = split_trace_id(&span.trace_id);
    Span {
        trace_id_low,
        trace_id_high,
        span_id: span_id_to_i64(&span.span_id),
        parent_span_id: span_id_to_i64(&span.parent_span_id),
        operation_name: operation_name(span),
        references,
        flags: i32::from(span.trace_options),
        start_time: unix_micros(span.start_time),
        duration: duration_micros(span.start_time, span.end_time),
        tags,
        logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{AttributeValue, Link, Status};
    use crate::wire::{serialize_binary, Batch, Process};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn sorted(mut tags: Vec<Tag>) -> Vec<Tag> {
        tags.sort_by(|a, b| a.key.cmp(&b.key));
        tags
    }

    fn example_span(now: SystemTime) -> SpanRecord {
        let mut span = SpanRecord::new(
            TraceId([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]),
            SpanId([1, 2, 3, 4, 5, 6, 7, 8]),
            "/foo",
            SpanKind::Unspecified,
        );
        span.trace_options = 0;
        span.start_time = now;
        span.end_time = now;
        span.set_attribute("double", 123.456);
        span.set_attribute("key", "value");
        span.annotate(
            now,
            "error",
            HashMap::from([("answer".to_string(), AttributeValue::Int64(42))]),
        );
        span.annotate(
            now,
            "error",
            HashMap::from([("result".to_string(), AttributeValue::Bool(true))]),
        );
        span.status = Status::new(2, "error");
        span
    }

    #[test]
    fn test_bytes_to_i64() {
        assert_eq!(bytes_to_i64([255, 0, 0, 0, 0, 0, 0, 0]), -72057594037927936);
        assert_eq!(bytes_to_i64([0, 0, 0, 0, 0, 0, 0, 1]), 1);
        assert_eq!(bytes_to_i64([0; 8]), 0);
    }

    #[test]
    fn test_span_without_parent() {
        let now = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_456);
        let got = span_to_wire(&example_span(now));

        let start = 1_700_000_000_123_456;
        let want = Span {
            trace_id_low: 651345242494996240,
            trace_id_high: 72623859790382856,
            span_id: 72623859790382856,
            parent_span_id: 0,
            operation_name: "/foo".to_string(),
            references: vec![],
            flags: 0,
            start_time: start,
            duration: 0,
            tags: sorted(vec![
                Tag::double("double", 123.456),
                Tag::string("key", "value"),
                Tag::bool("error", true),
                Tag::long("status.code", 2),
                Tag::string("status.message", "error"),
            ]),
            logs: vec![
                Log {
                    timestamp: start,
                    fields: vec![Tag::long("answer", 42), Tag::string("message", "error")],
                },
                Log {
                    timestamp: start,
                    fields: vec![Tag::bool("result", true), Tag::string("message", "error")],
                },
            ],
        };

        let got = Span {
            tags: sorted(got.tags),
            ..got
        };
        assert_eq!(got, want);

        // byte-exact once wrapped in a batch
        let process = Process::default();
        assert_eq!(
            serialize_binary(&Batch::new(process.clone(), vec![got])).unwrap(),
            serialize_binary(&Batch::new(process, vec![want])).unwrap()
        );
    }

    #[test]
    fn test_tag_order() {
        let mut span = example_span(SystemTime::now());
        span.attributes.clear();
        let tags = span_to_wire(&span).tags;
        assert_eq!(
            tags,
            vec![
                Tag::long("status.code", 2),
                Tag::string("status.message", "error"),
                Tag::bool("error", true),
            ]
        );
    }

    #[test]
    fn test_ok_status_has_no_error_tag() {
        let mut span = example_span(SystemTime::now());
        span.status = Status::new(Status::OK, "");
        let tags = span_to_wire(&span).tags;
        assert!(tags.iter().all(|t| t.key != "error"));
        assert!(tags.contains(&Tag::long("status.code", 0)));
        assert!(tags.contains(&Tag::string("status.message", "")));
    }

    #[test]
    fn test_operation_name_by_kind() {
        let mut span = example_span(SystemTime::now());
        span.kind = SpanKind::Client;
        assert_eq!(span_to_wire(&span).operation_name, "Sent./foo");
        span.kind = SpanKind::Server;
        assert_eq!(span_to_wire(&span).operation_name, "Recv./foo");
        span.kind = SpanKind::Unspecified;
        assert_eq!(span_to_wire(&span).operation_name, "/foo");
    }

    #[test]
    fn test_timing_and_flags() {
        let start = UNIX_EPOCH + Duration::from_secs(10);
        let mut span = example_span(start);
        span.end_time = start + Duration::from_nanos(2_500_999);
        span.trace_options = 1;
        span.parent_span_id = SpanId::from_u64(9);

        let wire = span_to_wire(&span);
        assert_eq!(wire.start_time, 10_000_000);
        assert_eq!(wire.duration, 2_500);
        assert_eq!(wire.flags, 1);
        assert_eq!(wire.parent_span_id, 9);
    }

    #[test]
    fn test_end_before_start_gives_negative_duration() {
        let start = UNIX_EPOCH + Duration::from_secs(10);
        let mut span = example_span(start);
        span.end_time = start - Duration::from_micros(3);
        assert_eq!(span_to_wire(&span).duration, -3);
    }

    #[test]
    fn test_links_become_references() {
        let mut span = example_span(SystemTime::now());
        span.links.push(Link {
            trace_id: TraceId::from_u128((7u128 << 64) | 8),
            span_id: SpanId::from_u64(9),
        });
        let references = span_to_wire(&span).references;
        assert_eq!(
            references,
            vec![SpanRef {
                ref_type: SpanRefType::ChildOf,
                trace_id_low: 8,
                trace_id_high: 7,
                span_id: 9,
            }]
        );
    }

    #[test]
    fn test_unsupported_attribute_is_dropped() {
        let mut span = example_span(SystemTime::now());
        span.set_attribute("nested", AttributeValue::Array(vec!["a".into()]));
        let tags = span_to_wire(&span).tags;
        assert_eq!(tags.len(), 5);
        assert!(tags.iter().all(|t| t.key != "nested"));
    }

    proptest! {
        #[test]
        fn prop_trace_id_split_reassembles(bytes in any::<[u8; 16]>()) {
            let (high, low) = split_trace_id(&TraceId(bytes));
            let mut joined = [0u8; 16];
            joined[..8].copy_from_slice(&high.to_be_bytes());
            joined[8..].copy_from_slice(&low.to_be_bytes());
            prop_assert_eq!(joined, bytes);
            prop_assert_eq!(high as u64, u64::from_be_bytes(bytes[..8].try_into().unwrap()));
            prop_assert_eq!(low as u64, u64::from_be_bytes(bytes[8..].try_into().unwrap()));
        }

        #[test]
        fn prop_error_tag_iff_status_not_ok(code in any::<i32>()) {
            let mut span = example_span(SystemTime::now());
            span.status = Status::new(code, "m");
            let tags = span_to_wire(&span).tags;
            let has_error = tags.contains(&Tag::bool("error", true));
            prop_assert_eq!(has_error, code != 0);
            prop_assert!(tags.contains(&Tag::long("status.code", i64::from(code))));
            prop_assert!(tags.contains(&Tag::string("status.message", "m")));
        }
    }
}
