use crate::span::AttributeValue;
use crate::wire::{Tag, TagValue};
use std::collections::HashMap;

/// Converts one attribute into a wire tag.
///
/// Returns `None` for value kinds without a wire representation; callers skip those.
/// 32-bit integers are widened to the 64-bit LONG representation.
pub fn attribute_to_tag(key: &str, value: &AttributeValue) -> Option<Tag> {
    let value = match value {
        AttributeValue::Bool(v) => TagValue::Bool(*v),
        AttributeValue::String(v) => TagValue::String(v.clone()),
        AttributeValue::Int64(v) => TagValue::Long(*v),
        AttributeValue::Int32(v) => TagValue::Long(i64::from(*v)),
        AttributeValue::Float64(v) => TagValue::Double(*v),
        AttributeValue::Array(_) | AttributeValue::Bytes(_) => return None,
    };
    Some(Tag::new(key, value))
}

/// Translates a whole attribute set, dropping unsupported values
pub fn attributes_to_tags(attributes: &HashMap<String, AttributeValue>) -> Vec<Tag> {
    attributes
        .iter()
        .filter_map(|(key, value)| attribute_to_tag(key, value))
        .collect()
}
