//! OTLP/JSON decoding.
//!
//! The generated serde impls only accept lowerCamelCase field names, 64-bit
//! timestamps as strings and enums as integers. OTLP/JSON follows the protobuf
//! JSON mapping, which also allows original field names, numeric 64-bit
//! integers and enum value names, so the JSON tree is normalized before the
//! typed decode.

use crate::core::{ResourceSpanGroup, Result, TracedockError};
use opentelemetry_proto::tonic::trace::v1::{span::SpanKind, status::StatusCode};
use serde_json::Value;

/// 64-bit fields carried as decimal strings by the generated types.
const UINT64_FIELDS: &[&str] = &["startTimeUnixNano", "endTimeUnixNano", "timeUnixNano"];

/// Parse a JSON-encoded `ResourceSpans`.
pub(crate) fn decode_resource_spans(body: &[u8]) -> Result<ResourceSpanGroup> {
    let mut value: Value = serde_json::from_slice(body)
        .map_err(|e| TracedockError::protocol(format!("Invalid JSON: {}", e)))?;

    normalize(&mut value);

    serde_json::from_value(value)
        .map_err(|e| TracedockError::protocol(format!("Invalid OTLP/JSON resource spans: {}", e)))
}

fn normalize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, mut field) in std::mem::take(map) {
                let key = lower_camel(key);
                normalize(&mut field);
                if let Some(replacement) = normalize_scalar(&key, &field) {
                    field = replacement;
                }
                map.insert(key, field);
            }
        },
        Value::Array(items) => items.iter_mut().for_each(normalize),
        _ => {},
    }
}

fn normalize_scalar(key: &str, field: &Value) -> Option<Value> {
    match field {
        Value::Number(n) if UINT64_FIELDS.contains(&key) => {
            n.as_u64().map(|n| Value::String(n.to_string()))
        },
        Value::String(name) if key == "kind" => {
            SpanKind::from_str_name(name).map(|kind| Value::from(kind as i32))
        },
        Value::String(name) if key == "code" => {
            StatusCode::from_str_name(name).map(|code| Value::from(code as i32))
        },
        _ => None,
    }
}

/// `scope_spans` -> `scopeSpans`; names without underscores are kept.
fn lower_camel(key: String) -> String {
    if !key.contains('_') {
        return key;
    }

    let mut out = String::with_capacity(key.len());
    for (index, part) in key.split('_').enumerate() {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) if index > 0 => {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            },
            Some(_) => out.push_str(part),
            None => {},
        }
    }
    out
}
