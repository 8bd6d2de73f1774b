//! Payload field helpers.
//!
//! Payload values arrive as stringifiable scalars, so an integer field may be
//! a JSON number or a numeric string.

use serde_json::Value;

use crate::error::{QueueError, QueueResult};
use crate::job::Payload;

/// Read a required integer field.
pub fn require_i64(payload: &Payload, field: &str) -> QueueResult<i64> {
    match payload.get(field) {
        None | Some(Value::Null) => Err(QueueError::invalid_payload(field, "missing")),
        Some(value) => as_i64(value)
            .ok_or_else(|| QueueError::invalid_payload(field, format!("not an integer: {}", value))),
    }
}

/// Read an optional string field.
pub fn optional_str<'a>(payload: &'a Payload, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
