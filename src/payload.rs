//! Strict payload parsing layered on top of the untyped event channel.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{BridgeError, BridgeResult};

pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a payload that must be a JSON object.
///
/// Anything other than an object is an `UnexpectedType` error; an object that
/// doesn't fit `T` is a `Parse` error.
pub fn parse_object<T: DeserializeOwned>(payload: Value) -> BridgeResult<T> {
    if !payload.is_object() {
        return Err(BridgeError::UnexpectedType {
            expected: "object".to_string(),
            got: value_kind(&payload).to_string(),
        });
    }
    serde_json::from_value(payload).map_err(|e| BridgeError::parse(e.to_string()))
}

pub fn parse_str<T: DeserializeOwned>(raw: &str) -> BridgeResult<T> {
    serde_json::from_str(raw).map_err(|e| BridgeError::parse(e.to_string()))
}
