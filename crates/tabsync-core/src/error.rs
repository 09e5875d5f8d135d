//! Error types for tabsync core.

use thiserror::Error;

/// Errors raised while decoding a value that crossed an instance boundary.
///
/// Every variant is recoverable: the offending event is logged and dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("envelope has no `state` field")]
    MissingState,

    #[error("envelope `state` must be an object, got {0}")]
    StateNotObject(&'static str),

    #[error("message has no string `key` field")]
    MissingKey,

    #[error("message for key {0} has no `value` field")]
    MissingValue(String),
}

/// Name of a JSON value's type, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
