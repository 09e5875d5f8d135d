//! Broadcast message type.
//!
//! Frames travel between instances as JSON text `{"key": .., "value": ..}`.
//! Decoding is strict about the two fields and lenient about anything else.

use serde::Serialize;
use serde_json::Value;

use crate::error::{json_type_name, DecodeError};
use crate::types::StorageKey;

/// A change notification for one storage key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncMessage {
    /// The key that was written.
    pub key: StorageKey,
    /// The parsed value now stored under `key`.
    pub value: Value,
}

impl SyncMessage {
    pub fn new(key: impl Into<StorageKey>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Encode as a wire frame.
    pub fn encode(&self) -> String {
        serde_json::json!({ "key": self.key, "value": self.value }).to_string()
    }

    /// Decode a wire frame.
    ///
    /// A frame without a string `key`, or without a `value` field at all,
    /// is malformed. An explicit `null` value is accepted.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let parsed: Value = serde_json::from_str(frame)?;
        let mut object = match parsed {
            Value::Object(object) => object,
            other => return Err(DecodeError::NotAnObject(json_type_name(&other))),
        };

        let key = match object.remove("key") {
            Some(Value::String(key)) if !key.is_empty() => StorageKey::from(key),
            _ => return Err(DecodeError::MissingKey),
        };

        let value = object
            .remove("value")
            .ok_or_else(|| DecodeError::MissingValue(key.to_string()))?;

        Ok(Self { key, value })
    }
}
