//! Persisted envelopes: the documents stored under each storage key.
//!
//! A store persists itself as `{"state": {...}, ...metadata}`. Only the
//! fields of `state` are ever merged into another instance's store; every
//! other top-level field is carried along as metadata and otherwise ignored.

use serde_json::Value;

use crate::error::{json_type_name, DecodeError};

/// A partial store state: field name to JSON value.
pub type Partial = serde_json::Map<String, Value>;

/// Top-level field holding the store's persisted fields.
pub const STATE_FIELD: &str = "state";

/// Decoded form of the value stored under a [`StorageKey`](crate::StorageKey).
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEnvelope {
    /// The persisted store fields.
    pub state: Partial,
    /// Every other top-level field (e.g. `version`).
    pub metadata: Partial,
}

impl PersistedEnvelope {
    /// Create an envelope with no metadata.
    pub fn new(state: Partial) -> Self {
        Self {
            state,
            metadata: Partial::new(),
        }
    }

    /// Decode a raw stored string.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Validate and decode an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::NotAnObject(json_type_name(value)))?;

        let state = match object.get(STATE_FIELD) {
            Some(Value::Object(state)) => state.clone(),
            Some(other) => return Err(DecodeError::StateNotObject(json_type_name(other))),
            None => return Err(DecodeError::MissingState),
        };

        let metadata = object
            .iter()
            .filter(|(name, _)| name.as_str() != STATE_FIELD)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self { state, metadata })
    }

    /// The `version` metadata field, if present and numeric.
    pub fn version(&self) -> Option<u64> {
        self.metadata.get("version").and_then(Value::as_u64)
    }

    /// Re-assemble the envelope as a JSON value.
    pub fn to_value(&self) -> Value {
        let mut object = self.metadata.clone();
        object.insert(STATE_FIELD.to_owned(), Value::Object(self.state.clone()));
        Value::Object(object)
    }

    /// Encode to the string form kept in storage.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Restrict `state` to the given field names.
    ///
    /// Returns `None` when none of the fields are present, so callers never
    /// apply an empty update.
    pub fn project<I, S>(&self, fields: I) -> Option<Partial>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut partial = Partial::new();
        for field in fields {
            let field = field.as_ref();
            if let Some(value) = self.state.get(field) {
                partial.insert(field.to_owned(), value.clone());
            }
        }

        if partial.is_empty() {
            None
        } else {
            Some(partial)
        }
    }
}
