//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use tabsync::{Partial, PersistedEnvelope, StorageKey};

/// Generate a storage key.
pub fn storage_key() -> impl Strategy<Value = StorageKey> {
    "store:[a-z][a-z0-9-]{0,15}".prop_map(StorageKey::from)
}

/// Generate a store field name.
pub fn field_name() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,11}".prop_map(String::from)
}

/// Generate a scalar JSON value.
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
}

/// Generate a JSON value nested at most two levels deep.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Generate store state with up to `max_fields` fields.
pub fn state(max_fields: usize) -> impl Strategy<Value = Partial> {
    prop::collection::btree_map(field_name(), json_value(), 0..=max_fields)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Generate an envelope, sometimes carrying a `version`.
pub fn envelope() -> impl Strategy<Value = PersistedEnvelope> {
    (state(8), any::<Option<u32>>()).prop_map(|(state, version)| {
        let mut envelope = PersistedEnvelope::new(state);
        if let Some(version) = version {
            envelope
                .metadata
                .insert("version".to_owned(), Value::from(version));
        }
        envelope
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{RecordingStore, TestHost};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tabsync::{Storage, SyncMessage};

    proptest! {
        #[test]
        fn test_projection_is_exact_intersection(
            env in envelope(),
            fields in prop::collection::vec(field_name(), 0..6),
        ) {
            let wanted: BTreeSet<&str> = fields.iter().map(String::as_str).collect();
            let expected: Partial = env
                .state
                .iter()
                .filter(|(name, _)| wanted.contains(name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();

            match env.project(&fields) {
                Some(partial) => prop_assert_eq!(partial, expected),
                None => prop_assert!(expected.is_empty()),
            }
        }

        #[test]
        fn test_envelope_survives_storage(env in envelope()) {
            let decoded = PersistedEnvelope::decode(&env.encode()).unwrap();
            prop_assert_eq!(decoded.version(), env.version());
            prop_assert_eq!(decoded, env);
        }

        #[test]
        fn test_frames_carry_any_key(key in storage_key(), env in envelope()) {
            let frame = SyncMessage::new(key.clone(), env.to_value()).encode();
            let message = SyncMessage::decode(&frame).unwrap();
            prop_assert_eq!(message.key, key);
        }

        #[test]
        fn test_remote_store_receives_only_owned_fields(
            key in storage_key(),
            env in envelope(),
            owned in prop::collection::btree_set(field_name(), 1..4),
        ) {
            let host = TestHost::new();
            let writer = host.spawn();
            let mut reader = host.spawn();

            let owned: Vec<&str> = owned.iter().map(String::as_str).collect();
            let store = Arc::new(RecordingStore::new(&owned));
            let _sub = reader.attach_store(key.clone(), Arc::clone(&store));

            writer.storage().set_item(key.as_str(), &env.encode()).unwrap();
            reader.tick();

            let expected = env.project(&owned);
            for merge in store.merges() {
                let Value::Object(merge) = merge else {
                    panic!("merge is always an object");
                };
                prop_assert!(merge.keys().all(|name| owned.contains(&name.as_str())));
                prop_assert_eq!(Some(merge), expected.clone());
            }
            if expected.is_none() {
                prop_assert_eq!(store.merge_count(), 0);
            } else {
                prop_assert_eq!(store.merge_count(), 2);
            }
        }
    }
}
