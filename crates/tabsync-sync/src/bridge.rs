//! Store sync bridge.
//!
//! Connects one store to incoming envelopes for its storage key. An
//! envelope may carry fields the store does not own (a shared document, or
//! a different shape written by another version); only the intersection
//! with the store's persisted fields is ever applied.

use std::sync::Arc;

use serde_json::Value;
use tabsync_core::{Partial, PersistedEnvelope, StorageKey};

use crate::registry::{KeyRegistry, Subscription};

/// The interface a store implements to take part in synchronization.
pub trait SyncedStore: Send + Sync {
    /// Merge `partial` into the store's in-memory state.
    ///
    /// May be called twice with the same update when both the broadcast and
    /// storage paths deliver it, so the merge must be idempotent.
    fn set_state(&self, partial: Partial);

    /// Names of the fields this store persists.
    ///
    /// Evaluated on every incoming envelope.
    fn persisted_keys(&self) -> Vec<String>;
}

/// Filter an incoming value down to the fields a store persists.
fn filter_envelope<I, S>(key: &StorageKey, value: &Value, fields: I) -> Option<Partial>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let envelope = match PersistedEnvelope::from_value(value) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(%key, error = %e, "ignoring value that is not an envelope");
            return None;
        }
    };

    let partial = envelope.project(fields);
    if partial.is_none() {
        tracing::trace!(%key, "envelope carries none of the persisted fields");
    }
    partial
}

/// Subscribe `apply_partial` to envelopes for `key`, restricted to
/// `persisted_fields`.
pub fn attach<F>(
    registry: &KeyRegistry,
    key: impl Into<StorageKey>,
    apply_partial: F,
    persisted_fields: Vec<String>,
) -> Subscription
where
    F: Fn(Partial) + Send + Sync + 'static,
{
    let key = key.into();
    let handler_key = key.clone();
    registry.subscribe(key, move |value: &Value| {
        if let Some(partial) = filter_envelope(&handler_key, value, &persisted_fields) {
            apply_partial(partial);
        }
        Ok(())
    })
}

/// Subscribe a [`SyncedStore`] to envelopes for `key`.
pub fn attach_store<S>(registry: &KeyRegistry, key: impl Into<StorageKey>, store: Arc<S>) -> Subscription
where
    S: SyncedStore + ?Sized + 'static,
{
    let key = key.into();
    let handler_key = key.clone();
    registry.subscribe(key, move |value: &Value| {
        if let Some(partial) = filter_envelope(&handler_key, value, store.persisted_keys()) {
            store.set_state(partial);
        }
        Ok(())
    })
}
