//! Synced storage adapter.
//!
//! A drop-in [`Storage`] that behaves exactly like the storage it wraps,
//! and additionally publishes every write that holds a persisted envelope.
//! The write always lands first; nothing that happens while publishing can
//! fail or undo it.

use tabsync_core::{PersistedEnvelope, SyncMessage};
use tabsync_storage::{Result, Storage};

use crate::context::SyncContext;

/// Storage wrapper that broadcasts writes through a [`SyncContext`].
pub struct SyncedStorage<S> {
    inner: S,
    context: SyncContext,
}

impl<S: Storage> SyncedStorage<S> {
    pub fn new(inner: S, context: SyncContext) -> Self {
        Self { inner, context }
    }

    /// The wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Publish `value` if it decodes as an envelope. Returns whether a frame
    /// was sent.
    fn publish(&self, key: &str, value: &str) -> bool {
        let envelope = match PersistedEnvelope::decode(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(key, error = %e, "value is not an envelope, not publishing");
                return false;
            }
        };

        match self.context.publish(&SyncMessage::new(key, envelope.to_value())) {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(key, error = %e, "publish failed, write kept locally");
                false
            }
        }
    }
}

impl<S: Storage> Storage for SyncedStorage<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_item(key, value)?;
        self.publish(key, value);
        Ok(())
    }

    // Removals are not propagated to other instances.
    fn remove_item(&self, key: &str) -> Result<()> {
        self.inner.remove_item(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SyncConfig;
    use crate::transport::memory::{MemoryBroadcast, MemoryChannel};
    use crate::transport::BroadcastTransport;
    use serde_json::json;
    use tabsync_core::InstanceId;
    use tabsync_storage::MemoryStorage;

    fn setup() -> (SyncedStorage<MemoryStorage>, MemoryChannel) {
        let hub = MemoryBroadcast::new();
        let context = SyncContext::new(SyncConfig::default());
        context.init(hub.open("tabsync", InstanceId::random(), 8));
        let peer = hub.open("tabsync", InstanceId::random(), 8);
        (SyncedStorage::new(MemoryStorage::new(), context), peer)
    }

    #[test]
    fn test_envelope_write_is_persisted_and_published() {
        let (storage, peer) = setup();
        let raw = r#"{"state":{"name":"Ana"},"version":0}"#;

        storage.set_item("store:profile", raw).unwrap();

        assert_eq!(storage.get_item("store:profile").unwrap().as_deref(), Some(raw));
        let frame = peer.try_recv().unwrap().unwrap();
        let message = SyncMessage::decode(&frame).unwrap();
        assert_eq!(message.key.as_str(), "store:profile");
        assert_eq!(message.value, json!({"state": {"name": "Ana"}, "version": 0}));
    }

    #[test]
    fn test_non_json_write_is_persisted_but_not_published() {
        let (storage, peer) = setup();

        storage.set_item("k", "not json").unwrap();

        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("not json"));
        assert_eq!(peer.try_recv().unwrap(), None);
    }

    #[test]
    fn test_json_without_state_is_not_published() {
        let (storage, peer) = setup();

        storage.set_item("k", r#"{"theme":"dark"}"#).unwrap();

        assert_eq!(peer.try_recv().unwrap(), None);
    }

    #[test]
    fn test_remove_is_not_published() {
        let (storage, peer) = setup();
        storage.set_item("k", r#"{"state":{}}"#).unwrap();
        let _ = peer.try_recv().unwrap();

        storage.remove_item("k").unwrap();

        assert_eq!(storage.get_item("k").unwrap(), None);
        assert_eq!(peer.try_recv().unwrap(), None);
    }

    #[test]
    fn test_write_survives_closed_transport() {
        let hub = MemoryBroadcast::new();
        let context = SyncContext::new(SyncConfig::default());
        let channel = hub.open("tabsync", InstanceId::random(), 8);
        channel.close();
        context.init(channel);
        let storage = SyncedStorage::new(MemoryStorage::new(), context);

        storage.set_item("k", r#"{"state":{"a":1}}"#).unwrap();

        assert_eq!(
            storage.get_item("k").unwrap().as_deref(),
            Some(r#"{"state":{"a":1}}"#)
        );
    }

    #[test]
    fn test_works_without_transport() {
        let storage = SyncedStorage::new(
            MemoryStorage::new(),
            SyncContext::new(SyncConfig::default()),
        );
        storage.set_item("k", r#"{"state":{"a":1}}"#).unwrap();
        assert!(storage.get_item("k").unwrap().is_some());
    }
}
