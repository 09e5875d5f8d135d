//! Storage change listener.
//!
//! Turns native [`StorageEvent`]s (writes made by other instances directly in
//! the shared storage) into registry dispatches. This path does not depend
//! on the broadcast transport, so it still works when the transport is
//! unavailable or dropped a frame.

use tabsync_storage::{StorageEvent, StorageEvents};

use crate::registry::{DispatchReport, KeyRegistry};

/// Forwards parsed storage events to a [`KeyRegistry`].
#[derive(Clone)]
pub struct StorageChangeListener {
    registry: KeyRegistry,
}

impl StorageChangeListener {
    pub fn new(registry: KeyRegistry) -> Self {
        Self { registry }
    }

    /// Handle one event.
    ///
    /// Returns `None` when the event was ignored: a removal, a clear, or a
    /// value that is not valid JSON.
    pub fn handle(&self, event: &StorageEvent) -> Option<DispatchReport> {
        let (Some(key), Some(raw)) = (&event.key, &event.new_value) else {
            tracing::trace!(key = ?event.key, "ignoring storage removal");
            return None;
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => Some(self.registry.dispatch(key.as_str(), &value)),
            Err(e) => {
                tracing::warn!(%key, error = %e, "dropping storage event with unparseable value");
                None
            }
        }
    }

    /// Handle every event currently queued, without waiting.
    ///
    /// Returns the number of events taken from the queue.
    pub fn drain(&self, events: &StorageEvents) -> usize {
        let mut taken = 0;
        while let Ok(event) = events.try_recv() {
            taken += 1;
            self.handle(&event);
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tabsync_core::StorageKey;
    use tabsync_storage::{MemoryStorage, Storage, StorageHost};

    fn event(key: Option<&str>, new_value: Option<&str>) -> StorageEvent {
        StorageEvent {
            key: key.map(StorageKey::from),
            old_value: None,
            new_value: new_value.map(str::to_owned),
        }
    }

    fn recording(registry: &KeyRegistry, key: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = registry.subscribe(key, move |v: &Value| {
            sink.lock().unwrap().push(v.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_forwards_parsed_value() {
        let registry = KeyRegistry::new();
        let seen = recording(&registry, "k");
        let listener = StorageChangeListener::new(registry);

        let report = listener.handle(&event(Some("k"), Some(r#"{"state":{"a":1}}"#)));

        assert_eq!(report.map(|r| r.invoked), Some(1));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"state": {"a": 1}})]);
    }

    #[test]
    fn test_ignores_removals_and_clears() {
        let registry = KeyRegistry::new();
        let seen = recording(&registry, "k");
        let listener = StorageChangeListener::new(registry);

        assert!(listener.handle(&event(Some("k"), None)).is_none());
        assert!(listener.handle(&event(None, None)).is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drops_unparseable_value() {
        let registry = KeyRegistry::new();
        let seen = recording(&registry, "k");
        let listener = StorageChangeListener::new(registry);

        assert!(listener.handle(&event(Some("k"), Some("not json"))).is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drain_from_host() {
        let host = StorageHost::new(MemoryStorage::new());
        let (writer, _writer_events) = host.attach();
        let (_reader, reader_events) = host.attach();

        let registry = KeyRegistry::new();
        let seen = recording(&registry, "k");
        let listener = StorageChangeListener::new(registry);

        writer.set_item("k", "oops{").unwrap();
        assert_eq!(listener.drain(&reader_events), 1);

        writer.set_item("k", "1").unwrap();
        writer.set_item("gone", "2").unwrap();
        writer.remove_item("gone").unwrap();

        // The removal replaced the pending write for "gone".
        assert_eq!(listener.drain(&reader_events), 2);
        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
    }
}
