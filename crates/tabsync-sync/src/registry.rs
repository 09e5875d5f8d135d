//! Key registry: storage key to the ordered list of interested callbacks.
//!
//! Dispatch snapshots the callback list and releases the lock before
//! invoking anything, so callbacks may subscribe or unsubscribe freely.
//! Each callback runs in isolation: an `Err` or a panic is logged and the
//! remaining callbacks still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tabsync_core::StorageKey;

/// A registered change handler.
pub type Callback = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

struct Registration {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct RegistryInner {
    entries: Mutex<HashMap<StorageKey, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<StorageKey, Vec<Registration>>> {
        // Callbacks never run under this lock, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, key: &StorageKey, id: u64) {
        let mut entries = self.entries();
        if let Some(registrations) = entries.get_mut(key) {
            registrations.retain(|r| r.id != id);
            if registrations.is_empty() {
                entries.remove(key);
            }
        }
    }
}

/// Outcome of one [`KeyRegistry::dispatch`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that were invoked.
    pub invoked: usize,
    /// Invoked callbacks that returned an error or panicked.
    pub failed: usize,
}

/// Mapping from storage key to registered callbacks.
///
/// Cheap to clone; clones share the same registrations.
#[derive(Clone, Default)]
pub struct KeyRegistry {
    inner: Arc<RegistryInner>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for changes to `key`.
    ///
    /// The same callback may be registered several times; it then runs once
    /// per registration.
    pub fn subscribe<F>(&self, key: impl Into<StorageKey>, callback: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.inner
            .entries()
            .entry(key.clone())
            .or_default()
            .push(Registration {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });

        tracing::trace!(%key, id, "subscribed");

        Subscription {
            key,
            id,
            active,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every callback registered for `key` with `value`, in
    /// registration order.
    pub fn dispatch(&self, key: &str, value: &Value) -> DispatchReport {
        let snapshot: Vec<(u64, Arc<AtomicBool>, Callback)> = match self.inner.entries().get(key) {
            Some(registrations) => registrations
                .iter()
                .map(|r| (r.id, Arc::clone(&r.active), Arc::clone(&r.callback)))
                .collect(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for (id, active, callback) in snapshot {
            // Unsubscribed by an earlier callback in this same dispatch.
            if !active.load(Ordering::Acquire) {
                continue;
            }

            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(key, id, error = %e, "sync callback failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(key, id, "sync callback panicked");
                }
            }
        }

        tracing::debug!(key, invoked = report.invoked, failed = report.failed, "dispatched");
        report
    }

    /// Remove every subscription.
    pub fn clear(&self) {
        let mut entries = self.inner.entries();
        for registration in entries.values().flatten() {
            registration.active.store(false, Ordering::Release);
        }
        entries.clear();
    }

    /// Number of live subscriptions for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.entries().get(key).map_or(0, Vec::len)
    }

    /// Number of keys with at least one subscription.
    pub fn key_count(&self) -> usize {
        self.inner.entries().len()
    }
}

/// Handle returned by [`KeyRegistry::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "a subscription stays registered until `unsubscribe` is called"]
pub struct Subscription {
    key: StorageKey,
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Remove this registration. Only the first call has an effect.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            inner.remove(&self.key, self.id);
            tracing::trace!(key = %self.key, id = self.id, "unsubscribed");
        }
    }

    /// Whether this registration can still be invoked.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn key(&self) -> &StorageKey {
        &self.key
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = Arc::clone(&log);
        let make = move |tag: &str| -> Box<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync> {
            let log = Arc::clone(&log_for);
            let tag = tag.to_owned();
            Box::new(move |value: &Value| {
                log.lock().unwrap().push(format!("{}:{}", tag, value));
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_dispatch_invokes_once_with_value() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let _sub = registry.subscribe("k", make("a"));

        let report = registry.dispatch("k", &json!(1));

        assert_eq!(report, DispatchReport { invoked: 1, failed: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["a:1"]);
    }

    #[test]
    fn test_dispatch_ignores_other_keys() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let _sub = registry.subscribe("other", make("a"));

        let report = registry.dispatch("k", &json!(1));

        assert_eq!(report.invoked, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let _first = registry.subscribe("k", make("first"));
        let _second = registry.subscribe("k", make("second"));

        registry.dispatch("k", &json!("v"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:\"v\"", "second:\"v\""]
        );
    }

    #[test]
    fn test_same_callback_registered_twice_runs_twice() {
        let registry = KeyRegistry::new();
        let count = Arc::new(AtomicU64::new(0));
        let callback = {
            let count = Arc::clone(&count);
            move |_: &Value| -> anyhow::Result<()> {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };

        let _a = registry.subscribe("k", callback.clone());
        let _b = registry.subscribe("k", callback);
        registry.dispatch("k", &json!(null));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let a = registry.subscribe("k", make("a"));
        let _b = registry.subscribe("k", make("b"));

        a.unsubscribe();
        a.unsubscribe();

        assert!(!a.is_active());
        assert_eq!(registry.subscriber_count("k"), 1);

        registry.dispatch("k", &json!(0));
        assert_eq!(*log.lock().unwrap(), vec!["b:0"]);
    }

    #[test]
    fn test_empty_entries_are_removed() {
        let registry = KeyRegistry::new();
        let sub = registry.subscribe("k", |_: &Value| Ok(()));
        assert_eq!(registry.key_count(), 1);

        sub.unsubscribe();
        assert_eq!(registry.key_count(), 0);
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let _err = registry.subscribe("k", |_: &Value| anyhow::bail!("boom"));
        let _panic = registry.subscribe("k", |_: &Value| -> anyhow::Result<()> {
            panic!("callback panic")
        });
        let _ok = registry.subscribe("k", make("ok"));

        let report = registry.dispatch("k", &json!(1));

        assert_eq!(report, DispatchReport { invoked: 3, failed: 2 });
        assert_eq!(*log.lock().unwrap(), vec!["ok:1"]);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_skips_later_callback() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let _first = {
            let later = Arc::clone(&later);
            registry.subscribe("k", move |_: &Value| {
                if let Some(sub) = later.lock().unwrap().as_ref() {
                    sub.unsubscribe();
                }
                Ok(())
            })
        };
        *later.lock().unwrap() = Some(registry.subscribe("k", make("later")));

        let report = registry.dispatch("k", &json!(1));

        assert_eq!(report.invoked, 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_after_clear_is_a_no_op() {
        let registry = KeyRegistry::new();
        let (log, make) = recorder();
        let sub = registry.subscribe("k", make("a"));

        registry.clear();
        let report = registry.dispatch("k", &json!(1));

        assert_eq!(report, DispatchReport::default());
        assert!(log.lock().unwrap().is_empty());
        assert!(!sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = KeyRegistry::new();
        let sub = registry.subscribe("k", |_: &Value| Ok(()));
        drop(registry);
        sub.unsubscribe();
    }

    proptest! {
        #[test]
        fn test_dispatch_reaches_live_subscribers_in_order(
            plan in prop::collection::vec((0usize..3, any::<bool>()), 1..16),
        ) {
            let keys = ["a", "b", "c"];
            let registry = KeyRegistry::new();
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut expected = vec![Vec::new(); keys.len()];
            let mut subs = Vec::new();

            for (id, (key, keep)) in plan.into_iter().enumerate() {
                let log = Arc::clone(&log);
                let sub = registry.subscribe(keys[key], move |_: &Value| {
                    log.lock().unwrap().push(id);
                    Ok(())
                });
                if keep {
                    expected[key].push(id);
                } else {
                    sub.unsubscribe();
                    sub.unsubscribe();
                }
                subs.push(sub);
            }

            for (index, key) in keys.iter().enumerate() {
                log.lock().unwrap().clear();
                let report = registry.dispatch(key, &json!(null));
                prop_assert_eq!(report.invoked, expected[index].len());
                prop_assert_eq!(log.lock().unwrap().clone(), expected[index].clone());
            }
        }
    }
}
