//! Shared storage host with native change notifications.
//!
//! A [`StorageHost`] owns one backend and hands out a [`HostedStorage`]
//! handle per attached instance. Every write through one handle is
//! announced to every *other* attached handle as a [`StorageEvent`]; the
//! writer itself is never notified. Events are only emitted when the stored
//! value actually changes.
//!
//! Writes are serialized across handles, so events are emitted in commit
//! order. A queued event is replaced by a newer event for the same key, and
//! a clear replaces everything queued before it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tabsync_core::StorageKey;

use crate::error::Result;
use crate::queue::{self, Pushed, QueueReceiver, QueueSender};
use crate::traits::Storage;

/// Default queue depth for each attached instance's event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A change made by another instance.
///
/// `key` is `None` when the whole storage was cleared; `new_value` is `None`
/// when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<StorageKey>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl StorageEvent {
    /// Whether this event makes `queued` obsolete.
    fn supersedes(&self, queued: &StorageEvent) -> bool {
        self.key.is_none() || self.key == queued.key
    }
}

/// Receiving side of an attached instance's change notifications.
pub type StorageEvents = QueueReceiver<StorageEvent>;

struct Listener {
    id: u64,
    sender: QueueSender<StorageEvent>,
}

struct HostShared<B> {
    backend: B,
    listeners: RwLock<Vec<Listener>>,
    writes: Mutex<()>,
}

impl<B> HostShared<B> {
    /// Serializes read-modify-notify sequences across handles.
    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to every listener except `origin`.
    fn notify(&self, origin: u64, event: StorageEvent) {
        let mut closed = Vec::new();

        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter().filter(|l| l.id != origin) {
                match listener
                    .sender
                    .push_superseding(event.clone(), |queued| event.supersedes(queued))
                {
                    Pushed::Queued | Pushed::Superseded(_) => {}
                    Pushed::Evicted => {
                        tracing::warn!(
                            listener = listener.id,
                            key = ?event.key,
                            "storage event queue full, dropped oldest event"
                        );
                    }
                    Pushed::Paused => {
                        tracing::trace!(listener = listener.id, "listener paused, event discarded");
                    }
                    Pushed::Closed => closed.push(listener.id),
                }
            }
        }

        if !closed.is_empty() {
            self.detach_many(&closed);
        }
    }

    fn detach_many(&self, ids: &[u64]) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.retain(|l| !ids.contains(&l.id));
        }
    }
}

/// One backend shared by several instances on the same host.
pub struct StorageHost<B> {
    shared: Arc<HostShared<B>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<B: Storage> StorageHost<B> {
    /// Create a host around `backend`.
    pub fn new(backend: B) -> Self {
        Self::with_capacity(backend, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a host whose per-instance event queues hold `capacity` events.
    pub fn with_capacity(backend: B, capacity: usize) -> Self {
        Self {
            shared: Arc::new(HostShared {
                backend,
                listeners: RwLock::new(Vec::new()),
                writes: Mutex::new(()),
            }),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Attach a new instance.
    ///
    /// Returns the instance's storage handle and the queue of changes made
    /// by other instances.
    pub fn attach(&self) -> (HostedStorage<B>, StorageEvents) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = queue::channel(self.capacity);

        if let Ok(mut listeners) = self.shared.listeners.write() {
            listeners.push(Listener { id, sender });
        }

        let handle = HostedStorage {
            id,
            shared: Arc::clone(&self.shared),
        };
        (handle, receiver)
    }

    /// Number of currently attached instances.
    pub fn attached(&self) -> usize {
        self.shared
            .listeners
            .read()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Direct access to the backend, bypassing notifications.
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }
}

/// An instance's view of a [`StorageHost`].
///
/// Detaches from the host when dropped.
pub struct HostedStorage<B> {
    id: u64,
    shared: Arc<HostShared<B>>,
}

impl<B> HostedStorage<B> {
    fn emit(&self, key: Option<StorageKey>, old_value: Option<String>, new_value: Option<String>) {
        if key.is_some() && old_value == new_value {
            return;
        }
        self.shared.notify(
            self.id,
            StorageEvent {
                key,
                old_value,
                new_value,
            },
        );
    }
}

impl<B: Storage> Storage for HostedStorage<B> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.shared.backend.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let _writes = self.shared.lock_writes();
        let old_value = self.shared.backend.get_item(key)?;
        self.shared.backend.set_item(key, value)?;
        self.emit(Some(key.into()), old_value, Some(value.to_owned()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let _writes = self.shared.lock_writes();
        let old_value = self.shared.backend.get_item(key)?;
        self.shared.backend.remove_item(key)?;
        if old_value.is_some() {
            self.emit(Some(key.into()), old_value, None);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _writes = self.shared.lock_writes();
        self.shared.backend.clear()?;
        self.emit(None, None, None);
        Ok(())
    }
}

impl<B> Drop for HostedStorage<B> {
    fn drop(&mut self) {
        self.shared.detach_many(&[self.id]);
    }
}
