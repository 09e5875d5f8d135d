//! The Instance: composition root for one running copy of an application.
//!
//! Owns the sync context, the synced storage adapter, and the inbound queue
//! of native storage events, and drives both inbound paths into the key
//! registry.

use std::future::Future;
use std::sync::Arc;

use tabsync_core::{DecodeError, InstanceId, Partial, PersistedEnvelope, StorageKey};
use tabsync_storage::{HostedStorage, Storage, StorageEvent, StorageEvents, StorageHost};
use tabsync_sync::{
    bridge, BroadcastTransport, DispatchReport, MemoryBroadcast, StorageChangeListener,
    Subscription, SyncConfig, SyncContext, SyncedStorage, SyncedStore, Unavailable,
};

use crate::error::Result;

/// Configuration for an Instance.
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    /// Sync configuration.
    pub sync: SyncConfig,
    /// Replay the currently stored envelope to a key's subscribers whenever
    /// a store is attached to it.
    pub rehydrate_on_attach: bool,
}

/// One running instance of the application.
///
/// Provides:
/// - a [`Storage`] that persists and broadcasts writes
/// - attachment of stores to storage keys
/// - the inbound loop (`tick` or `run`) that applies remote changes
pub struct Instance<S: Storage> {
    id: InstanceId,
    config: InstanceConfig,
    context: SyncContext,
    storage: SyncedStorage<S>,
    listener: StorageChangeListener,
    events: Option<StorageEvents>,
}

impl<S: Storage> Instance<S> {
    /// Create an instance over `storage`.
    ///
    /// `events` is the storage's native change notification queue, if it
    /// has one. No transport is installed; see [`Instance::init_transport`].
    pub fn new(storage: S, events: Option<StorageEvents>, config: InstanceConfig) -> Self {
        let context = SyncContext::new(config.sync.clone());
        let listener = StorageChangeListener::new(context.registry().clone());
        Self {
            id: InstanceId::random(),
            storage: SyncedStorage::new(storage, context.clone()),
            config,
            context,
            listener,
            events,
        }
    }

    /// Install (or replace) the broadcast transport.
    ///
    /// Also resumes native storage events if a teardown paused them.
    pub fn init_transport<T>(&self, transport: T)
    where
        T: BroadcastTransport + 'static,
    {
        self.context.init(transport);
        if let Some(events) = &self.events {
            events.resume();
        }
    }

    /// Open this instance's handle on an in-process broadcast hub.
    pub fn connect(&self, hub: &Arc<MemoryBroadcast>) {
        let config = self.context.config();
        self.init_transport(hub.open(&config.channel_name, self.id, config.channel_capacity));
    }

    /// Mark the broadcast primitive as missing; only native storage events
    /// will propagate changes to this instance.
    pub fn without_broadcast(&self) {
        self.init_transport(Unavailable::new(self.id));
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// The storage every store of this instance should persist through.
    pub fn storage(&self) -> &SyncedStorage<S> {
        &self.storage
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Store Attachment
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply incoming envelopes for `key` through `apply_partial`, limited to
    /// `persisted_fields`.
    pub fn attach<F>(
        &self,
        key: impl Into<StorageKey>,
        apply_partial: F,
        persisted_fields: Vec<String>,
    ) -> Subscription
    where
        F: Fn(Partial) + Send + Sync + 'static,
    {
        let key = key.into();
        let subscription =
            bridge::attach(self.context.registry(), key.clone(), apply_partial, persisted_fields);
        self.after_attach(&key);
        subscription
    }

    /// Attach a [`SyncedStore`] to `key`.
    pub fn attach_store<T>(&self, key: impl Into<StorageKey>, store: Arc<T>) -> Subscription
    where
        T: SyncedStore + ?Sized + 'static,
    {
        let key = key.into();
        let subscription = bridge::attach_store(self.context.registry(), key.clone(), store);
        self.after_attach(&key);
        subscription
    }

    fn after_attach(&self, key: &StorageKey) {
        if !self.config.rehydrate_on_attach {
            return;
        }
        if let Err(e) = self.rehydrate(key.as_str()) {
            tracing::warn!(%key, error = %e, "rehydration on attach failed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist `envelope` under `key` (and publish it).
    pub fn persist(&self, key: &str, envelope: &PersistedEnvelope) -> Result<()> {
        self.storage.set_item(key, &envelope.encode())?;
        Ok(())
    }

    /// Dispatch the value currently stored under `key` to local subscribers.
    ///
    /// Returns `None` when nothing is stored under `key`.
    pub fn rehydrate(&self, key: &str) -> Result<Option<DispatchReport>> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(DecodeError::from)?;
        Ok(Some(self.context.registry().dispatch(key, &value)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound Loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply every queued inbound change without waiting.
    ///
    /// Returns the number of frames and storage events taken.
    pub fn tick(&mut self) -> usize {
        let frames = self.context.pump();
        let events = match self.events.as_ref() {
            Some(events) => self.listener.drain(events),
            None => 0,
        };
        frames + events
    }

    /// Apply inbound changes as they arrive until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut changes = self.context.transport_changes();
        let mut transport_open = self.context.is_initialized();
        let mut events_open = self.events.is_some();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                frame = self.context.next_frame(), if transport_open => match frame {
                    Some(frame) => {
                        self.context.handle_frame(&frame);
                    }
                    None => transport_open = false,
                },
                // The handle was closed or is silent; wait for the next init.
                changed = changes.changed(), if !transport_open => match changed {
                    Ok(()) => transport_open = self.context.is_initialized(),
                    Err(_) => break,
                },
                event = next_event(&self.events), if events_open => match event {
                    Some(event) => {
                        self.listener.handle(&event);
                    }
                    None => events_open = false,
                },
            }
        }

        tracing::debug!(instance = %self.id, "inbound loop stopped");
    }

    /// Close the transport handle and drop every subscription.
    ///
    /// Native storage events queued or arriving until the next
    /// [`init_transport`](Self::init_transport) are discarded.
    pub fn teardown(&self) {
        self.context.teardown();
        if let Some(events) = &self.events {
            let dropped = events.pause();
            tracing::debug!(instance = %self.id, dropped, "storage events paused");
        }
    }
}

impl<B: Storage> Instance<HostedStorage<B>> {
    /// Attach a new instance to a shared storage host.
    pub fn join(host: &StorageHost<B>, config: InstanceConfig) -> Self {
        let (storage, events) = host.attach();
        Self::new(storage, Some(events), config)
    }
}

async fn next_event(events: &Option<StorageEvents>) -> Option<StorageEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
