//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tabsync::{
    HostedStorage, Instance, InstanceConfig, MemoryBroadcast, MemoryStorage, Partial,
    PersistedEnvelope, StorageHost, SyncedStore,
};

/// An instance attached to a [`TestHost`].
pub type TestInstance = Instance<HostedStorage<MemoryStorage>>;

/// One simulated host: a shared storage area plus a broadcast hub.
pub struct TestHost {
    pub storage: StorageHost<MemoryStorage>,
    pub hub: Arc<MemoryBroadcast>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            storage: StorageHost::new(MemoryStorage::new()),
            hub: MemoryBroadcast::new(),
        }
    }

    /// Spawn an instance connected to both the storage and the hub.
    pub fn spawn(&self) -> TestInstance {
        self.spawn_with(InstanceConfig::default())
    }

    pub fn spawn_with(&self, config: InstanceConfig) -> TestInstance {
        let instance = Instance::join(&self.storage, config);
        instance.connect(&self.hub);
        instance
    }

    /// Spawn an instance on a host with no broadcast primitive.
    pub fn spawn_without_broadcast(&self) -> TestInstance {
        let instance = Instance::join(&self.storage, InstanceConfig::default());
        instance.without_broadcast();
        instance
    }

    /// Spawn `count` connected instances.
    pub fn spawn_many(&self, count: usize) -> Vec<TestInstance> {
        (0..count).map(|_| self.spawn()).collect()
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick every instance once. Returns the total number of inbound items taken.
pub fn tick_all(instances: &mut [TestInstance]) -> usize {
    instances.iter_mut().map(Instance::tick).sum()
}

/// Encode `state` (a JSON object) as a stored envelope string.
///
/// # Panics
///
/// Panics if `state` is not an object.
pub fn envelope_json(state: Value) -> String {
    match state {
        Value::Object(state) => PersistedEnvelope::new(state).encode(),
        other => panic!("envelope state must be an object, got {other}"),
    }
}

/// A store that merges by overwriting fields and records every merge.
pub struct RecordingStore {
    fields: Vec<String>,
    state: Mutex<Partial>,
    merges: Mutex<Vec<Partial>>,
}

impl RecordingStore {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            state: Mutex::new(Partial::new()),
            merges: Mutex::new(Vec::new()),
        }
    }

    /// Current merged state.
    pub fn state(&self) -> Value {
        Value::Object(lock(&self.state).clone())
    }

    /// Every partial received, in order.
    pub fn merges(&self) -> Vec<Value> {
        lock(&self.merges).iter().cloned().map(Value::Object).collect()
    }

    pub fn merge_count(&self) -> usize {
        lock(&self.merges).len()
    }
}

impl SyncedStore for RecordingStore {
    fn set_state(&self, partial: Partial) {
        lock(&self.state).extend(partial.clone());
        lock(&self.merges).push(partial);
    }

    fn persisted_keys(&self) -> Vec<String> {
        self.fields.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
