//! # tabsync
//!
//! Keeps independently running instances of one application (tabs, windows,
//! processes on the same host) consistent with each other through a shared
//! key-value storage.
//!
//! ## Overview
//!
//! Each instance persists its stores as JSON envelopes (`{"state": {...}}`)
//! under string keys. Writes go through a [`SyncedStorage`], which persists
//! first and then announces the change on a same-host broadcast channel.
//! Every other instance learns of the change through that channel or through
//! the storage's own change notifications, and merges the fields its stores
//! own into their in-memory state.
//!
//! There is no server, no ordering and no conflict resolution: the storage
//! is the source of truth and delivery is best-effort.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabsync::{Instance, InstanceConfig, MemoryBroadcast, MemoryStorage, Storage, StorageHost};
//!
//! let host = StorageHost::new(MemoryStorage::new());
//! let hub = MemoryBroadcast::new();
//!
//! let writer = Instance::join(&host, InstanceConfig::default());
//! let mut reader = Instance::join(&host, InstanceConfig::default());
//! writer.connect(&hub);
//! reader.connect(&hub);
//!
//! let _sub = reader.attach(
//!     "store:profile",
//!     |partial| println!("merge {partial:?}"),
//!     vec!["name".to_owned()],
//! );
//!
//! writer
//!     .storage()
//!     .set_item("store:profile", r#"{"state":{"name":"Ana"}}"#)
//!     .unwrap();
//! reader.tick();
//! ```

pub mod error;
pub mod instance;

// Re-export the component crates.
pub use tabsync_core as core;
pub use tabsync_storage as storage;
pub use tabsync_sync as sync;

pub use error::{Error, Result};
pub use instance::{Instance, InstanceConfig};

pub use tabsync_core::{DecodeError, InstanceId, Partial, PersistedEnvelope, StorageKey, SyncMessage};
pub use tabsync_storage::{
    HostedStorage, MemoryStorage, SqliteStorage, Storage, StorageError, StorageEvent, StorageEvents,
    StorageHost,
};
pub use tabsync_sync::{
    BroadcastTransport, DispatchReport, KeyRegistry, MemoryBroadcast, Subscription, SyncConfig,
    SyncContext, SyncedStorage, SyncedStore, Unavailable,
};
