//! # tabsync sync
//!
//! Keeps independently running instances of an application consistent with
//! a shared key-value storage, without a server arbitrating writes.
//!
//! ## Overview
//!
//! Every write through a [`SyncedStorage`] is persisted first and then
//! published on the broadcast channel. Other instances receive the change
//! either as a broadcast frame or as a native [`StorageEvent`] from the
//! shared storage, dispatch it through their [`KeyRegistry`], and the
//! [`bridge`] merges the fields each store owns.
//!
//! ## Key Properties
//!
//! - **Durable first**: publishing can never fail or undo a write
//! - **Best-effort delivery**: dropped frames are recovered by the storage path or the next write
//! - **Isolated callbacks**: a failing subscriber never affects the others
//! - **Filtered merges**: a store only ever receives fields it persists
//!
//! ## Message Flow
//!
//! ```text
//! Instance A                                   Instance B
//!   set_item(k, v)
//!     |-- storage write ------------------------> StorageEvent{k, v}
//!     |-- publish {k, v} -----------------------> frame
//!                                                  |-- KeyRegistry::dispatch(k, v)
//!                                                  |-- bridge: project state -> set_state
//! ```

pub mod adapter;
pub mod bridge;
pub mod context;
pub mod error;
pub mod listener;
pub mod registry;
pub mod transport;

pub use adapter::SyncedStorage;
pub use bridge::{attach, attach_store, SyncedStore};
pub use context::{SyncConfig, SyncContext, DEFAULT_CHANNEL_NAME};
pub use error::{Result, SyncError};
pub use listener::StorageChangeListener;
pub use registry::{Callback, DispatchReport, KeyRegistry, Subscription};
pub use transport::{memory::MemoryBroadcast, memory::MemoryChannel, BroadcastTransport, Unavailable};

pub use tabsync_storage::{StorageEvent, StorageEvents};
