//! # tabsync storage
//!
//! Storage abstraction for tabsync. A trait-based interface over a string
//! key-value primitive with SQLite and in-memory implementations, plus a
//! host that shares one backend between instances and emits change
//! notifications.
//!
//! ## Key Types
//!
//! - [`Storage`] - The synchronous key-value trait (`get_item`, `set_item`, `remove_item`)
//! - [`SqliteStorage`] - SQLite-based persistent storage
//! - [`MemoryStorage`] - In-memory storage for tests
//! - [`StorageHost`] - One backend shared by several instances
//! - [`StorageEvent`] - A change made by another instance
//! - [`queue`] - Bounded inbound queues that evict the oldest item when full
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabsync_storage::{SqliteStorage, Storage, StorageHost};
//!
//! let host = StorageHost::new(SqliteStorage::open("tabsync.db").unwrap());
//! let (tab_a, _a_events) = host.attach();
//! let (_tab_b, b_events) = host.attach();
//!
//! tab_a.set_item("store:profile", r#"{"state":{"name":"Ana"}}"#).unwrap();
//! let event = b_events.try_recv().unwrap();
//! assert_eq!(event.new_value.as_deref(), Some(r#"{"state":{"name":"Ana"}}"#));
//! ```

pub mod error;
pub mod host;
pub mod memory;
pub mod migration;
pub mod queue;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StorageError};
pub use host::{HostedStorage, StorageEvent, StorageEvents, StorageHost, DEFAULT_EVENT_CAPACITY};
pub use memory::MemoryStorage;
pub use queue::{Pushed, QueueReceiver, QueueSender, TryRecvError};
pub use sqlite::SqliteStorage;
pub use traits::Storage;
