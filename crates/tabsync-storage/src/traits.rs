//! Storage trait: the abstract interface for the shared key-value primitive.
//!
//! Keys and values are always strings. The sync layer never looks inside a
//! value on the write path except to decide whether to publish it.

use std::sync::Arc;

use crate::error::Result;

/// A synchronous string key-value store.
///
/// Reads and writes are treated as fast local operations; none of them
/// block on another instance.
///
/// # Design Notes
///
/// - **Last write wins**: there is no versioning or compare-and-set.
/// - **Durable first**: `set_item` returns only after the backend holds the value.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Delete every key.
    fn clear(&self) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}
