//! In-memory implementation of the Storage trait.
//!
//! Same semantics as SQLite but nothing survives the process. Used by tests
//! and by hosts that only need cross-instance sharing within one process.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::traits::Storage;

/// In-memory storage. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.read()?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.write()?;
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.write()?;
        items.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.write()?.clear();
        Ok(())
    }
}
