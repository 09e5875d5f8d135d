//! Error types for tabsync instances.

use tabsync_core::DecodeError;
use tabsync_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during explicit instance operations.
///
/// Inbound sync traffic never produces these; it is logged and dropped.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored value could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result type for instance operations.
pub type Result<T> = std::result::Result<T, Error>;
