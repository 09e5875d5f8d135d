//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
///
/// None of these ever reach a caller of `set_item`; they are logged at the
/// point where an inbound event or outbound publish is dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An inbound frame failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] tabsync_core::DecodeError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The channel handle was closed by teardown.
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
