//! # tabsync core
//!
//! Pure primitives shared by every tabsync crate: storage keys, persisted
//! envelopes, broadcast messages, and the decode errors they can raise.
//!
//! This crate contains no I/O, no storage, no channels.
//!
//! ## Key Types
//!
//! - [`StorageKey`] - Identifier of one persisted document
//! - [`PersistedEnvelope`] - The `{state, ...metadata}` document stored under a key
//! - [`Partial`] - A subset of a store's fields, as applied by a merge
//! - [`SyncMessage`] - A `{key, value}` change notification between instances
//! - [`InstanceId`] - Identity of one running application instance

pub mod envelope;
pub mod error;
pub mod message;
pub mod types;

pub use envelope::{Partial, PersistedEnvelope, STATE_FIELD};
pub use error::DecodeError;
pub use message::SyncMessage;
pub use types::{InstanceId, StorageKey};
