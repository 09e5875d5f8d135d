//! # tabsync testkit
//!
//! Testing utilities for tabsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a shared storage host and broadcast hub that spawn connected instances
//! - **Generators**: Proptest strategies for keys, field names, store state and envelopes
//!
//! ## Test Fixtures
//!
//! ```rust
//! use std::sync::Arc;
//! use tabsync::Storage;
//! use tabsync_testkit::fixtures::{envelope_json, RecordingStore, TestHost};
//! use serde_json::json;
//!
//! let host = TestHost::new();
//! let writer = host.spawn();
//! let mut reader = host.spawn();
//!
//! let store = Arc::new(RecordingStore::new(&["name"]));
//! let _sub = reader.attach_store("store:profile", Arc::clone(&store));
//!
//! writer
//!     .storage()
//!     .set_item("store:profile", &envelope_json(json!({"name": "Ana"})))
//!     .unwrap();
//! reader.tick();
//!
//! assert_eq!(store.state(), json!({"name": "Ana"}));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tabsync_testkit::generators::{envelope, field_name};
//!
//! proptest! {
//!     #[test]
//!     fn projection_is_a_subset(env in envelope(), fields in prop::collection::vec(field_name(), 0..4)) {
//!         if let Some(partial) = env.project(&fields) {
//!             prop_assert!(partial.keys().all(|k| fields.contains(k)));
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{envelope_json, tick_all, RecordingStore, TestHost};
pub use generators::{envelope, field_name, state, storage_key};
