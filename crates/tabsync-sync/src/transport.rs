//! Broadcast transport abstraction.
//!
//! A transport is one instance's handle on a named same-host channel.
//! Publishing is synchronous and best-effort; frames that cannot be queued
//! are dropped. Receiving is a queue drained by the owning instance.

use async_trait::async_trait;
use tabsync_core::InstanceId;

use crate::error::Result;

/// Transport trait for publishing and receiving change frames.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Identity of the local instance.
    fn instance_id(&self) -> InstanceId;

    /// Send a frame to every other endpoint on the channel.
    ///
    /// Never delivers to the publishing endpoint itself.
    fn publish(&self, frame: &str) -> Result<()>;

    /// Take the next queued frame without waiting.
    fn try_recv(&self) -> Result<Option<String>>;

    /// Wait for the next frame.
    ///
    /// Returns `None` once the handle is closed or the platform has no
    /// broadcast primitive.
    async fn recv(&self) -> Option<String>;

    /// Close the handle. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// The shim used when the host has no broadcast primitive.
///
/// Publishing succeeds and goes nowhere; nothing is ever received.
#[derive(Debug, Clone, Copy)]
pub struct Unavailable {
    instance: InstanceId,
}

impl Unavailable {
    pub fn new(instance: InstanceId) -> Self {
        Self { instance }
    }
}

#[async_trait]
impl BroadcastTransport for Unavailable {
    fn instance_id(&self) -> InstanceId {
        self.instance
    }

    fn publish(&self, _frame: &str) -> Result<()> {
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn recv(&self) -> Option<String> {
        None
    }

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        true
    }
}

/// An in-process broadcast hub.
///
/// Stands in for the host's broadcast primitive: every instance that opens
/// the same channel name hears every other instance's frames.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, RwLock};
    use tabsync_storage::queue::{self, Pushed, QueueReceiver, QueueSender, TryRecvError};

    use crate::error::SyncError;

    struct Endpoint {
        serial: u64,
        instance: InstanceId,
        sender: QueueSender<String>,
    }

    /// Shared state for all channels on one host.
    #[derive(Default)]
    pub struct MemoryBroadcast {
        channels: RwLock<HashMap<String, Vec<Endpoint>>>,
        next_serial: AtomicU64,
    }

    impl MemoryBroadcast {
        /// Create a new hub.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Open a handle on channel `name` for `instance`.
        ///
        /// `capacity` bounds the handle's inbound queue; when it is full the
        /// oldest queued frame is evicted.
        pub fn open(self: &Arc<Self>, name: &str, instance: InstanceId, capacity: usize) -> MemoryChannel {
            let (tx, rx) = queue::channel(capacity);
            let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);

            if let Ok(mut channels) = self.channels.write() {
                channels.entry(name.to_owned()).or_default().push(Endpoint {
                    serial,
                    instance,
                    sender: tx,
                });
            }

            MemoryChannel {
                name: name.to_owned(),
                serial,
                instance,
                hub: Arc::clone(self),
                receiver: rx,
                closed: AtomicBool::new(false),
            }
        }

        /// Number of open handles on channel `name`.
        pub fn endpoints(&self, name: &str) -> usize {
            self.channels
                .read()
                .map(|channels| channels.get(name).map_or(0, Vec::len))
                .unwrap_or(0)
        }

        fn detach(&self, name: &str, serials: &[u64]) {
            if let Ok(mut channels) = self.channels.write() {
                if let Some(endpoints) = channels.get_mut(name) {
                    endpoints.retain(|e| !serials.contains(&e.serial));
                    if endpoints.is_empty() {
                        channels.remove(name);
                    }
                }
            }
        }
    }

    /// One instance's handle on a [`MemoryBroadcast`] channel.
    pub struct MemoryChannel {
        name: String,
        serial: u64,
        instance: InstanceId,
        hub: Arc<MemoryBroadcast>,
        receiver: QueueReceiver<String>,
        closed: AtomicBool,
    }

    impl MemoryChannel {
        pub fn channel_name(&self) -> &str {
            &self.name
        }
    }

    #[async_trait]
    impl BroadcastTransport for MemoryChannel {
        fn instance_id(&self) -> InstanceId {
            self.instance
        }

        fn publish(&self, frame: &str) -> Result<()> {
            if self.is_closed() {
                return Err(SyncError::ChannelClosed);
            }

            let mut gone = Vec::new();
            {
                let channels = self
                    .hub
                    .channels
                    .read()
                    .map_err(|e| SyncError::TransportError(e.to_string()))?;
                let Some(endpoints) = channels.get(&self.name) else {
                    return Ok(());
                };

                for endpoint in endpoints {
                    if endpoint.serial == self.serial || endpoint.instance == self.instance {
                        continue;
                    }
                    match endpoint.sender.push(frame.to_owned()) {
                        Pushed::Queued | Pushed::Superseded(_) | Pushed::Paused => {}
                        // Best-effort: a slow peer loses its oldest frame.
                        Pushed::Evicted => {
                            tracing::warn!(
                                channel = %self.name,
                                peer = %endpoint.instance,
                                "broadcast queue full, dropped oldest frame"
                            );
                        }
                        Pushed::Closed => gone.push(endpoint.serial),
                    }
                }
            }

            if !gone.is_empty() {
                self.hub.detach(&self.name, &gone);
            }
            Ok(())
        }

        fn try_recv(&self) -> Result<Option<String>> {
            match self.receiver.try_recv() {
                Ok(frame) => Ok(Some(frame)),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
            }
        }

        async fn recv(&self) -> Option<String> {
            if self.is_closed() {
                return None;
            }
            self.receiver.recv().await
        }

        fn close(&self) {
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            // Detaching drops our sender, which ends any pending `recv`.
            self.hub.detach(&self.name, &[self.serial]);
            tracing::debug!(channel = %self.name, instance = %self.instance, "channel closed");
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }

    impl Drop for MemoryChannel {
        fn drop(&mut self) {
            self.close();
        }
    }
}
