//! Synchronization context: the registry plus the transport handle.
//!
//! One context per instance, built by the composition root and passed by
//! reference to everything that publishes or subscribes. `init` installs a
//! transport handle; `teardown` closes it and clears the registry, leaving
//! the context as it was before `init`. Every `init` and `teardown` bumps a
//! generation counter that inbound loops watch to pick up a new handle.

use std::sync::{Arc, PoisonError, RwLock};

use tabsync_core::SyncMessage;
use tokio::sync::watch;

use crate::error::Result;
use crate::registry::{DispatchReport, KeyRegistry};
use crate::transport::BroadcastTransport;

/// Default broadcast channel name shared by every synchronized key.
pub const DEFAULT_CHANNEL_NAME: &str = "tabsync";

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Name of the broadcast channel all instances of one application share.
    pub channel_name: String,
    /// Inbound queue depth of the broadcast channel handle.
    pub channel_capacity: usize,
    /// Publish envelopes on every write. When false, only native storage
    /// events propagate changes.
    pub publish_on_write: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_owned(),
            channel_capacity: 256,
            publish_on_write: true,
        }
    }
}

type TransportHandle = Arc<dyn BroadcastTransport>;

struct ContextInner {
    config: SyncConfig,
    registry: KeyRegistry,
    transport: RwLock<Option<TransportHandle>>,
    generation: watch::Sender<u64>,
}

impl ContextInner {
    fn transport(&self) -> Option<TransportHandle> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_transport(&self, next: Option<TransportHandle>) -> Option<TransportHandle> {
        let mut slot = self.transport.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *slot, next);
        self.generation.send_modify(|generation| *generation += 1);
        previous
    }

    fn teardown(&self) {
        if let Some(previous) = self.replace_transport(None) {
            previous.close();
        }
        self.registry.clear();
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Shared synchronization state for one instance.
///
/// Cheap to clone; clones refer to the same registry and transport.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<ContextInner>,
}

impl SyncContext {
    /// Create a context with no transport installed.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config,
                registry: KeyRegistry::new(),
                transport: RwLock::new(None),
                generation: watch::channel(0).0,
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.inner.registry
    }

    /// Install the broadcast transport handle.
    ///
    /// A handle installed by an earlier `init` is closed and replaced.
    pub fn init<T>(&self, transport: T)
    where
        T: BroadcastTransport + 'static,
    {
        let instance = transport.instance_id();
        if let Some(previous) = self.inner.replace_transport(Some(Arc::new(transport))) {
            tracing::debug!(%instance, "replacing existing transport handle");
            previous.close();
        }
        tracing::info!(%instance, channel = %self.inner.config.channel_name, "sync context initialized");
    }

    /// Whether a transport handle is installed.
    pub fn is_initialized(&self) -> bool {
        self.inner.transport().is_some()
    }

    /// Close the transport handle and remove every subscription.
    pub fn teardown(&self) {
        self.inner.teardown();
        tracing::info!("sync context torn down");
    }

    /// Publish `message` to other instances.
    ///
    /// Returns `Ok(false)` when nothing was sent because no transport is
    /// installed or publishing is disabled.
    pub fn publish(&self, message: &SyncMessage) -> Result<bool> {
        if !self.inner.config.publish_on_write {
            return Ok(false);
        }
        let Some(transport) = self.inner.transport() else {
            return Ok(false);
        };
        transport.publish(&message.encode())?;
        Ok(true)
    }

    /// Decode one frame and dispatch it.
    pub fn receive(&self, frame: &str) -> Result<DispatchReport> {
        let message = SyncMessage::decode(frame)?;
        Ok(self.inner.registry.dispatch(message.key.as_str(), &message.value))
    }

    /// The process-wide inbound handler: like [`receive`](Self::receive),
    /// but malformed frames are logged and ignored.
    pub fn handle_frame(&self, frame: &str) -> Option<DispatchReport> {
        match self.receive(frame) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed broadcast frame");
                None
            }
        }
    }

    /// Handle every frame currently queued on the transport, without waiting.
    ///
    /// Returns the number of frames taken from the queue.
    pub fn pump(&self) -> usize {
        let Some(transport) = self.inner.transport() else {
            return 0;
        };

        let mut taken = 0;
        loop {
            match transport.try_recv() {
                Ok(Some(frame)) => {
                    taken += 1;
                    self.handle_frame(&frame);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "broadcast receive failed");
                    break;
                }
            }
        }
        taken
    }

    /// Watch for transport changes. The value changes on every `init` and
    /// `teardown`.
    pub fn transport_changes(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    /// Wait for the next inbound frame.
    ///
    /// Returns `None` when no transport is installed or it was closed.
    pub async fn next_frame(&self) -> Option<String> {
        let transport = self.inner.transport()?;
        transport.recv().await
    }
}
