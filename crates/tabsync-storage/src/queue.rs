//! Bounded inbound queues that favour the newest items.
//!
//! Every attached instance drains one of these for storage events, and one
//! for broadcast frames. When a queue is full the *oldest* queued item is
//! evicted, so a slow instance loses history but never the latest change.
//! A push may also name queued items it supersedes; those are removed
//! before the new item is appended.
//!
//! A receiver can be paused. While paused, pushes are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

pub use tokio::sync::mpsc::error::TryRecvError;

/// What happened to a pushed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    /// Appended without displacing anything.
    Queued,
    /// Appended after removing this many superseded items.
    Superseded(usize),
    /// Appended after evicting the oldest queued item.
    Evicted,
    /// Discarded because the receiver is paused.
    Paused,
    /// Discarded because the receiver is gone.
    Closed,
}

struct Slots<T> {
    items: VecDeque<T>,
    paused: bool,
}

struct Shared<T> {
    slots: Mutex<Slots<T>>,
    capacity: usize,
    notify: Notify,
    sender_closed: AtomicBool,
    receiver_closed: AtomicBool,
}

impl<T> Shared<T> {
    fn slots(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a queue holding at most `capacity` items.
pub fn channel<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let shared = Arc::new(Shared {
        slots: Mutex::new(Slots {
            items: VecDeque::new(),
            paused: false,
        }),
        capacity: capacity.max(1),
        notify: Notify::new(),
        sender_closed: AtomicBool::new(false),
        receiver_closed: AtomicBool::new(false),
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

/// Producing half of a queue.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueSender<T> {
    pub fn push(&self, item: T) -> Pushed {
        self.push_superseding(item, |_| false)
    }

    /// Push `item`, first removing every queued item for which `supersedes`
    /// returns true.
    pub fn push_superseding<F>(&self, item: T, supersedes: F) -> Pushed
    where
        F: Fn(&T) -> bool,
    {
        if self.is_closed() {
            return Pushed::Closed;
        }

        let outcome = {
            let mut slots = self.shared.slots();
            if slots.paused {
                return Pushed::Paused;
            }

            let before = slots.items.len();
            slots.items.retain(|queued| !supersedes(queued));
            let superseded = before - slots.items.len();

            let outcome = if slots.items.len() >= self.shared.capacity {
                slots.items.pop_front();
                Pushed::Evicted
            } else if superseded > 0 {
                Pushed::Superseded(superseded)
            } else {
                Pushed::Queued
            };
            slots.items.push_back(item);
            outcome
        };

        self.shared.notify.notify_one();
        outcome
    }

    /// Whether the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.receiver_closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.shared.sender_closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

/// Consuming half of a queue.
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueReceiver<T> {
    /// Take the oldest queued item without waiting.
    ///
    /// Queued items are still delivered after the sender is gone.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.shared.slots().items.pop_front() {
            Some(item) => Ok(item),
            None if self.shared.sender_closed.load(Ordering::Acquire) => {
                Err(TryRecvError::Disconnected)
            }
            None => Err(TryRecvError::Empty),
        }
    }

    /// Wait for the next item. Returns `None` once the sender is gone and
    /// the queue is empty.
    ///
    /// Cancel safe: an item is only taken when this resolves.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            match self.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => notified.await,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.slots().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything queued. Returns how many items were dropped.
    pub fn discard(&self) -> usize {
        let mut slots = self.shared.slots();
        let dropped = slots.items.len();
        slots.items.clear();
        dropped
    }

    /// Discard everything queued and refuse new items until [`resume`].
    ///
    /// Returns how many queued items were dropped.
    ///
    /// [`resume`]: QueueReceiver::resume
    pub fn pause(&self) -> usize {
        let mut slots = self.shared.slots();
        slots.paused = true;
        let dropped = slots.items.len();
        slots.items.clear();
        dropped
    }

    pub fn resume(&self) {
        self.shared.slots().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.shared.slots().paused
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        self.shared.receiver_closed.store(true, Ordering::Release);
    }
}
