//! Subscriber registry.
//!
//! The registry is the only structure shared between the connection-handling
//! path and the production path. Readers take a snapshot and iterate it
//! without holding any lock, so a connection that registers or leaves while a
//! frame is in flight never blocks or corrupts the fan-out.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::SendError;
use crate::frame::EncodedFrame;

/// A connected consumer to which frames are pushed.
///
/// Implemented by the transport layer; the registry only holds a shared
/// handle while the subscriber is registered.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one encoded frame as a single message.
    async fn send(&self, frame: EncodedFrame) -> Result<(), SendError>;

    /// Whether the underlying connection is still open.
    fn is_open(&self) -> bool {
        true
    }

    /// Called once the broadcaster has dropped this subscriber from the
    /// registry after a failed or timed out send. The transport should close
    /// the connection.
    fn evict(&self) {}
}

/// Identifier handed out on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Concurrent set of live subscribers.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<dyn Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber; it receives every frame broadcast after this call.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, subscriber);
        debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber registered");
        id
    }

    /// Remove a subscriber. Removing an unknown id is a no-op and returns `false`.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber unregistered");
        }
        removed
    }

    /// Point-in-time copy of the registered subscribers.
    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn Subscriber>)> {
        self.subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
