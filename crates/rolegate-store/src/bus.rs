//! Invalidation bus.
//!
//! The store publishes an [`InvalidationEvent`] after every committed
//! mutation; snapshot caches subscribe and re-fetch the affected role. Events
//! only say *which* role changed. Consumers always re-read the store rather
//! than trusting payload order, so events for different roles may arrive in
//! any order.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use rolegate_core::{Result, RoleId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// A role's grants changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Role that changed
    pub role_id: RoleId,
    /// Version committed by the change
    pub version: u64,
}

/// Item delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// A role changed
    Invalidated(InvalidationEvent),
    /// The subscriber fell behind and `n` events were dropped; it must
    /// resynchronise everything
    Lagged(u64),
}

/// Stream of bus messages for one subscriber.
pub type Subscription = BoxStream<'static, BusMessage>;

/// Publish/subscribe transport for invalidation events.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// Publishes an event to every current subscriber.
    async fn publish(&self, event: InvalidationEvent) -> Result<()>;

    /// Opens a new subscription. Only events published afterwards are seen.
    async fn subscribe(&self) -> Result<Subscription>;
}

/// In-process bus built on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<InvalidationEvent>,
}

impl LocalBus {
    /// Creates a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl InvalidationBus for LocalBus {
    async fn publish(&self, event: InvalidationEvent) -> Result<()> {
        if self.tx.send(event).is_err() {
            // Nobody listening is not a failure: there is no cache to notify.
            tracing::trace!("Invalidation published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let stream = BroadcastStream::new(self.tx.subscribe()).map(|item| match item {
            Ok(event) => BusMessage::Invalidated(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => BusMessage::Lagged(n),
        });
        Ok(stream.boxed())
    }
}
