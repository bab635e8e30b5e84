//! [`InvalidationBus`] over Redis pub/sub.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use rolegate_core::config::BusConfig;
use rolegate_core::{Error, Result};
use rolegate_store::{BusMessage, InvalidationBus, InvalidationEvent, Subscription};
use std::fmt;

/// Redis-backed invalidation bus.
///
/// Publishing goes through a shared [`ConnectionManager`], which reconnects
/// on its own. Every subscription opens a dedicated pub/sub connection; when
/// that connection drops the subscription stream ends.
#[derive(Clone)]
pub struct RedisInvalidationBus {
    client: redis::Client,
    publisher: ConnectionManager,
    channel: String,
}

impl RedisInvalidationBus {
    /// Connects to `url` and publishes on `channel`.
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::storage_with_source(format!("invalid Redis URL '{url}'"), e))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| Error::storage_with_source("failed to connect to Redis", e))?;
        let channel = channel.into();

        tracing::info!(channel = %channel, "Connected Redis invalidation bus");
        Ok(Self {
            client,
            publisher,
            channel,
        })
    }

    /// Connects using the `[bus]` configuration section.
    pub async fn from_config(config: &BusConfig) -> Result<Self> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| Error::config("bus.redis_url is required for the redis bus"))?;
        Self::connect(url, config.channel.clone()).await
    }

    /// Channel events are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Debug for RedisInvalidationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisInvalidationBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InvalidationBus for RedisInvalidationBus {
    async fn publish(&self, event: InvalidationEvent) -> Result<()> {
        let payload = encode(&event)?;
        let mut conn = self.publisher.clone();
        let receivers: usize = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| Error::storage_with_source("failed to publish invalidation", e))?;

        tracing::trace!(
            role_id = %event.role_id,
            version = event.version,
            receivers,
            "Published invalidation"
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Error::storage_with_source("failed to open Redis pub/sub", e))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| {
                Error::storage_with_source(format!("failed to subscribe to '{}'", self.channel), e)
            })?;

        tracing::debug!(channel = %self.channel, "Subscribed to invalidations");
        let stream = pubsub.into_on_message().filter_map(|msg| {
            let message = decode(msg.get_payload_bytes()).map(BusMessage::Invalidated);
            async move { message }
        });
        Ok(stream.boxed())
    }
}

fn encode(event: &InvalidationEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Undecodable payloads are skipped; the next resync covers whatever they
/// were meant to announce.
fn decode(payload: &[u8]) -> Option<InvalidationEvent> {
    match serde_json::from_slice(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "Ignoring malformed invalidation payload"
            );
            None
        }
    }
}
