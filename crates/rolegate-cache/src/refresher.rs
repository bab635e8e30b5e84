//! Background task keeping a [`SnapshotCache`] current.
//!
//! The task reacts to these inputs:
//! - an invalidation event re-reads the named role
//! - a lag notice (events were dropped) triggers a full resync
//! - the end of the invalidation stream marks the snapshot stale and starts
//!   re-subscribing with exponential backoff; a resync follows once the new
//!   subscription is open
//! - the resync timer fires a full resync, which also retries stale roles
//!
//! The timer bounds staleness even when the bus silently loses events. A cache
//! that has not loaded yet, or whose load failed, is loaded by the task instead
//! of resynced.

use backon::{ExponentialBuilder, Retryable};
use futures::StreamExt;
use rolegate_core::{Error, Result};
use rolegate_store::{BusMessage, InvalidationBus, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::SnapshotCache;
use crate::health::CacheState;

/// Handle to a running refresher task. Dropping it also stops the task.
pub struct Refresher {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Refresher {
    /// Spawns the refresher on the current tokio runtime.
    ///
    /// `subscription` should be opened on `bus` before the cache is loaded so
    /// that no event falls between the two. `bus` is used to re-subscribe when
    /// the stream ends.
    pub fn spawn(
        cache: Arc<SnapshotCache>,
        bus: Arc<dyn InvalidationBus>,
        subscription: Subscription,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(cache, bus, subscription, shutdown_rx));
        Self { shutdown, task }
    }

    /// Returns `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Refresher task ended abnormally");
        }
    }
}

async fn run(
    cache: Arc<SnapshotCache>,
    bus: Arc<dyn InvalidationBus>,
    subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut subscription = Some(subscription);
    let mut ticker = tokio::time::interval(cache.config().resync_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    tracing::info!(
        resync_secs = cache.config().resync_interval().as_secs(),
        "Snapshot refresher started"
    );
    if needs_load(&cache) {
        // Failures leave the cache failed; the next tick tries again.
        let _ = cache.load().await;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            message = next_message(&mut subscription) => match message {
                Some(BusMessage::Invalidated(event)) => {
                    let cached = cache.snapshot().version_of(&event.role_id);
                    if !cached.is_some_and(|v| v >= event.version) {
                        // Failures are recorded as staleness and retried on
                        // the next resync.
                        let _ = cache.refresh_role(&event.role_id).await;
                    }
                }
                Some(BusMessage::Lagged(missed)) => {
                    tracing::warn!(missed, "Invalidation subscriber lagged; resyncing");
                    let _ = cache.resync().await;
                }
                None => {
                    tracing::warn!(
                        stale_for_ms = cache.stale_for().as_millis() as u64,
                        "Invalidation stream ended; re-subscribing"
                    );
                    cache.bus_disconnected();
                    subscription = None;
                }
            },
            resubscribed = resubscribe(bus.as_ref(), &cache), if subscription.is_none() => {
                match resubscribed {
                    Ok(stream) => {
                        subscription = Some(stream);
                        cache.bus_reconnected();
                        tracing::info!("Re-subscribed to invalidation bus");
                        // Catch up on whatever was published in between.
                        let _ = cache.resync().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Re-subscribe failed; retrying");
                    }
                }
            }
            _ = ticker.tick() => {
                if needs_load(&cache) {
                    let _ = cache.load().await;
                } else {
                    let _ = cache.resync().await;
                }
            }
        }
    }

    cache.health().set_state(CacheState::Stopped);
    tracing::info!("Snapshot refresher stopped");
}

fn needs_load(cache: &SnapshotCache) -> bool {
    matches!(
        cache.health().state(),
        CacheState::Loading | CacheState::Failed(_)
    )
}

async fn next_message(subscription: &mut Option<Subscription>) -> Option<BusMessage> {
    match subscription {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Opens a new subscription, backing off between attempts until one succeeds.
async fn resubscribe(bus: &dyn InvalidationBus, cache: &SnapshotCache) -> Result<Subscription> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(cache.config().retry_min_delay())
        .with_max_delay(cache.config().retry_max_delay())
        .without_max_times();
    (|| async { bus.subscribe().await })
        .retry(backoff)
        .notify(|e: &Error, after: Duration| {
            tracing::warn!(
                error = %e,
                retry_in_ms = after.as_millis() as u64,
                "Re-subscribe failed"
            );
        })
        .await
}
