//! Cache lifecycle state.
//!
//! [`CacheHealth`] is a cheap-to-clone handle over a watch channel, so an HTTP
//! health endpoint or a startup probe can observe the cache without touching
//! it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// CacheState
// ============================================================================

/// Lifecycle state of a snapshot cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// Initial full load has not finished.
    Loading,
    /// Snapshot is current as far as the cache knows.
    Ready,
    /// Serving, but some roles could not be refreshed.
    Degraded(String),
    /// Initial load failed; nothing is served.
    Failed(String),
    /// Background refresher has shut down.
    Stopped,
}

impl CacheState {
    /// Returns `true` if the cache is fully ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` if decisions can be served (Ready or Degraded).
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded(_))
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ============================================================================
// CacheHealth
// ============================================================================

/// Shared handle for observing and updating cache state.
#[derive(Clone)]
pub struct CacheHealth {
    tx: Arc<watch::Sender<CacheState>>,
}

impl CacheHealth {
    /// Creates a handle in [`CacheState::Loading`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CacheState::Loading);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> CacheState {
        self.tx.borrow().clone()
    }

    /// Updates the state, notifying subscribers only on an actual change.
    pub fn set_state(&self, state: CacheState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });
        if changed {
            tracing::info!(state = %state, "Snapshot cache state changed");
        }
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.tx.subscribe()
    }

    /// Waits until the cache is available, has failed, or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), String> {
        let mut rx = self.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    s if s.is_available() => return Ok(()),
                    CacheState::Failed(reason) => {
                        return Err(format!("snapshot cache failed: {reason}"));
                    }
                    CacheState::Stopped => return Err("snapshot cache stopped".to_string()),
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err("snapshot cache dropped".to_string());
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => Err(format!(
                "snapshot cache not ready after {timeout:?} (state: {})",
                self.state()
            )),
        }
    }
}

impl Default for CacheHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHealth")
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
