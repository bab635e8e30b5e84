#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Rolegate Cache
//!
//! Lock-free snapshots of every role's effective grants for the request path.
//!
//! - [`SnapshotCache`]: the cache, an [`AccessEvaluator`](rolegate_core::AccessEvaluator)
//! - [`Snapshot`]: an immutable point-in-time view
//! - [`Refresher`]: background task applying invalidations and periodic resyncs
//! - [`CacheHealth`]: observable lifecycle state

pub mod cache;
pub mod health;
pub mod refresher;
pub mod snapshot;

pub use cache::SnapshotCache;
pub use health::{CacheHealth, CacheState};
pub use refresher::Refresher;
pub use snapshot::Snapshot;
