//! Redis pub/sub transport for Rolegate invalidation events.
//!
//! Use this bus when several processes share one role store and each keeps
//! its own snapshot cache. Events are JSON objects published on a single
//! channel:
//!
//! ```json
//! {"role_id": "teacher", "version": 7}
//! ```
//!
//! Redis pub/sub delivers at most once and cannot report dropped messages, so
//! a subscriber never sees `BusMessage::Lagged`. The cache's periodic resync
//! bounds staleness instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;

pub use bus::RedisInvalidationBus;
