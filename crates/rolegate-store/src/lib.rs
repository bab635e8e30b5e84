#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Rolegate Store
//!
//! Persistence of roles and their grants with optimistic concurrency control.
//!
//! - [`RoleStore`]: the storage contract
//! - [`InMemoryRoleStore`]: per-role locked store, optionally backed by a
//!   [`RoleJournal`]
//! - [`FileJournal`]: one atomically written JSON record per role
//! - [`InvalidationBus`] / [`LocalBus`]: publish/subscribe change
//!   notifications consumed by snapshot caches
//! - [`bootstrap`]: idempotent seeding of configured roles

pub mod bootstrap;
pub mod bus;
pub mod journal;
pub mod memory;
pub mod store;

pub use bus::{BusMessage, InvalidationBus, InvalidationEvent, LocalBus, Subscription};
pub use journal::{FileJournal, NullJournal, RoleJournal, RoleRecord};
pub use memory::InMemoryRoleStore;
pub use store::{Commit, RoleStore};
