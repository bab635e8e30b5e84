//! Wiring a role store from configuration.

use rolegate_core::config::{BusConfig, BusKind};
use rolegate_core::{Error, Result, RolegateConfig};
use rolegate_redis::RedisInvalidationBus;
use rolegate_store::bootstrap::seed_roles;
use rolegate_store::{FileJournal, InMemoryRoleStore, InvalidationBus, LocalBus, RoleStore};
use std::sync::Arc;

/// A configured store, ready for commands.
pub struct App {
    config: RolegateConfig,
    store: Arc<dyn RoleStore>,
    bus: Arc<dyn InvalidationBus>,
}

impl App {
    /// Opens the journal named by `[store]`, connects the configured bus and
    /// seeds any configured roles that do not exist yet.
    pub async fn open(config: RolegateConfig) -> Result<Self> {
        let catalog = Arc::new(config.build_catalog()?);
        let bus = connect_bus(&config.bus).await?;
        let dir = config.store.journal_dir().ok_or_else(|| {
            Error::config("could not determine a data directory; set store.path")
        })?;
        let journal = Arc::new(FileJournal::open(&dir).await?);

        let store = Arc::new(InMemoryRoleStore::open(catalog, bus.clone(), journal).await?);
        let created = seed_roles(store.as_ref(), &config.roles).await?;
        tracing::debug!(
            journal = %dir.display(),
            seeded = created.len(),
            "Role store ready"
        );

        Ok(Self { config, store, bus })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &RolegateConfig {
        &self.config
    }

    /// The role store.
    pub fn store(&self) -> &Arc<dyn RoleStore> {
        &self.store
    }

    /// The invalidation bus the store publishes on.
    pub fn bus(&self) -> &Arc<dyn InvalidationBus> {
        &self.bus
    }
}

async fn connect_bus(config: &BusConfig) -> Result<Arc<dyn InvalidationBus>> {
    match config.kind {
        BusKind::Local => Ok(Arc::new(LocalBus::new(config.capacity))),
        BusKind::Redis => Ok(Arc::new(RedisInvalidationBus::from_config(config).await?)),
    }
}
