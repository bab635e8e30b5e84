//! TOML configuration.
//!
//! A config file seeds the permission catalog and the built-in roles, names
//! the anonymous role, and tunes the cache, the store and the invalidation
//! bus:
//!
//! ```toml
//! [[permissions]]
//! key = "view_grades"
//! category = "grades"
//! description = "Read grade books"
//!
//! [[roles]]
//! id = "teacher"
//! name = "Teacher"
//! grants = ["view_grades"]
//!
//! [access]
//! anonymous_role = "anonymous"
//!
//! [cache]
//! refresh_attempts = 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::PermissionCatalog;
use crate::error::{Error, Result};
use crate::types::{NewRole, Permission, PermissionKey, RoleId};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "ROLEGATE_CONFIG";

/// Id of the built-in system role.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Id of the built-in role used for unauthenticated callers.
pub const ANONYMOUS_ROLE: &str = "anonymous";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolegateConfig {
    /// Permission catalog seed
    pub permissions: Vec<Permission>,
    /// Roles created at bootstrap if absent
    pub roles: Vec<NewRole>,
    /// Access policy
    pub access: AccessConfig,
    /// Snapshot cache tuning
    pub cache: CacheConfig,
    /// Role store settings
    pub store: StoreConfig,
    /// Invalidation bus selection
    pub bus: BusConfig,
}

/// Access policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Role evaluated for callers without an identity. `None` denies them
    /// outright.
    pub anonymous_role: Option<RoleId>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            anonymous_role: RoleId::parse(ANONYMOUS_ROLE).ok(),
        }
    }
}

/// Snapshot cache tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Attempts per refresh before a role is marked stale
    pub refresh_attempts: usize,
    /// First retry delay
    pub retry_min_delay_ms: u64,
    /// Retry delay ceiling
    pub retry_max_delay_ms: u64,
    /// How often stale roles are retried in the background
    pub resync_interval_secs: u64,
    /// How long a caller waits for the first snapshot
    pub ready_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_attempts: 3,
            retry_min_delay_ms: 50,
            retry_max_delay_ms: 2_000,
            resync_interval_secs: 30,
            ready_timeout_ms: 5_000,
        }
    }
}

impl CacheConfig {
    /// First retry delay.
    pub fn retry_min_delay(&self) -> Duration {
        Duration::from_millis(self.retry_min_delay_ms)
    }

    /// Retry delay ceiling.
    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Background resync period.
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Wait for the first snapshot.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Role store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Journal directory; defaults to the platform data dir
    pub path: Option<PathBuf>,
    /// How long an edit submission may wait on the store
    pub submit_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            submit_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Resolved journal directory.
    pub fn journal_dir(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("rolegate").join("roles")))
    }

    /// Submission timeout.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

/// Which invalidation bus to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// In-process broadcast
    #[default]
    Local,
    /// Redis pub/sub
    Redis,
}

/// Invalidation bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus implementation
    pub kind: BusKind,
    /// Redis connection URL, required for [`BusKind::Redis`]
    pub redis_url: Option<String>,
    /// Channel name
    pub channel: String,
    /// Local broadcast buffer size
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::Local,
            redis_url: None,
            channel: "rolegate.invalidations".to_string(),
            capacity: 256,
        }
    }
}

impl Default for RolegateConfig {
    fn default() -> Self {
        let permission = |key: &str, category: &str, description: &str| Permission {
            key: PermissionKey::parse(key).unwrap_or_else(|_| unreachable!("static key")),
            category: category.to_string(),
            description: description.to_string(),
        };
        let role_id = |id: &str| RoleId::parse(id).unwrap_or_else(|_| unreachable!("static id"));

        Self {
            permissions: vec![
                permission("iam:roles:read", "iam", "View roles and their grants"),
                permission("iam:roles:update", "iam", "Edit role grants"),
                permission("iam:audit:read", "iam", "Read the audit log"),
            ],
            roles: vec![
                NewRole::new(role_id(SUPER_ADMIN_ROLE), "Super Admin").system(),
                NewRole::new(role_id(ANONYMOUS_ROLE), "Anonymous"),
            ],
            access: AccessConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl RolegateConfig {
    /// Project name used for directories and messages.
    pub fn project_name() -> &'static str {
        "rolegate"
    }

    /// Default config file location for this platform.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(Self::project_name()).join("config.toml"))
    }

    /// Resolves the config path: explicit argument, then `ROLEGATE_CONFIG`,
    /// then the platform default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var(CONFIG_ENV_VAR)
            && !p.is_empty()
        {
            return Some(PathBuf::from(p));
        }
        Self::default_config_path()
    }

    /// Loads and validates configuration.
    ///
    /// An explicitly named file must exist. When falling back to the default
    /// location, a missing file yields the built-in defaults.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit) else {
            tracing::debug!("No config directory on this platform, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            if explicit.is_some() {
                return Err(Error::config(format!(
                    "Config file does not exist: {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "Config file absent, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Loads and validates a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("Failed to load {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Checks cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        let catalog = self.build_catalog()?;

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for role in &self.roles {
            if !ids.insert(role.id.as_str()) {
                return Err(Error::config(format!("duplicate role id '{}'", role.id)));
            }
            if !names.insert(role.name.as_str()) {
                return Err(Error::config(format!("duplicate role name '{}'", role.name)));
            }
            if let Err(Error::UnknownPermission { keys }) = catalog.validate(&role.grants) {
                return Err(Error::config(format!(
                    "role '{}' grants unknown permissions: {}",
                    role.id,
                    keys.join(", ")
                )));
            }
        }

        if let Some(anonymous) = &self.access.anonymous_role {
            match self.roles.iter().find(|r| &r.id == anonymous) {
                None => {
                    return Err(Error::config(format!(
                        "anonymous role '{anonymous}' is not defined in [[roles]]"
                    )));
                }
                Some(role) if role.is_system => {
                    return Err(Error::config(format!(
                        "anonymous role '{anonymous}' must not be a system role"
                    )));
                }
                Some(role) if !role.grants.is_empty() => {
                    return Err(Error::config(format!(
                        "anonymous role '{anonymous}' must not seed any grants"
                    )));
                }
                Some(_) => {}
            }
        }

        if self.cache.refresh_attempts == 0 {
            return Err(Error::config("cache.refresh_attempts must be at least 1"));
        }
        if self.cache.resync_interval_secs == 0 {
            return Err(Error::config("cache.resync_interval_secs must be at least 1"));
        }
        if self.bus.kind == BusKind::Redis && self.bus.redis_url.is_none() {
            return Err(Error::config("bus.redis_url is required for the redis bus"));
        }
        Ok(())
    }

    /// Builds the permission catalog from `[[permissions]]`.
    pub fn build_catalog(&self) -> Result<PermissionCatalog> {
        let mut catalog = PermissionCatalog::new();
        for permission in &self.permissions {
            catalog.insert(permission.clone())?;
        }
        Ok(catalog)
    }
}

// ============================================================================
// Tests
// ============================================================================
