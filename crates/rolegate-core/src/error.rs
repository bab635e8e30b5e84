//! Error types for Rolegate.

/// Errors raised by the catalog, the role store, the cache and the edit
/// workflow.
///
/// None of these are fatal to the process: callers either re-fetch and retry
/// or surface the error to the administrator. Evaluation itself never fails.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Unknown role or permission reference
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up ("role", "permission")
        entity: &'static str,
        /// Identifier that was not found
        id: String,
    },

    /// Catalog registration collided with a different definition
    #[error("permission key '{key}' is already registered with a different definition")]
    DuplicateKey {
        /// Colliding permission key
        key: String,
    },

    /// Role creation collided with an existing id or name
    #[error("role {field} '{value}' already exists")]
    DuplicateRole {
        /// Which unique field collided ("id" or "name")
        field: &'static str,
        /// Value that collided
        value: String,
    },

    /// A grant set referenced keys absent from the catalog
    #[error("unknown permission keys: {}", keys.join(", "))]
    UnknownPermission {
        /// Keys that are not registered
        keys: Vec<String>,
    },

    /// Attempted edit of a system role
    #[error("role '{id}' is a system role and cannot be modified")]
    ImmutableRole {
        /// System role id
        id: String,
    },

    /// Attempted edit of a retired role
    #[error("role '{id}' is retired")]
    RoleRetired {
        /// Retired role id
        id: String,
    },

    /// Stale optimistic-concurrency token
    #[error("version conflict on role '{id}': expected {expected}, found {actual}")]
    VersionConflict {
        /// Role id
        id: String,
        /// Version presented by the caller
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Malformed permission key, role id or similar identifier
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        /// What kind of identifier ("permission key", "role id")
        kind: &'static str,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Edit session operation called in the wrong state
    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        /// Current session state
        state: String,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Operation did not finish in time; its outcome is unknown
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Timeout in milliseconds
        millis: u64,
    },

    /// Storage backend failure
    #[error("storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },
}

/// Convenience `Result` type alias for Rolegate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether this error is transient and worth retrying as-is.
    ///
    /// Domain errors (conflicts, unknown keys, immutable roles) are permanent
    /// until the caller changes its request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. } | Error::Io(_) | Error::Timeout { .. }
        )
    }

    /// Returns `true` for [`Error::VersionConflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }

    /// Creates a role-not-found error.
    pub fn role_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            entity: "role",
            id: id.into(),
        }
    }

    /// Creates a permission-not-found error.
    pub fn permission_not_found(key: impl Into<String>) -> Self {
        Error::NotFound {
            entity: "permission",
            id: key.into(),
        }
    }

    /// Creates a storage error with a message.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error with a message and source error.
    pub fn storage_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
