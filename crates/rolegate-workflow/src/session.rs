//! Edit sessions.
//!
//! ```text
//!             validate            submit
//!   Loaded ─────────────► Validating ─────► Submitting ──► Committed
//!     ▲                      ▲                  │
//!     │ reload               │ validate         ├──► ConflictDetected
//!     │                      │                  │
//!     └──────────────────────┴──────────────────┴──► OutcomeUnknown (timeout)
//! ```
//!
//! A session pins the role version it loaded and submits against it. A
//! conflict never merges: the session re-reads the role, re-pins the fresh
//! version and keeps the administrator's proposal so it can be re-applied
//! deliberately. A timed-out submission may or may not have committed, so the
//! session refuses to submit again until it has been reloaded.

use rolegate_core::{ActorId, Error, GrantDiff, PermissionSet, Result, Role, RoleId};
use rolegate_store::{Commit, RoleStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::directory::IdentityDirectory;

// ============================================================================
// States and reports
// ============================================================================

/// Where an edit session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Role and grants fetched, version pinned
    Loaded,
    /// A proposal passed validation and is ready to submit
    Validating,
    /// Submission in flight
    Submitting,
    /// Proposal committed; the session is finished
    Committed,
    /// Somebody else committed first; fresh state has been loaded
    ConflictDetected,
    /// Submission timed out; must reload before anything else
    OutcomeUnknown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Validating => "validating",
            Self::Submitting => "submitting",
            Self::Committed => "committed",
            Self::ConflictDetected => "conflict-detected",
            Self::OutcomeUnknown => "outcome-unknown",
        };
        f.write_str(s)
    }
}

/// Non-blocking concern about a valid proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// The role would grant nothing
    EmptyGrantSet,
    /// The role would grant nothing while identities still hold it
    StrandsIdentities {
        /// Active identities assigned the role
        count: usize,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGrantSet => write!(f, "role would have no permissions"),
            Self::StrandsIdentities { count } => {
                write!(f, "{count} active identities would lose all permissions")
            }
        }
    }
}

/// Outcome of validating a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Changes relative to the loaded grants
    pub diff: GrantDiff,
    /// Warnings for the administrator to confirm
    pub warnings: Vec<ValidationWarning>,
}

/// Result of a submission that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The proposal is now the role's grant set
    Committed(Commit),
    /// Rejected as stale; the session now holds the fresh state
    Conflict {
        /// Role as it is now
        current: Role,
        /// Grants as they are now
        current_grants: PermissionSet,
        /// The proposal that was not applied
        proposal: PermissionSet,
    },
}

// ============================================================================
// EditSession
// ============================================================================

/// One administrator's edit of one role's grants.
pub struct EditSession {
    store: Arc<dyn RoleStore>,
    directory: Option<Arc<dyn IdentityDirectory>>,
    submit_timeout: Duration,
    state: SessionState,
    role: Role,
    grants: PermissionSet,
    proposal: Option<PermissionSet>,
    commit: Option<Commit>,
}

impl EditSession {
    pub(crate) async fn open(
        store: Arc<dyn RoleStore>,
        directory: Option<Arc<dyn IdentityDirectory>>,
        submit_timeout: Duration,
        role_id: &RoleId,
    ) -> Result<Self> {
        let (role, grants) = fetch(store.as_ref(), role_id).await?;
        tracing::debug!(role_id = %role.id, version = role.version, "Opened edit session");
        Ok(Self {
            store,
            directory,
            submit_timeout,
            state: SessionState::Loaded,
            role,
            grants,
            proposal: None,
            commit: None,
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Role as last loaded.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Grants as last loaded.
    pub fn current_grants(&self) -> &PermissionSet {
        &self.grants
    }

    /// Version submissions are made against.
    pub fn pinned_version(&self) -> u64 {
        self.role.version
    }

    /// Last validated proposal, kept across conflicts and reloads.
    pub fn proposal(&self) -> Option<&PermissionSet> {
        self.proposal.as_ref()
    }

    /// The commit, once the session is finished.
    pub fn commit(&self) -> Option<&Commit> {
        self.commit.as_ref()
    }

    /// Checks `proposed` against the catalog and the role's protection.
    ///
    /// Errors (`ImmutableRole`, `RoleRetired`, `UnknownPermission`) leave the
    /// session where it was; warnings do not block submission.
    pub async fn validate(&mut self, proposed: PermissionSet) -> Result<ValidationReport> {
        self.expect_state(
            &[
                SessionState::Loaded,
                SessionState::Validating,
                SessionState::ConflictDetected,
            ],
            "validate",
        )?;

        if self.role.is_system {
            return Err(Error::ImmutableRole {
                id: self.role.id.to_string(),
            });
        }
        if self.role.retired {
            return Err(Error::RoleRetired {
                id: self.role.id.to_string(),
            });
        }
        self.store.catalog().validate(&proposed)?;

        let mut warnings = Vec::new();
        if proposed.is_empty() {
            warnings.push(ValidationWarning::EmptyGrantSet);
            if let Some(directory) = &self.directory {
                let count = directory.active_identities(&self.role.id).await?;
                if count > 0 {
                    warnings.push(ValidationWarning::StrandsIdentities { count });
                }
            }
        }

        let report = ValidationReport {
            diff: GrantDiff::between(&self.grants, &proposed),
            warnings,
        };
        self.proposal = Some(proposed);
        self.state = SessionState::Validating;
        Ok(report)
    }

    /// Submits the validated proposal against the pinned version.
    ///
    /// A timeout moves the session to [`SessionState::OutcomeUnknown`] and
    /// returns `Timeout`; other store errors return the session to
    /// [`SessionState::Validating`].
    pub async fn submit(&mut self, actor: &ActorId) -> Result<SubmitOutcome> {
        self.expect_state(&[SessionState::Validating], "submit")?;
        let proposal = match &self.proposal {
            Some(p) => p.clone(),
            None => {
                return Err(Error::InvalidTransition {
                    state: self.state.to_string(),
                    operation: "submit",
                });
            }
        };

        self.state = SessionState::Submitting;
        let submitted = tokio::time::timeout(
            self.submit_timeout,
            self.store
                .replace_grants(&self.role.id, proposal.clone(), self.role.version, actor),
        )
        .await;

        match submitted {
            Ok(Ok(commit)) => {
                tracing::info!(
                    role_id = %self.role.id,
                    version = commit.version(),
                    actor = %actor,
                    "Committed role edit"
                );
                self.role = commit.role.clone();
                self.grants = proposal;
                self.commit = Some(commit.clone());
                self.state = SessionState::Committed;
                Ok(SubmitOutcome::Committed(commit))
            }
            Ok(Err(e)) if e.is_conflict() => {
                tracing::info!(role_id = %self.role.id, error = %e, "Role edit conflicted");
                if let Err(reload) = self.refetch().await {
                    self.state = SessionState::OutcomeUnknown;
                    return Err(reload);
                }
                self.state = SessionState::ConflictDetected;
                Ok(SubmitOutcome::Conflict {
                    current: self.role.clone(),
                    current_grants: self.grants.clone(),
                    proposal,
                })
            }
            Ok(Err(e)) => {
                self.state = SessionState::Validating;
                Err(e)
            }
            Err(_) => {
                let millis = self.submit_timeout.as_millis() as u64;
                tracing::warn!(
                    role_id = %self.role.id,
                    timeout_ms = millis,
                    "Role edit submission timed out; outcome unknown"
                );
                self.state = SessionState::OutcomeUnknown;
                Err(Error::Timeout {
                    operation: "submit grants",
                    millis,
                })
            }
        }
    }

    /// Re-reads the role and re-pins its version. The proposal is kept.
    pub async fn reload(&mut self) -> Result<()> {
        self.expect_state(
            &[
                SessionState::Loaded,
                SessionState::Validating,
                SessionState::ConflictDetected,
                SessionState::OutcomeUnknown,
            ],
            "reload",
        )?;
        self.refetch().await?;
        self.state = SessionState::Loaded;
        Ok(())
    }

    async fn refetch(&mut self) -> Result<()> {
        let (role, grants) = fetch(self.store.as_ref(), &self.role.id).await?;
        self.role = role;
        self.grants = grants;
        Ok(())
    }

    fn expect_state(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(Error::InvalidTransition {
            state: self.state.to_string(),
            operation,
        })
    }
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("role_id", &self.role.id)
            .field("state", &self.state)
            .field("pinned_version", &self.role.version)
            .finish()
    }
}

const FETCH_ATTEMPTS: usize = 3;

/// Reads a role and its grants at the same version.
async fn fetch(store: &dyn RoleStore, role_id: &RoleId) -> Result<(Role, PermissionSet)> {
    for _ in 0..FETCH_ATTEMPTS {
        let role = store.get_role(role_id).await?;
        let grants = store.effective_grants(role_id).await?;
        if grants.version == role.version {
            return Ok((role, grants.permissions.as_ref().clone()));
        }
    }
    Err(Error::storage(format!(
        "role '{role_id}' kept changing while it was being read"
    )))
}
