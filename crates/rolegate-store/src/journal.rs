//! Durable role records.
//!
//! Each role is persisted as one JSON document holding the role row, its grant
//! rows and its audit rows. A document is written to a temporary file, synced
//! and renamed over the previous one, so a crash leaves either the old or the
//! new record on disk and never a mix of both.
//!
//! Writes are compare-and-swap. Each role has a `<role_id>.lock` file; the
//! writer holds an exclusive lock on it while it re-reads the stored record and
//! checks that the new version directly follows the stored one. Several stores
//! may therefore share one journal directory without losing updates.

use async_trait::async_trait;
use rolegate_core::{AuditEntry, Error, Grant, PermissionSet, Result, Role, RoleId};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Everything stored for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Role row
    pub role: Role,
    /// Grant rows, ordered by key
    pub grants: Vec<Grant>,
    /// Audit rows, oldest first
    pub audit: Vec<AuditEntry>,
}

impl RoleRecord {
    /// Keys of the stored grant rows.
    pub fn grant_keys(&self) -> PermissionSet {
        self.grants.iter().map(|g| g.key.clone()).collect()
    }
}

/// Persistence hook used by [`InMemoryRoleStore`](crate::InMemoryRoleStore).
///
/// `persist` is called with the complete new record before the in-memory copy
/// is replaced; if it fails the mutation is abandoned.
#[async_trait]
pub trait RoleJournal: Send + Sync {
    /// Loads every stored record.
    async fn load(&self) -> Result<Vec<RoleRecord>>;

    /// Loads the stored record for one role, if any.
    async fn load_one(&self, id: &RoleId) -> Result<Option<RoleRecord>>;

    /// Durably replaces the record for `record.role.id`.
    ///
    /// A version 1 record must be new. Any later version must directly follow
    /// the stored one; otherwise [`Error::VersionConflict`] is returned and
    /// nothing is written.
    async fn persist(&self, record: &RoleRecord) -> Result<()>;
}

/// Journal that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

#[async_trait]
impl RoleJournal for NullJournal {
    async fn load(&self) -> Result<Vec<RoleRecord>> {
        Ok(Vec::new())
    }

    async fn load_one(&self, _id: &RoleId) -> Result<Option<RoleRecord>> {
        Ok(None)
    }

    async fn persist(&self, _record: &RoleRecord) -> Result<()> {
        Ok(())
    }
}

/// Directory of `<role_id>.json` files.
#[derive(Debug, Clone)]
pub struct FileJournal {
    dir: PathBuf,
}

impl FileJournal {
    /// Opens (creating if needed) a journal directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::storage_with_source(format!("cannot create {}", dir.display()), e)
        })?;
        Ok(Self { dir })
    }

    /// Journal directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &RoleId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lock_path(&self, id: &RoleId) -> PathBuf {
        self.dir.join(format!("{id}.lock"))
    }

    fn read_record(path: &Path) -> Result<Option<RoleRecord>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| {
            Error::storage_with_source(format!("corrupt record {}", path.display()), e)
        })?;
        Ok(Some(record))
    }

    fn check_successor(stored: Option<&RoleRecord>, record: &RoleRecord) -> Result<()> {
        let id = &record.role.id;
        match stored {
            None if record.role.version == 1 => Ok(()),
            Some(_) if record.role.version == 1 => Err(Error::DuplicateRole {
                field: "id",
                value: id.to_string(),
            }),
            stored => {
                let actual = stored.map_or(0, |s| s.role.version);
                if actual + 1 == record.role.version {
                    Ok(())
                } else {
                    Err(Error::VersionConflict {
                        id: id.to_string(),
                        expected: record.role.version.saturating_sub(1),
                        actual,
                    })
                }
            }
        }
    }

    /// Blocking body of [`RoleJournal::persist`]. The role lock is released
    /// when `lock` is dropped.
    fn persist_locked(&self, record: &RoleRecord) -> Result<()> {
        let id = &record.role.id;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(id))?;
        lock.lock()?;

        let path = self.record_path(id);
        let stored = Self::read_record(&path)?;
        Self::check_successor(stored.as_ref(), record)?;

        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &path).map_err(|e| {
            Error::storage_with_source(format!("cannot replace {}", path.display()), e)
        })?;
        tracing::trace!(role_id = %id, version = record.role.version, "Persisted role record");
        Ok(())
    }
}

#[async_trait]
impl RoleJournal for FileJournal {
    async fn load(&self) -> Result<Vec<RoleRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let record: RoleRecord = serde_json::from_slice(&bytes).map_err(|e| {
                Error::storage_with_source(format!("corrupt record {}", path.display()), e)
            })?;
            let stem = path.file_stem().and_then(|s| s.to_str());
            if stem != Some(record.role.id.as_str()) {
                return Err(Error::storage(format!(
                    "record {} holds role '{}'",
                    path.display(),
                    record.role.id
                )));
            }
            records.push(record);
        }
        records.sort_by(|a, b| a.role.id.cmp(&b.role.id));
        tracing::debug!(dir = %self.dir.display(), count = records.len(), "Loaded role journal");
        Ok(records)
    }

    async fn load_one(&self, id: &RoleId) -> Result<Option<RoleRecord>> {
        let path = self.record_path(id);
        tokio::task::spawn_blocking(move || Self::read_record(&path))
            .await
            .map_err(|e| Error::storage_with_source("journal reader failed", e))?
    }

    async fn persist(&self, record: &RoleRecord) -> Result<()> {
        let journal = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || journal.persist_locked(&record))
            .await
            .map_err(|e| Error::storage_with_source("journal writer failed", e))?
    }
}
