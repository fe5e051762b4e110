//! Ownership ledger
//!
//! Every object this program creates carries an ownership record so a later
//! run recognises it instead of re-creating it or treating it as foreign.
//!
//! Two backends are provided:
//! - [`RemoteLedger`]: the record lives in the object's private metadata slot
//!   on the remote, outside its declared settings
//! - [`FileLedger`]: a local JSON file, for remotes without a metadata channel

use crate::error::LedgerError;
use crate::protocol::Remote;
use async_trait::async_trait;
use scenesync_model::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Kind recorded for scenes
pub const SCENE_KIND: &str = "scene";

/// Ownership record attached to a remote object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    /// True if this program created the object itself
    pub owned: bool,
    /// Kind the object was created with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Filters on the object that this program created
    #[serde(default)]
    pub owned_filter_names: Vec<String>,
}

impl OwnershipRecord {
    /// Record for an object created by this program
    #[must_use]
    pub fn owned(kind: impl Into<String>) -> Self {
        Self {
            owned: true,
            kind: Some(kind.into()),
            owned_filter_names: Vec::new(),
        }
    }

    /// Record for a foreign object that only carries filters we created
    #[must_use]
    pub fn unowned() -> Self {
        Self::default()
    }

    /// Check if the filter `name` was created by this program
    #[inline]
    #[must_use]
    pub fn owns_filter(&self, name: &str) -> bool {
        self.owned_filter_names.iter().any(|n| n == name)
    }

    /// Mark `name` as owned; returns false if it already was
    pub fn add_filter(&mut self, name: &str) -> bool {
        if self.owns_filter(name) {
            return false;
        }
        self.owned_filter_names.push(name.to_string());
        true
    }

    /// Unmark `name`; returns false if it was not owned
    pub fn remove_filter(&mut self, name: &str) -> bool {
        let before = self.owned_filter_names.len();
        self.owned_filter_names.retain(|n| n != name);
        before != self.owned_filter_names.len()
    }

    /// True if the record asserts nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.owned && self.owned_filter_names.is_empty()
    }
}

/// Why an existing object is not ours to manage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignReason {
    /// Object exists with a different kind; never adoptable
    KindMismatch { found: String },
    /// Object exists with the right kind but no ownership record
    Unowned,
}

/// Classification of a remote object against a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Object does not exist and must be created
    Absent,
    /// Object exists, has the declared kind and is ours
    ///
    /// Filters on it that the record does not list are foreign and left alone.
    Owned(OwnershipRecord),
    /// Object exists but is not ours
    Foreign(ForeignReason),
}

/// Classify an object named by a declaration
///
/// `live_kind` is `None` when the object does not exist.
#[must_use]
pub fn classify(
    declared_kind: &str,
    live_kind: Option<&str>,
    record: Option<OwnershipRecord>,
) -> Ownership {
    let Some(live_kind) = live_kind else {
        return Ownership::Absent;
    };
    if live_kind != declared_kind {
        return Ownership::Foreign(ForeignReason::KindMismatch {
            found: live_kind.to_string(),
        });
    }
    match record {
        Some(record) if record.owned => Ownership::Owned(record),
        _ => Ownership::Foreign(ForeignReason::Unowned),
    }
}

/// Storage for ownership records
#[async_trait]
pub trait OwnershipLedger: Send + Sync + std::fmt::Debug {
    /// Record stored for `name`, if any
    async fn read(&self, name: &str) -> Result<Option<OwnershipRecord>, LedgerError>;

    /// Store `record` for `name`
    async fn write(&self, name: &str, record: &OwnershipRecord) -> Result<(), LedgerError>;

    /// Drop the record of a deleted object
    ///
    /// Records kept on the remote object disappear with it, so the default does nothing.
    async fn forget(&self, _name: &str) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Ledger stored in each object's private metadata on the remote
#[derive(Debug, Clone)]
pub struct RemoteLedger {
    remote: Remote,
    key: String,
}

impl RemoteLedger {
    /// Store records under `key` in the private metadata slot
    #[must_use]
    pub fn new(remote: Remote, key: impl Into<String>) -> Self {
        Self {
            remote,
            key: key.into(),
        }
    }
}

#[async_trait]
impl OwnershipLedger for RemoteLedger {
    async fn read(&self, name: &str) -> Result<Option<OwnershipRecord>, LedgerError> {
        let private = match self.remote.private_settings(name).await {
            Ok(private) => private,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(value) = private.get(&self.key) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| LedgerError::Malformed {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    async fn write(&self, name: &str, record: &OwnershipRecord) -> Result<(), LedgerError> {
        // Other tools may keep their own keys in the same slot
        let mut private = match self.remote.private_settings(name).await {
            Ok(private) => private,
            Err(e) if e.is_not_found() => Settings::new(),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::to_value(record).map_err(|e| LedgerError::Malformed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        private.insert(self.key.clone(), value);
        self.remote.set_private_settings(name, &private).await?;
        tracing::debug!("Wrote ownership record for {}", name);
        Ok(())
    }
}

/// Ledger kept in a local JSON file
///
/// Records are written through to disk on every change via a temp file and
/// rename, so a crash never leaves a half-written ledger.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    records: Mutex<BTreeMap<String, OwnershipRecord>>,
}

impl FileLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    /// [`LedgerError::Io`] on read failure, [`LedgerError::Malformed`] on bad content.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| LedgerError::Malformed {
                    name: path.display().to_string(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the ledger file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, OwnershipRecord>) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec_pretty(records).map_err(|e| LedgerError::Malformed {
            name: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl OwnershipLedger for FileLedger {
    async fn read(&self, name: &str) -> Result<Option<OwnershipRecord>, LedgerError> {
        Ok(self.records.lock().await.get(name).cloned())
    }

    async fn write(&self, name: &str, record: &OwnershipRecord) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        records.insert(name.to_string(), record.clone());
        self.persist(&records).await
    }

    async fn forget(&self, name: &str) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        if records.remove(name).is_some() {
            self.persist(&records).await?;
        }
        Ok(())
    }
}
