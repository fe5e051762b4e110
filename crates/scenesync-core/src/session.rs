//! Sync session
//!
//! A [`Session`] is the single-owner context threaded through every `sync`
//! and `clean` call. It owns the instance registry and the in-memory
//! declaration graph; `&mut self` on both operations encodes the rule that a
//! session never runs two syncs at once.

use crate::config::SyncConfig;
use crate::error::{LedgerError, SyncError};
use crate::gateway::Gateway;
use crate::handle::DynamicItems;
use crate::ledger::{OwnershipLedger, OwnershipRecord, RemoteLedger};
use crate::protocol::Remote;
use crate::registry::InstanceRegistry;
use indexmap::IndexMap;
use scenesync_model::SceneDeclaration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Single-writer context for reconciling declarations against one remote
#[derive(Debug)]
pub struct Session {
    pub(crate) remote: Remote,
    pub(crate) ledger: Arc<dyn OwnershipLedger>,
    pub(crate) config: SyncConfig,
    pub(crate) registry: InstanceRegistry,
    /// Latest declaration synced per top-level scene name
    pub(crate) declared: IndexMap<String, SceneDeclaration>,
    pub(crate) dynamic: DynamicItems,
    /// Records of objects created by this session whose ledger write failed
    pub(crate) unrecorded: IndexMap<String, OwnershipRecord>,
}

impl Session {
    /// Create a session that keeps ownership records on the remote
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, config: SyncConfig) -> Self {
        let remote = Remote::new(gateway);
        let ledger = Arc::new(RemoteLedger::new(remote.clone(), config.ledger_key.clone()));
        Self::from_parts(remote, ledger, config)
    }

    /// Create a session with a custom ownership ledger
    #[must_use]
    pub fn with_ledger(
        gateway: Arc<dyn Gateway>,
        ledger: Arc<dyn OwnershipLedger>,
        config: SyncConfig,
    ) -> Self {
        Self::from_parts(Remote::new(gateway), ledger, config)
    }

    fn from_parts(remote: Remote, ledger: Arc<dyn OwnershipLedger>, config: SyncConfig) -> Self {
        Self {
            remote,
            ledger,
            config,
            registry: InstanceRegistry::new(),
            declared: IndexMap::new(),
            dynamic: DynamicItems::default(),
            unrecorded: IndexMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Typed client, for requests the core does not wrap
    #[inline]
    #[must_use]
    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Names of the top-level scenes synced so far
    pub fn declared_scenes(&self) -> impl Iterator<Item = &str> {
        self.declared.keys().map(String::as_str)
    }

    /// Drop a scene from the declaration graph
    ///
    /// The remote is not touched; the next [`clean`](Session::clean) treats the
    /// scene and anything only it referenced as dangling.
    pub fn forget_scene(&mut self, name: &str) -> bool {
        self.dynamic.forget_scene(name);
        self.declared.shift_remove(name).is_some()
    }

    /// Write `record`, keeping it for a retry if the write fails
    ///
    /// # Errors
    /// The ledger error; the record stays queued for [`Session::flush_unrecorded`].
    pub(crate) async fn persist(
        &mut self,
        name: &str,
        record: &OwnershipRecord,
    ) -> Result<(), SyncError> {
        match self.ledger.write(name, record).await {
            Ok(()) => {
                self.unrecorded.shift_remove(name);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Ownership record of {} not written, queued for retry: {}", name, e);
                self.unrecorded.insert(name.to_string(), record.clone());
                Err(e.into())
            }
        }
    }

    /// Retry queued ownership records; returns the writes that failed again
    ///
    /// Records of objects that no longer exist on the remote are dropped.
    pub(crate) async fn flush_unrecorded(&mut self) -> Vec<(String, LedgerError)> {
        let queued = std::mem::take(&mut self.unrecorded);
        let mut failures = Vec::new();
        for (name, record) in queued {
            match self.ledger.write(&name, &record).await {
                Ok(()) => tracing::info!("Recovered ownership record of {}", name),
                Err(LedgerError::Gateway(e)) if e.is_not_found() => {
                    tracing::debug!("{} is gone, dropping its queued record", name);
                }
                Err(e) => {
                    self.unrecorded.insert(name.clone(), record);
                    failures.push((name, e));
                }
            }
        }
        failures
    }

    /// Everything the current declaration graph references
    pub(crate) fn referenced(&self) -> Referenced {
        let mut referenced = Referenced::default();
        for top in self.declared.values() {
            for scene in top.scenes() {
                referenced
                    .filters
                    .entry(scene.name.clone())
                    .or_default()
                    .extend(scene.filters.values().map(|f| f.name.clone()));
                referenced.scenes.insert(scene.name.clone());
            }
            for input in top.inputs() {
                referenced
                    .filters
                    .entry(input.name.clone())
                    .or_default()
                    .extend(input.filters.values().map(|f| f.name.clone()));
                referenced.inputs.insert(input.name.clone());
            }
        }
        referenced
    }
}

/// Names referenced by the declaration graph
#[derive(Debug, Default)]
pub(crate) struct Referenced {
    pub(crate) scenes: HashSet<String>,
    pub(crate) inputs: HashSet<String>,
    /// Declared filter names per parent object
    pub(crate) filters: HashMap<String, HashSet<String>>,
}

impl Referenced {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.scenes.contains(name) || self.inputs.contains(name)
    }

    pub(crate) fn declares_filter(&self, parent: &str, filter: &str) -> bool {
        self.filters
            .get(parent)
            .is_some_and(|names| names.contains(filter))
    }
}
