//! Garbage collection of owned objects the declarations no longer reference
//!
//! Runs in four phases, each a concurrent batch of independent requests:
//! 1. Items anywhere that show a dangling source
//! 2. Owned filters no longer declared on objects that stay
//! 3. Dangling inputs
//! 4. Dangling scenes
//!
//! Objects without an ownership record are never touched. Records a sync
//! failed to write are retried first, so objects it created are not missed.
//! Failed deletions are collected in the report and retried naturally by the
//! next pass.

use crate::error::SyncError;
use crate::ledger::OwnershipRecord;
use crate::session::Session;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};

/// A deletion that failed during [`Session::clean`]
#[derive(Debug)]
pub struct CleanFailure {
    /// Remote name of the object, `scene#id` for items, `parent/filter` for filters
    pub object: String,
    pub error: SyncError,
}

/// Outcome of a garbage collection pass
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Removed items as `(scene, item id)`
    pub removed_items: Vec<(String, i64)>,
    /// Removed filters as `(parent, filter)`
    pub removed_filters: Vec<(String, String)>,
    pub removed_inputs: Vec<String>,
    pub removed_scenes: Vec<String>,
    pub failures: Vec<CleanFailure>,
}

impl CleanReport {
    /// True if every deletion succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of removed objects
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed_items.len()
            + self.removed_filters.len()
            + self.removed_inputs.len()
            + self.removed_scenes.len()
    }

    /// Turn collected failures into an error
    ///
    /// # Errors
    /// [`SyncError::Clean`] with one entry per failed deletion.
    pub fn into_result(self) -> Result<Self, SyncError> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        let errors = self.failures.into_iter().map(|f| f.error).collect();
        Err(SyncError::Clean { errors })
    }

    fn fail(&mut self, object: impl Into<String>, error: impl Into<SyncError>) {
        let object = object.into();
        let error = error.into();
        tracing::warn!("Clean of {} failed: {}", object, error);
        self.failures.push(CleanFailure { object, error });
    }
}

impl Session {
    /// Delete every owned object the declaration graph no longer references
    ///
    /// # Errors
    /// Only if the scene or input list cannot be fetched. Individual deletion
    /// failures are reported in [`CleanReport::failures`].
    pub async fn clean(&mut self) -> Result<CleanReport, SyncError> {
        tracing::info!("Collecting unreferenced objects");
        let mut report = CleanReport::default();
        // Records queued by a failed sync must land before ownership is read
        for (name, e) in self.flush_unrecorded().await {
            report.fail(name, e);
        }

        let (scenes, inputs) =
            futures::try_join!(self.remote.scene_list(), self.remote.input_list())?;
        let inputs: Vec<String> = inputs.into_iter().map(|i| i.name).collect();
        let referenced = self.referenced();

        let names: Vec<&String> = scenes.iter().chain(inputs.iter()).collect();
        let reads = join_all(names.iter().map(|name| self.ledger.read(name))).await;
        let mut records: HashMap<String, OwnershipRecord> = HashMap::new();
        for (name, read) in names.into_iter().zip(reads) {
            match read {
                Ok(Some(record)) if !record.is_empty() => {
                    records.insert(name.clone(), record);
                }
                Ok(_) => {}
                Err(e) => report.fail(name.as_str(), e),
            }
        }

        let is_owned = |name: &str| records.get(name).is_some_and(|r| r.owned);
        let dangling_scenes: Vec<String> = scenes
            .iter()
            .filter(|s| is_owned(s.as_str()) && !referenced.scenes.contains(s.as_str()))
            .cloned()
            .collect();
        let dangling_inputs: Vec<String> = inputs
            .iter()
            .filter(|i| is_owned(i.as_str()) && !referenced.inputs.contains(i.as_str()))
            .cloned()
            .collect();
        let dangling: HashSet<&str> = dangling_scenes
            .iter()
            .chain(dangling_inputs.iter())
            .map(String::as_str)
            .collect();
        tracing::debug!(
            "{} dangling input(s), {} dangling scene(s)",
            dangling_inputs.len(),
            dangling_scenes.len()
        );

        // Phase 1: items showing dangling sources
        if !dangling.is_empty() {
            let lists = join_all(scenes.iter().map(|s| self.remote.scene_item_list(s))).await;
            let mut stale = Vec::new();
            for (scene, list) in scenes.iter().zip(lists) {
                match list {
                    Ok(items) => stale.extend(
                        items
                            .into_iter()
                            .filter(|i| dangling.contains(i.source_name.as_str()))
                            .map(|i| (scene.clone(), i.id)),
                    ),
                    Err(e) => report.fail(scene.as_str(), SyncError::from_gateway(e, "scene", scene)),
                }
            }
            let results = join_all(
                stale
                    .iter()
                    .map(|(scene, id)| self.remote.remove_scene_item(scene, *id)),
            )
            .await;
            for ((scene, id), result) in stale.into_iter().zip(results) {
                match result {
                    Ok(()) => report.removed_items.push((scene, id)),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => report.fail(format!("{scene}#{id}"), e),
                }
            }
        }

        // Phase 2: owned filters no longer declared, on objects that stay
        let mut stale_filters = Vec::new();
        for (name, record) in &records {
            if dangling.contains(name.as_str()) {
                continue;
            }
            for filter in &record.owned_filter_names {
                if !referenced.declares_filter(name, filter) {
                    stale_filters.push((name.clone(), filter.clone()));
                }
            }
        }
        let results = join_all(
            stale_filters
                .iter()
                .map(|(parent, filter)| self.remote.remove_filter(parent, filter)),
        )
        .await;
        let mut trimmed: HashMap<String, OwnershipRecord> = HashMap::new();
        for ((parent, filter), result) in stale_filters.into_iter().zip(results) {
            match result {
                Err(e) if !e.is_not_found() => {
                    report.fail(format!("{parent}/{filter}"), e);
                    continue;
                }
                Ok(()) => report.removed_filters.push((parent.clone(), filter.clone())),
                Err(_) => {}
            }
            if let Some(record) = records.get(&parent) {
                trimmed
                    .entry(parent)
                    .or_insert_with(|| record.clone())
                    .remove_filter(&filter);
            }
        }
        let writes = join_all(
            trimmed
                .iter()
                .map(|(name, record)| self.ledger.write(name, record)),
        )
        .await;
        for (name, result) in trimmed.keys().zip(writes) {
            if let Err(e) = result {
                report.fail(name.as_str(), e);
            }
        }

        // Phase 3: inputs
        let results = join_all(dangling_inputs.iter().map(|n| self.remote.remove_input(n))).await;
        let mut forgotten = Vec::new();
        for (name, result) in dangling_inputs.iter().zip(results) {
            match result {
                Ok(()) => {
                    tracing::info!("Removed input {}", name);
                    report.removed_inputs.push(name.clone());
                    forgotten.push(name.clone());
                }
                Err(e) => report.fail(name.as_str(), SyncError::from_gateway(e, "input", name)),
            }
        }

        // Phase 4: scenes
        let results = join_all(dangling_scenes.iter().map(|n| self.remote.remove_scene(n))).await;
        for (name, result) in dangling_scenes.iter().zip(results) {
            match result {
                Ok(()) => {
                    tracing::info!("Removed scene {}", name);
                    report.removed_scenes.push(name.clone());
                    forgotten.push(name.clone());
                }
                Err(e) => report.fail(name.as_str(), SyncError::from_gateway(e, "scene", name)),
            }
        }

        let forgets = join_all(forgotten.iter().map(|n| self.ledger.forget(n))).await;
        for (name, result) in forgotten.iter().zip(forgets) {
            if let Err(e) = result {
                report.fail(name.as_str(), e);
            }
        }
        for name in &forgotten {
            self.registry.remove(name);
            self.unrecorded.shift_remove(name.as_str());
        }

        tracing::info!(
            "Clean removed {} object(s), {} failure(s)",
            report.removed_count(),
            report.failures.len()
        );
        Ok(report)
    }
}
