//! Reconciler
//!
//! Diffs a [`SceneDeclaration`] against the live remote and issues the minimal
//! set of mutations to converge them.
//!
//! # Workflow
//! 1. Resolve the scene (create it if absent)
//! 2. Reconcile scene filters
//! 3. Fetch the live item list once
//! 4. For each declared item, in declaration order: resolve its source
//!    (registry, then ledger), patch settings, reconcile filters, apply placement
//! 5. Prune live items no declared item claimed, unless their source is
//!    declared but could not be placed on this pass
//!
//! Ownership records that fail to be written right after a create are queued
//! on the session and retried at the start of the next sync or clean.
//!
//! Nothing is rolled back on failure. Every step is idempotent, so a later
//! sync converges from wherever an earlier one stopped.

use crate::config::ForeignPolicy;
use crate::error::SyncError;
use crate::gateway::StatusClass;
use crate::handle::{Filter, Input, ItemPlacement, Scene, SceneItem};
use crate::ledger::{classify, ForeignReason, Ownership, OwnershipRecord, SCENE_KIND};
use crate::protocol::{settings_patch, LiveFilter, LiveInputSettings, LiveSceneItem};
use crate::session::Session;
use indexmap::IndexMap;
use scenesync_model::{
    FilterConfig, InputDeclaration, SceneDeclaration, SceneItemDeclaration, Settings,
    SourceDeclaration,
};
use std::collections::{HashMap, HashSet};

/// How to treat a declared filter that already exists but is not in the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExistingFilter {
    /// Input filters: foreign filters are never adopted implicitly
    Reject,
    /// Scene filters: leave as-is unless settings push is configured
    Leave,
}

/// Live items of the scene being synced and the ones already matched
struct LiveItems<'a> {
    items: &'a [LiveSceneItem],
    claimed: HashSet<i64>,
}

impl<'a> LiveItems<'a> {
    fn new(items: &'a [LiveSceneItem]) -> Self {
        Self {
            items,
            claimed: HashSet::new(),
        }
    }

    /// Claim the first unmatched live item showing `source`
    fn claim(&mut self, source: &str) -> Option<i64> {
        let id = self
            .items
            .iter()
            .find(|i| i.source_name == source && !self.claimed.contains(&i.id))
            .map(|i| i.id)?;
        self.claimed.insert(id);
        Some(id)
    }

    fn claim_new(&mut self, id: i64) {
        self.claimed.insert(id);
    }

    fn unclaimed(&self) -> impl Iterator<Item = &LiveSceneItem> {
        self.items.iter().filter(|i| !self.claimed.contains(&i.id))
    }

    /// Sources of the pre-existing items matched so far
    fn claimed_sources(&self) -> HashSet<&str> {
        self.items
            .iter()
            .filter(|i| self.claimed.contains(&i.id))
            .map(|i| i.source_name.as_str())
            .collect()
    }
}

fn input_label(kind: &str) -> String {
    format!("input of kind {kind}")
}

impl Session {
    /// Reconcile the remote against `declaration`
    ///
    /// Nested scenes are synced first. Errors of individual items do not stop
    /// their siblings; they are reported together once every item was tried.
    ///
    /// # Errors
    /// - [`SyncError::Model`] if the declaration is invalid (nothing is sent)
    /// - [`SyncError::Aggregate`] with one entry per failed item or filter
    /// - any error that prevents resolving a scene itself
    pub async fn sync(&mut self, declaration: &SceneDeclaration) -> Result<Scene, SyncError> {
        declaration.validate()?;
        tracing::info!("Syncing scene {}", declaration.name);
        self.declared
            .insert(declaration.name.clone(), declaration.clone());

        let mut errors: Vec<SyncError> = self
            .flush_unrecorded()
            .await
            .into_iter()
            .map(|(_, e)| e.into())
            .collect();
        let mut live_scenes: HashSet<String> = self.remote.scene_list().await?.into_iter().collect();
        let mut synced: HashMap<&str, &SceneDeclaration> = HashMap::new();
        let mut top = None;

        // Reversed pre-order puts every nested scene before its parent
        for scene in declaration.scenes().into_iter().rev() {
            if let Some(previous) = synced.get(scene.name.as_str()) {
                if *previous != scene {
                    errors.push(SyncError::conflict(
                        &scene.name,
                        "one declaration per scene",
                        "differing declarations under the same name",
                    ));
                }
                continue;
            }
            synced.insert(&scene.name, scene);

            let (handle, mut scene_errors) = self.sync_scene(scene, &mut live_scenes).await?;
            errors.append(&mut scene_errors);
            top = Some(handle);
        }

        if !errors.is_empty() {
            tracing::warn!(
                "Sync of {} finished with {} error(s)",
                declaration.name,
                errors.len()
            );
            return Err(SyncError::Aggregate {
                scene: declaration.name.clone(),
                errors,
            });
        }
        tracing::info!("Scene {} in sync", declaration.name);
        top.ok_or_else(|| SyncError::NotFound {
            what: "scene",
            name: declaration.name.clone(),
        })
    }

    async fn sync_scene(
        &mut self,
        declaration: &SceneDeclaration,
        live_scenes: &mut HashSet<String>,
    ) -> Result<(Scene, Vec<SyncError>), SyncError> {
        let name = declaration.name.as_str();
        let mut errors = Vec::new();

        let mut record = self.ensure_scene(name, live_scenes).await?;
        let before = record.clone();
        let filters = match self
            .sync_filters(name, &declaration.filters, &mut record, ExistingFilter::Leave)
            .await
        {
            Ok(filters) => filters,
            Err(e) => {
                errors.push(e);
                IndexMap::new()
            }
        };
        if record != before {
            if let Err(e) = self.persist(name, &record).await {
                errors.push(e);
            }
        }

        let live = self
            .remote
            .scene_item_list(name)
            .await
            .map_err(|e| SyncError::from_gateway(e, "scene", name))?;
        let mut live_items = LiveItems::new(&live);

        let mut items = IndexMap::new();
        for (key, item) in &declaration.items {
            match self.sync_item(name, item, &mut live_items, live_scenes).await {
                Ok(Some(handle)) => {
                    items.insert(key.clone(), handle);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Item {} of {} failed: {}", key, name, e);
                    errors.push(e);
                }
            }
        }

        if self.config.prune {
            self.prune(declaration, &live_items, &mut errors).await;
        }

        let scene = Scene::new(
            self.remote.clone(),
            name,
            items,
            filters,
            self.dynamic.clone(),
        );
        Ok((scene, errors))
    }

    /// Resolve the scene, creating it if absent; returns its ownership record
    async fn ensure_scene(
        &mut self,
        name: &str,
        live_scenes: &mut HashSet<String>,
    ) -> Result<OwnershipRecord, SyncError> {
        if live_scenes.contains(name) {
            return Ok(self.ledger.read(name).await?.unwrap_or_default());
        }
        match self.remote.create_scene(name).await {
            Ok(()) => {
                tracing::info!("Created scene {}", name);
                live_scenes.insert(name.to_string());
                let record = OwnershipRecord::owned(SCENE_KIND);
                self.persist(name, &record).await?;
                Ok(record)
            }
            Err(e) if e.is_already_exists() => {
                let scenes = self.remote.scene_list().await?;
                if scenes.iter().any(|s| s == name) {
                    tracing::debug!("Scene {} appeared concurrently", name);
                    live_scenes.insert(name.to_string());
                    Ok(self.ledger.read(name).await?.unwrap_or_default())
                } else {
                    Err(SyncError::conflict(name, "scene", "input with the same name"))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn sync_item(
        &mut self,
        scene: &str,
        item: &SceneItemDeclaration,
        live_items: &mut LiveItems<'_>,
        live_scenes: &HashSet<String>,
    ) -> Result<Option<SceneItem>, SyncError> {
        let id = match &item.source {
            SourceDeclaration::Scene(nested) => self.place(scene, &nested.name, live_items).await?,
            SourceDeclaration::Input(input) => {
                match self.sync_input(scene, input, live_items, live_scenes).await? {
                    Some(id) => id,
                    None => return Ok(None),
                }
            }
        };

        let handle = SceneItem::declared(self.remote.clone(), scene, item.source.name(), id);
        let placement = ItemPlacement {
            transform: item.transform.clone(),
            enabled: item.enabled,
            locked: item.locked,
            index: item.index,
        };
        handle.apply(&placement).await?;
        Ok(Some(handle))
    }

    /// Reuse a live item showing `source` or create one
    async fn place(
        &self,
        scene: &str,
        source: &str,
        live_items: &mut LiveItems<'_>,
    ) -> Result<i64, SyncError> {
        if let Some(id) = live_items.claim(source) {
            return Ok(id);
        }
        let id = self
            .remote
            .create_scene_item(scene, source)
            .await
            .map_err(|e| SyncError::from_gateway(e, "source", source))?;
        tracing::debug!("Added {} to {} as item {}", source, scene, id);
        live_items.claim_new(id);
        Ok(id)
    }

    /// Resolve the input behind an item; `None` if it was skipped as foreign
    async fn sync_input(
        &mut self,
        scene: &str,
        input: &InputDeclaration,
        live_items: &mut LiveItems<'_>,
        live_scenes: &HashSet<String>,
    ) -> Result<Option<i64>, SyncError> {
        let name = input.name.as_str();

        if let Some(registered) = self.registry.get(name).cloned() {
            if registered.kind() != input.kind {
                return Err(SyncError::conflict(
                    name,
                    input_label(&input.kind),
                    input_label(registered.kind()),
                ));
            }
            let id = self.place(scene, name, live_items).await?;
            self.refresh_registered(registered, input).await?;
            return Ok(Some(id));
        }

        if live_scenes.contains(name) {
            return Err(SyncError::conflict(name, input_label(&input.kind), "scene"));
        }

        let live = match self.lookup_input(input).await? {
            Some(live) => live,
            None => {
                match self
                    .remote
                    .create_input(scene, name, &input.kind, &input.settings)
                    .await
                {
                    Ok(id) => {
                        tracing::info!("Created input {} ({}) in {}", name, input.kind, scene);
                        live_items.claim_new(id);
                        self.adopt_created(input).await?;
                        return Ok(Some(id));
                    }
                    Err(e) if e.is_already_exists() => {
                        tracing::debug!("Input {} appeared concurrently, re-checking", name);
                        self.lookup_input(input).await?.ok_or_else(|| {
                            SyncError::conflict(name, input_label(&input.kind), "scene")
                        })?
                    }
                    Err(e) => return Err(SyncError::from_gateway(e, "scene", scene)),
                }
            }
        };

        let record = self.ledger.read(name).await?;
        let (mut record, adopted) = match classify(&input.kind, Some(live.kind.as_str()), record) {
            Ownership::Owned(record) => (record, false),
            Ownership::Absent => {
                return Err(SyncError::NotFound {
                    what: "input",
                    name: name.to_string(),
                })
            }
            Ownership::Foreign(reason) => {
                let found = match &reason {
                    ForeignReason::KindMismatch { found } => input_label(found),
                    ForeignReason::Unowned => {
                        format!("{} not created by this program", input_label(&live.kind))
                    }
                };
                match (self.config.foreign_policy, reason) {
                    (ForeignPolicy::Skip, _) => {
                        tracing::warn!("Skipping foreign input {}: found {}", name, found);
                        return Ok(None);
                    }
                    (ForeignPolicy::Adopt, ForeignReason::Unowned) => {
                        tracing::warn!("Adopting existing input {}", name);
                        (OwnershipRecord::owned(&input.kind), true)
                    }
                    _ => {
                        return Err(SyncError::conflict(name, input_label(&input.kind), found));
                    }
                }
            }
        };

        let id = self.place(scene, name, live_items).await?;
        let handle = Input::new(self.remote.clone(), name, &input.kind);
        let before = record.clone();
        let result = self
            .update_input(&handle, input, &live.settings, &mut record)
            .await;
        if adopted || record != before {
            self.persist(name, &record).await?;
        }
        result?;

        self.registry.register(handle, input.clone());
        Ok(Some(id))
    }

    /// Current kind and settings of the declared input, `None` if absent
    async fn lookup_input(
        &self,
        input: &InputDeclaration,
    ) -> Result<Option<LiveInputSettings>, SyncError> {
        match self.remote.input_settings(&input.name).await {
            Ok(live) => Ok(Some(live)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) if e.class() == StatusClass::WrongType => Err(SyncError::conflict(
                &input.name,
                input_label(&input.kind),
                "scene",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Record ownership of a freshly created input and build its filters
    ///
    /// The input is registered before anything else can fail, so a later pass
    /// of this session reuses it instead of classifying it as foreign.
    async fn adopt_created(&mut self, input: &InputDeclaration) -> Result<(), SyncError> {
        let name = input.name.as_str();
        let handle = Input::new(self.remote.clone(), name, &input.kind);
        // Filters count as applied only once they are built and recorded
        let mut partial = input.clone();
        partial.filters.clear();
        self.registry.register(handle.clone(), partial);

        let mut record = OwnershipRecord::owned(&input.kind);
        self.persist(name, &record).await?;

        let result = self
            .sync_filters(name, &input.filters, &mut record, ExistingFilter::Reject)
            .await;
        if !record.owned_filter_names.is_empty() {
            self.persist(name, &record).await?;
        }
        result?;

        self.registry.register(handle, input.clone());
        Ok(())
    }

    /// Re-apply a changed declaration to an input already synced by this session
    async fn refresh_registered(
        &mut self,
        registered: Input,
        input: &InputDeclaration,
    ) -> Result<(), SyncError> {
        let Some(applied) = self.registry.applied(input.name.as_str()).cloned() else {
            return Ok(());
        };
        if applied == *input {
            return Ok(());
        }

        let patch = settings_patch(&input.settings, &applied.settings);
        if !patch.is_empty() {
            tracing::debug!("Patching {} key(s) of {}", patch.len(), input.name);
            registered.set_settings(&patch).await?;
        }
        if applied.filters != input.filters {
            let mut record = self
                .ledger
                .read(&input.name)
                .await?
                .unwrap_or_else(|| OwnershipRecord::owned(&input.kind));
            let before = record.clone();
            let result = self
                .sync_filters(&input.name, &input.filters, &mut record, ExistingFilter::Reject)
                .await;
            if record != before {
                self.persist(&input.name, &record).await?;
            }
            result?;
        }

        self.registry.register(registered, input.clone());
        Ok(())
    }

    /// Patch settings of an existing owned input and reconcile its filters
    async fn update_input(
        &self,
        handle: &Input,
        input: &InputDeclaration,
        live_settings: &Settings,
        record: &mut OwnershipRecord,
    ) -> Result<(), SyncError> {
        let patch = settings_patch(&input.settings, live_settings);
        if patch.is_empty() {
            tracing::debug!("Settings of {} already converged", input.name);
        } else {
            tracing::debug!("Patching {} key(s) of {}", patch.len(), input.name);
            handle.set_settings(&patch).await?;
        }
        self.sync_filters(&input.name, &input.filters, record, ExistingFilter::Reject)
            .await?;
        Ok(())
    }

    /// Create missing filters and update owned ones on `parent`
    ///
    /// Newly created filters are added to `record` even if a later filter fails,
    /// so the caller can persist them before propagating the error.
    async fn sync_filters(
        &self,
        parent: &str,
        declared: &IndexMap<String, FilterConfig>,
        record: &mut OwnershipRecord,
        existing: ExistingFilter,
    ) -> Result<IndexMap<String, Filter>, SyncError> {
        let mut handles = IndexMap::new();
        if declared.is_empty() {
            return Ok(handles);
        }

        let live: HashMap<String, LiveFilter> = self
            .remote
            .filter_list(parent)
            .await
            .map_err(|e| SyncError::from_gateway(e, "source", parent))?
            .into_iter()
            .map(|f| (f.name.clone(), f))
            .collect();

        for (key, config) in FilterConfig::ordered(declared) {
            let label = format!("{}/{}", parent, config.name);
            let filter = Filter::new(self.remote.clone(), parent, &config.name, &config.kind);

            match live.get(&config.name) {
                None => {
                    self.remote
                        .create_filter(parent, &config.name, &config.kind, &config.settings)
                        .await
                        .map_err(|e| SyncError::from_gateway(e, "source", parent))?;
                    record.add_filter(&config.name);
                    tracing::debug!("Created filter {}", label);
                    if !config.enabled {
                        filter.set_enabled(false).await?;
                    }
                    if let Some(index) = config.index {
                        filter.set_index(index).await?;
                    }
                }
                Some(current) if current.kind != config.kind => {
                    return Err(SyncError::conflict(
                        label,
                        format!("filter of kind {}", config.kind),
                        format!("filter of kind {}", current.kind),
                    ));
                }
                Some(current) => {
                    let writable = record.owns_filter(&config.name)
                        || self.claim_foreign_filter(&label, existing, record, &config.name)?;
                    if !writable {
                        handles.insert(key.to_string(), filter);
                        continue;
                    }
                    update_filter(&filter, config, current).await?;
                }
            }
            handles.insert(key.to_string(), filter);
        }
        Ok(handles)
    }

    /// Decide whether an existing filter we did not create may be written to
    fn claim_foreign_filter(
        &self,
        label: &str,
        existing: ExistingFilter,
        record: &mut OwnershipRecord,
        name: &str,
    ) -> Result<bool, SyncError> {
        match (existing, self.config.foreign_policy) {
            (_, ForeignPolicy::Adopt) => {
                tracing::warn!("Adopting existing filter {}", label);
                record.add_filter(name);
                Ok(true)
            }
            (ExistingFilter::Leave, _) => {
                if self.config.push_existing_scene_filters {
                    Ok(true)
                } else {
                    tracing::debug!("Leaving pre-existing filter {} as-is", label);
                    Ok(false)
                }
            }
            (ExistingFilter::Reject, ForeignPolicy::Skip) => {
                tracing::warn!("Skipping foreign filter {}", label);
                Ok(false)
            }
            (ExistingFilter::Reject, ForeignPolicy::Fail) => Err(SyncError::ownership(
                label,
                "filter exists but was not created by this program",
            )),
        }
    }

    /// Remove live items no declared item claimed
    ///
    /// Items showing a declared source that could not be placed this pass
    /// (skipped as foreign, or failed) stay until a pass places that source.
    async fn prune(
        &self,
        declaration: &SceneDeclaration,
        live_items: &LiveItems<'_>,
        errors: &mut Vec<SyncError>,
    ) {
        let scene = declaration.name.as_str();
        let declared: HashSet<&str> = declaration
            .items
            .values()
            .map(|i| i.source.name())
            .collect();

        let placed = live_items.claimed_sources();

        let stale: Vec<&LiveSceneItem> = live_items
            .unclaimed()
            .filter(|i| {
                let source = i.source_name.as_str();
                !declared.contains(source) || placed.contains(source)
            })
            .filter(|i| !self.dynamic.contains(scene, i.id))
            .collect();

        for item in stale {
            match self.remote.remove_scene_item(scene, item.id).await {
                Ok(()) => tracing::info!(
                    "Pruned item {} ({}) from {}",
                    item.id,
                    item.source_name,
                    scene
                ),
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Item {} of {} already gone", item.id, scene);
                }
                Err(e) => errors.push(e.into()),
            }
        }
    }
}

async fn update_filter(
    filter: &Filter,
    config: &FilterConfig,
    current: &LiveFilter,
) -> Result<(), SyncError> {
    let patch = settings_patch(&config.settings, &current.settings);
    if !patch.is_empty() {
        filter.set_settings(&patch).await?;
    }
    if current.enabled != config.enabled {
        filter.set_enabled(config.enabled).await?;
    }
    if let Some(index) = config.index {
        filter.set_index(index).await?;
    }
    Ok(())
}
