//! Runtime handles
//!
//! Handles are bound to a remote identity at creation time and only created by
//! the reconciler. Every mutation is a single request; nothing is cached
//! beyond what the most recent read returned.

use crate::error::SyncError;
use crate::protocol::Remote;
use indexmap::IndexMap;
use parking_lot::Mutex;
use scenesync_model::{Settings, Transform};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Items created through [`Scene::create_item`], by scene name
///
/// Shared between a session and the scene handles it returns so later syncs
/// do not prune runtime-created items.
#[derive(Debug, Clone, Default)]
pub(crate) struct DynamicItems(Arc<Mutex<HashMap<String, HashSet<i64>>>>);

impl DynamicItems {
    pub(crate) fn insert(&self, scene: &str, id: i64) {
        self.0.lock().entry(scene.to_string()).or_default().insert(id);
    }

    pub(crate) fn remove(&self, scene: &str, id: i64) {
        if let Some(ids) = self.0.lock().get_mut(scene) {
            ids.remove(&id);
        }
    }

    pub(crate) fn contains(&self, scene: &str, id: i64) -> bool {
        self.0
            .lock()
            .get(scene)
            .is_some_and(|ids| ids.contains(&id))
    }

    pub(crate) fn forget_scene(&self, scene: &str) {
        self.0.lock().remove(scene);
    }
}

/// Handle to a remote input
#[derive(Debug, Clone)]
pub struct Input {
    remote: Remote,
    name: String,
    kind: String,
}

impl Input {
    pub(crate) fn new(remote: Remote, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            remote,
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// Remote-unique name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind string
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Current settings as reported by the remote
    ///
    /// # Errors
    /// [`SyncError::NotFound`] if the input was removed out-of-band.
    pub async fn settings(&self) -> Result<Settings, SyncError> {
        self.remote
            .input_settings(&self.name)
            .await
            .map(|live| live.settings)
            .map_err(|e| SyncError::from_gateway(e, "input", &self.name))
    }

    /// Patch settings; keys not present in `patch` keep their value
    ///
    /// # Errors
    /// [`SyncError::NotFound`] or [`SyncError::Gateway`].
    pub async fn set_settings(&self, patch: &Settings) -> Result<(), SyncError> {
        self.remote
            .set_input_settings(&self.name, patch)
            .await
            .map_err(|e| SyncError::from_gateway(e, "input", &self.name))
    }

    /// Handle to a filter attached to this input
    #[must_use]
    pub fn filter(&self, name: impl Into<String>, kind: impl Into<String>) -> Filter {
        Filter::new(self.remote.clone(), self.name.clone(), name, kind)
    }
}

/// Handle to a filter attached to an input or a scene
#[derive(Debug, Clone)]
pub struct Filter {
    remote: Remote,
    parent: String,
    name: String,
    kind: String,
}

impl Filter {
    pub(crate) fn new(
        remote: Remote,
        parent: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            parent: parent.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// Filter name, unique within its parent
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the input or scene the filter is attached to
    #[inline]
    #[must_use]
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Kind string
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn label(&self) -> String {
        format!("{}/{}", self.parent, self.name)
    }

    /// Current settings as reported by the remote
    pub async fn settings(&self) -> Result<Settings, SyncError> {
        self.remote
            .filter(&self.parent, &self.name)
            .await
            .map(|f| f.settings)
            .map_err(|e| SyncError::from_gateway(e, "filter", &self.label()))
    }

    /// Patch settings
    pub async fn set_settings(&self, patch: &Settings) -> Result<(), SyncError> {
        self.remote
            .set_filter_settings(&self.parent, &self.name, patch)
            .await
            .map_err(|e| SyncError::from_gateway(e, "filter", &self.label()))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), SyncError> {
        self.remote
            .set_filter_enabled(&self.parent, &self.name, enabled)
            .await
            .map_err(|e| SyncError::from_gateway(e, "filter", &self.label()))
    }

    /// Move the filter within its parent's chain
    pub async fn set_index(&self, index: usize) -> Result<(), SyncError> {
        self.remote
            .set_filter_index(&self.parent, &self.name, index)
            .await
            .map_err(|e| SyncError::from_gateway(e, "filter", &self.label()))
    }
}

/// Transform and state for an item created outside the declaration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPlacement {
    pub transform: Option<Transform>,
    pub enabled: Option<bool>,
    pub locked: Option<bool>,
    pub index: Option<usize>,
}

impl ItemPlacement {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

#[derive(Debug, Clone)]
enum ItemOrigin {
    Declared,
    Dynamic(DynamicItems),
}

/// Handle to one placement of a source inside a scene
#[derive(Debug, Clone)]
pub struct SceneItem {
    remote: Remote,
    scene: String,
    source: String,
    id: i64,
    origin: ItemOrigin,
}

impl SceneItem {
    pub(crate) fn declared(remote: Remote, scene: &str, source: &str, id: i64) -> Self {
        Self {
            remote,
            scene: scene.to_string(),
            source: source.to_string(),
            id,
            origin: ItemOrigin::Declared,
        }
    }

    fn dynamic(remote: Remote, scene: &str, source: &str, id: i64, registry: DynamicItems) -> Self {
        Self {
            remote,
            scene: scene.to_string(),
            source: source.to_string(),
            id,
            origin: ItemOrigin::Dynamic(registry),
        }
    }

    /// Numeric item id, unique within the scene
    #[inline]
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn scene_name(&self) -> &str {
        &self.scene
    }

    #[inline]
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source
    }

    /// True if the item comes from a declaration
    #[inline]
    #[must_use]
    pub fn is_declared(&self) -> bool {
        matches!(self.origin, ItemOrigin::Declared)
    }

    fn label(&self) -> String {
        format!("{}#{}", self.scene, self.id)
    }

    fn map_err(&self, err: crate::gateway::GatewayError) -> SyncError {
        SyncError::from_gateway(err, "scene item", &self.label())
    }

    /// Current transform
    pub async fn transform(&self) -> Result<Transform, SyncError> {
        self.remote
            .scene_item_transform(&self.scene, self.id)
            .await
            .map_err(|e| self.map_err(e))
    }

    /// Write a partial transform
    ///
    /// Items whose source refuses transforms are left unchanged without error.
    pub async fn set_transform(&self, transform: &Transform) -> Result<(), SyncError> {
        match self
            .remote
            .set_scene_item_transform(&self.scene, self.id, transform)
            .await
        {
            Err(e) if e.is_not_mutable() => {
                tracing::debug!("Transform of {} not mutable, skipped: {}", self.label(), e);
                Ok(())
            }
            other => other.map_err(|e| self.map_err(e)),
        }
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), SyncError> {
        match self
            .remote
            .set_scene_item_enabled(&self.scene, self.id, enabled)
            .await
        {
            Err(e) if e.is_not_mutable() => {
                tracing::debug!("Visibility of {} not mutable, skipped: {}", self.label(), e);
                Ok(())
            }
            other => other.map_err(|e| self.map_err(e)),
        }
    }

    pub async fn set_locked(&self, locked: bool) -> Result<(), SyncError> {
        match self
            .remote
            .set_scene_item_locked(&self.scene, self.id, locked)
            .await
        {
            Err(e) if e.is_not_mutable() => {
                tracing::debug!("Lock of {} not mutable, skipped: {}", self.label(), e);
                Ok(())
            }
            other => other.map_err(|e| self.map_err(e)),
        }
    }

    pub async fn set_index(&self, index: usize) -> Result<(), SyncError> {
        self.remote
            .set_scene_item_index(&self.scene, self.id, index)
            .await
            .map_err(|e| self.map_err(e))
    }

    /// Apply every field that `placement` sets
    pub(crate) async fn apply(&self, placement: &ItemPlacement) -> Result<(), SyncError> {
        if let Some(transform) = placement.transform.as_ref().filter(|t| !t.is_empty()) {
            self.set_transform(transform).await?;
        }
        if let Some(enabled) = placement.enabled {
            self.set_enabled(enabled).await?;
        }
        if let Some(locked) = placement.locked {
            self.set_locked(locked).await?;
        }
        if let Some(index) = placement.index {
            self.set_index(index).await?;
        }
        Ok(())
    }

    /// Remove a runtime-created item from its scene
    ///
    /// Declared items are removed only by leaving them out of a later sync.
    ///
    /// # Errors
    /// [`SyncError::OwnershipViolation`] for declared items, without any remote call.
    pub async fn remove(self) -> Result<(), SyncError> {
        let ItemOrigin::Dynamic(registry) = &self.origin else {
            return Err(SyncError::ownership(
                self.label(),
                format!("remove on declared item showing {}", self.source),
            ));
        };
        self.remote
            .remove_scene_item(&self.scene, self.id)
            .await
            .map_err(|e| self.map_err(e))?;
        registry.remove(&self.scene, self.id);
        Ok(())
    }
}

/// Handle to a synced scene
#[derive(Debug, Clone)]
pub struct Scene {
    remote: Remote,
    name: String,
    items: IndexMap<String, SceneItem>,
    filters: IndexMap<String, Filter>,
    dynamic: DynamicItems,
}

impl Scene {
    pub(crate) fn new(
        remote: Remote,
        name: impl Into<String>,
        items: IndexMap<String, SceneItem>,
        filters: IndexMap<String, Filter>,
        dynamic: DynamicItems,
    ) -> Self {
        Self {
            remote,
            name: name.into(),
            items,
            filters,
            dynamic,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared item by key
    #[inline]
    #[must_use]
    pub fn item(&self, key: &str) -> Option<&SceneItem> {
        self.items.get(key)
    }

    /// Declared items in declaration order
    pub fn items(&self) -> impl Iterator<Item = (&str, &SceneItem)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Declared scene filter by key
    #[inline]
    #[must_use]
    pub fn filter(&self, key: &str) -> Option<&Filter> {
        self.filters.get(key)
    }

    /// Place an existing source in this scene outside the declaration
    ///
    /// The returned item is the only kind a caller may later
    /// [`remove`](SceneItem::remove); later syncs leave it in place.
    ///
    /// # Errors
    /// [`SyncError::NotFound`] if the scene or source does not exist.
    pub async fn create_item(
        &self,
        source: &str,
        placement: &ItemPlacement,
    ) -> Result<SceneItem, SyncError> {
        let id = self
            .remote
            .create_scene_item(&self.name, source)
            .await
            .map_err(|e| SyncError::from_gateway(e, "source", source))?;
        self.dynamic.insert(&self.name, id);
        tracing::debug!("Created runtime item {} for {} in {}", id, source, self.name);

        let item = SceneItem::dynamic(
            self.remote.clone(),
            &self.name,
            source,
            id,
            self.dynamic.clone(),
        );
        item.apply(placement).await?;
        Ok(item)
    }
}
