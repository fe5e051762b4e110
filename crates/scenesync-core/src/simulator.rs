//! In-memory remote simulator
//!
//! [`MemoryGateway`] answers the requests [`Remote`](crate::Remote) issues
//! against an in-process scene graph, with the same status codes a live
//! compositor returns. Every call is recorded so tests can assert on exactly
//! which mutations a sync or clean issued.
//!
//! Failures can be injected per method (optionally per object name), and
//! item transforms can be locked to exercise "not mutable" handling.

use crate::gateway::{status, Gateway, GatewayError};
use crate::protocol::requests::*;
use crate::protocol::{LiveFilter, LiveSceneItem};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use scenesync_model::Settings;
use serde_json::{json, Value};
use std::collections::HashSet;

/// One request received by the simulator
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

impl RecordedCall {
    /// True for requests that change remote state
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !self.method.starts_with("Get")
    }

    /// String field of the request payload
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone)]
struct FilterState {
    name: String,
    kind: String,
    enabled: bool,
    settings: Settings,
}

#[derive(Debug, Clone)]
struct ItemState {
    id: i64,
    source: String,
    enabled: bool,
    locked: bool,
    transform: Settings,
}

#[derive(Debug, Clone)]
struct InputState {
    kind: String,
    settings: Settings,
}

#[derive(Debug, Clone)]
struct Injected {
    method: String,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    scenes: IndexMap<String, Vec<ItemState>>,
    inputs: IndexMap<String, InputState>,
    filters: IndexMap<String, Vec<FilterState>>,
    private: IndexMap<String, Settings>,
    locked_transforms: HashSet<String>,
    failures: Vec<Injected>,
    calls: Vec<RecordedCall>,
    next_item_id: i64,
}

type Reply = Result<Value, GatewayError>;

fn fail(method: &str, code: u16, comment: impl Into<String>) -> GatewayError {
    GatewayError::status(method, code, comment)
}

fn str_field<'a>(method: &str, params: &'a Value, key: &str) -> Result<&'a str, GatewayError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| fail(method, status::MISSING_REQUEST_FIELD, format!("missing {key}")))
}

fn int_field(method: &str, params: &Value, key: &str) -> Result<i64, GatewayError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| fail(method, status::MISSING_REQUEST_FIELD, format!("missing {key}")))
}

fn bool_field(method: &str, params: &Value, key: &str) -> Result<bool, GatewayError> {
    params
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| fail(method, status::MISSING_REQUEST_FIELD, format!("missing {key}")))
}

fn index_field(method: &str, params: &Value, key: &str) -> Result<usize, GatewayError> {
    let index = int_field(method, params, key)?;
    usize::try_from(index).map_err(|_| fail(method, status::MISSING_REQUEST_FIELD, format!("negative {key}")))
}

/// Object field; absent means empty
fn map_field(params: &Value, key: &str) -> Settings {
    match params.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Settings::new(),
    }
}

fn into_map(value: Value) -> Settings {
    match value {
        Value::Object(map) => map,
        _ => Settings::new(),
    }
}

fn overlay(target: &mut Settings, patch: Settings) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

fn move_to<T>(list: &mut Vec<T>, from: usize, to: usize) {
    let item = list.remove(from);
    let to = to.min(list.len());
    list.insert(to, item);
}

impl State {
    fn source_exists(&self, name: &str) -> bool {
        self.scenes.contains_key(name) || self.inputs.contains_key(name)
    }

    fn scene_mut(&mut self, method: &str, name: &str) -> Result<&mut Vec<ItemState>, GatewayError> {
        if self.inputs.contains_key(name) {
            return Err(fail(method, status::INVALID_RESOURCE_TYPE, format!("{name} is an input")));
        }
        self.scenes
            .get_mut(name)
            .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no scene {name}")))
    }

    fn input_mut(&mut self, method: &str, name: &str) -> Result<&mut InputState, GatewayError> {
        if self.scenes.contains_key(name) {
            return Err(fail(method, status::INVALID_RESOURCE_TYPE, format!("{name} is a scene")));
        }
        self.inputs
            .get_mut(name)
            .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no input {name}")))
    }

    fn item_mut(&mut self, method: &str, params: &Value) -> Result<&mut ItemState, GatewayError> {
        let scene = str_field(method, params, "sceneName")?;
        let id = int_field(method, params, "sceneItemId")?;
        self.scene_mut(method, scene)?
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no item {id} in {scene}")))
    }

    fn filters_mut(&mut self, method: &str, source: &str) -> Result<&mut Vec<FilterState>, GatewayError> {
        if !self.source_exists(source) {
            return Err(fail(method, status::RESOURCE_NOT_FOUND, format!("no source {source}")));
        }
        Ok(self.filters.entry(source.to_string()).or_default())
    }

    fn filter_mut(&mut self, method: &str, params: &Value) -> Result<&mut FilterState, GatewayError> {
        let source = str_field(method, params, "sourceName")?;
        let name = str_field(method, params, "filterName")?;
        self.filters_mut(method, source)?
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no filter {name} on {source}")))
    }

    fn add_item(&mut self, scene: &str, source: &str) -> i64 {
        self.next_item_id += 1;
        let id = self.next_item_id;
        if let Some(items) = self.scenes.get_mut(scene) {
            items.push(ItemState {
                id,
                source: source.to_string(),
                enabled: true,
                locked: false,
                transform: Settings::new(),
            });
        }
        id
    }

    /// Drop a source with everything attached to it
    fn drop_source(&mut self, name: &str) {
        for items in self.scenes.values_mut() {
            items.retain(|i| i.source != name);
        }
        self.filters.shift_remove(name);
        self.private.shift_remove(name);
    }

    fn injected(&self, method: &str, params: &Value) -> Option<GatewayError> {
        let names = ["sceneName", "inputName", "sourceName", "filterName"];
        self.failures
            .iter()
            .find(|f| {
                f.method == method
                    && f.name.as_deref().map_or(true, |name| {
                        names
                            .iter()
                            .any(|key| params.get(*key).and_then(Value::as_str) == Some(name))
                    })
            })
            .map(|_| GatewayError::Transport(format!("injected failure on {method}")))
    }

    fn handle(&mut self, method: &str, params: &Value) -> Reply {
        match method {
            GET_SCENE_LIST => {
                let scenes: Vec<Value> = self
                    .scenes
                    .keys()
                    .enumerate()
                    .map(|(i, name)| json!({ "sceneName": name, "sceneIndex": i }))
                    .collect();
                Ok(json!({ "scenes": scenes }))
            }
            GET_INPUT_LIST => {
                let inputs: Vec<Value> = self
                    .inputs
                    .iter()
                    .map(|(name, input)| json!({ "inputName": name, "inputKind": input.kind }))
                    .collect();
                Ok(json!({ "inputs": inputs }))
            }
            CREATE_SCENE => {
                let name = str_field(method, params, "sceneName")?;
                if self.source_exists(name) {
                    return Err(fail(method, status::RESOURCE_ALREADY_EXISTS, format!("{name} exists")));
                }
                self.scenes.insert(name.to_string(), Vec::new());
                Ok(json!({}))
            }
            REMOVE_SCENE => {
                let name = str_field(method, params, "sceneName")?;
                self.scene_mut(method, name)?;
                self.scenes.shift_remove(name);
                self.drop_source(name);
                Ok(json!({}))
            }
            CREATE_INPUT => {
                let scene = str_field(method, params, "sceneName")?;
                let name = str_field(method, params, "inputName")?;
                let kind = str_field(method, params, "inputKind")?;
                self.scene_mut(method, scene)?;
                if self.source_exists(name) {
                    return Err(fail(method, status::RESOURCE_ALREADY_EXISTS, format!("{name} exists")));
                }
                self.inputs.insert(
                    name.to_string(),
                    InputState {
                        kind: kind.to_string(),
                        settings: map_field(params, "inputSettings"),
                    },
                );
                let id = self.add_item(scene, name);
                Ok(json!({ "sceneItemId": id }))
            }
            REMOVE_INPUT => {
                let name = str_field(method, params, "inputName")?;
                self.input_mut(method, name)?;
                self.inputs.shift_remove(name);
                self.drop_source(name);
                Ok(json!({}))
            }
            GET_INPUT_SETTINGS => {
                let name = str_field(method, params, "inputName")?;
                let input = self.input_mut(method, name)?;
                Ok(json!({ "inputKind": input.kind, "inputSettings": input.settings }))
            }
            SET_INPUT_SETTINGS => {
                let name = str_field(method, params, "inputName")?;
                let patch = map_field(params, "inputSettings");
                let replace = params.get("overlay").and_then(Value::as_bool) == Some(false);
                let input = self.input_mut(method, name)?;
                if replace {
                    input.settings = patch;
                } else {
                    overlay(&mut input.settings, patch);
                }
                Ok(json!({}))
            }
            GET_SCENE_ITEM_LIST => {
                let scene = str_field(method, params, "sceneName")?;
                let items: Vec<Value> = self
                    .scene_mut(method, scene)?
                    .iter()
                    .enumerate()
                    .map(|(index, i)| {
                        json!({
                            "sceneItemId": i.id,
                            "sourceName": i.source,
                            "sceneItemIndex": index,
                            "sceneItemEnabled": i.enabled,
                            "sceneItemLocked": i.locked,
                        })
                    })
                    .collect();
                Ok(json!({ "sceneItems": items }))
            }
            CREATE_SCENE_ITEM => {
                let scene = str_field(method, params, "sceneName")?;
                let source = str_field(method, params, "sourceName")?;
                self.scene_mut(method, scene)?;
                if !self.source_exists(source) {
                    return Err(fail(method, status::RESOURCE_NOT_FOUND, format!("no source {source}")));
                }
                if scene == source {
                    return Err(fail(method, status::INVALID_RESOURCE_TYPE, "scene inside itself"));
                }
                let enabled = params
                    .get("sceneItemEnabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let id = self.add_item(scene, source);
                if let Some(item) = self.scenes.get_mut(scene).and_then(|items| items.last_mut()) {
                    item.enabled = enabled;
                }
                Ok(json!({ "sceneItemId": id }))
            }
            REMOVE_SCENE_ITEM => {
                let scene = str_field(method, params, "sceneName")?;
                let id = int_field(method, params, "sceneItemId")?;
                let items = self.scene_mut(method, scene)?;
                let before = items.len();
                items.retain(|i| i.id != id);
                if items.len() == before {
                    return Err(fail(method, status::RESOURCE_NOT_FOUND, format!("no item {id} in {scene}")));
                }
                Ok(json!({}))
            }
            GET_SCENE_ITEM_TRANSFORM => {
                let item = self.item_mut(method, params)?;
                Ok(json!({ "sceneItemTransform": item.transform }))
            }
            SET_SCENE_ITEM_TRANSFORM => {
                let patch = map_field(params, "sceneItemTransform");
                let locked = {
                    let item = self.item_mut(method, params)?;
                    item.source.clone()
                };
                if self.locked_transforms.contains(&locked) {
                    return Err(fail(method, status::INVALID_RESOURCE_STATE, "transform is locked"));
                }
                let item = self.item_mut(method, params)?;
                overlay(&mut item.transform, patch);
                Ok(json!({}))
            }
            SET_SCENE_ITEM_ENABLED => {
                let enabled = bool_field(method, params, "sceneItemEnabled")?;
                self.item_mut(method, params)?.enabled = enabled;
                Ok(json!({}))
            }
            SET_SCENE_ITEM_LOCKED => {
                let locked = bool_field(method, params, "sceneItemLocked")?;
                self.item_mut(method, params)?.locked = locked;
                Ok(json!({}))
            }
            SET_SCENE_ITEM_INDEX => {
                let scene = str_field(method, params, "sceneName")?;
                let id = int_field(method, params, "sceneItemId")?;
                let index = index_field(method, params, "sceneItemIndex")?;
                let items = self.scene_mut(method, scene)?;
                let from = items
                    .iter()
                    .position(|i| i.id == id)
                    .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no item {id} in {scene}")))?;
                move_to(items, from, index);
                Ok(json!({}))
            }
            GET_SOURCE_FILTER_LIST => {
                let source = str_field(method, params, "sourceName")?;
                let filters: Vec<Value> = self
                    .filters_mut(method, source)?
                    .iter()
                    .enumerate()
                    .map(|(index, f)| {
                        json!({
                            "filterName": f.name,
                            "filterKind": f.kind,
                            "filterIndex": index,
                            "filterEnabled": f.enabled,
                            "filterSettings": f.settings,
                        })
                    })
                    .collect();
                Ok(json!({ "filters": filters }))
            }
            GET_SOURCE_FILTER => {
                let source = str_field(method, params, "sourceName")?;
                let name = str_field(method, params, "filterName")?;
                let filters = self.filters_mut(method, source)?;
                let (index, filter) = filters
                    .iter()
                    .enumerate()
                    .find(|(_, f)| f.name == name)
                    .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no filter {name} on {source}")))?;
                Ok(json!({
                    "filterKind": filter.kind,
                    "filterIndex": index,
                    "filterEnabled": filter.enabled,
                    "filterSettings": filter.settings,
                }))
            }
            CREATE_SOURCE_FILTER => {
                let source = str_field(method, params, "sourceName")?;
                let name = str_field(method, params, "filterName")?;
                let kind = str_field(method, params, "filterKind")?;
                let settings = map_field(params, "filterSettings");
                let filters = self.filters_mut(method, source)?;
                if filters.iter().any(|f| f.name == name) {
                    return Err(fail(method, status::RESOURCE_ALREADY_EXISTS, format!("filter {name} exists")));
                }
                filters.push(FilterState {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    enabled: true,
                    settings,
                });
                Ok(json!({}))
            }
            REMOVE_SOURCE_FILTER => {
                let source = str_field(method, params, "sourceName")?;
                let name = str_field(method, params, "filterName")?;
                let filters = self.filters_mut(method, source)?;
                let before = filters.len();
                filters.retain(|f| f.name != name);
                if filters.len() == before {
                    return Err(fail(method, status::RESOURCE_NOT_FOUND, format!("no filter {name} on {source}")));
                }
                Ok(json!({}))
            }
            SET_SOURCE_FILTER_SETTINGS => {
                let patch = map_field(params, "filterSettings");
                let replace = params.get("overlay").and_then(Value::as_bool) == Some(false);
                let filter = self.filter_mut(method, params)?;
                if replace {
                    filter.settings = patch;
                } else {
                    overlay(&mut filter.settings, patch);
                }
                Ok(json!({}))
            }
            SET_SOURCE_FILTER_ENABLED => {
                let enabled = bool_field(method, params, "filterEnabled")?;
                self.filter_mut(method, params)?.enabled = enabled;
                Ok(json!({}))
            }
            SET_SOURCE_FILTER_INDEX => {
                let source = str_field(method, params, "sourceName")?;
                let name = str_field(method, params, "filterName")?;
                let index = index_field(method, params, "filterIndex")?;
                let filters = self.filters_mut(method, source)?;
                let from = filters
                    .iter()
                    .position(|f| f.name == name)
                    .ok_or_else(|| fail(method, status::RESOURCE_NOT_FOUND, format!("no filter {name} on {source}")))?;
                move_to(filters, from, index);
                Ok(json!({}))
            }
            GET_SOURCE_PRIVATE_SETTINGS => {
                let source = str_field(method, params, "sourceName")?;
                if !self.source_exists(source) {
                    return Err(fail(method, status::RESOURCE_NOT_FOUND, format!("no source {source}")));
                }
                let settings = self.private.get(source).cloned().unwrap_or_default();
                Ok(json!({ "sourceSettings": settings }))
            }
            SET_SOURCE_PRIVATE_SETTINGS => {
                let source = str_field(method, params, "sourceName")?;
                if !self.source_exists(source) {
                    return Err(fail(method, status::RESOURCE_NOT_FOUND, format!("no source {source}")));
                }
                self.private
                    .insert(source.to_string(), map_field(params, "sourceSettings"));
                Ok(json!({}))
            }
            other => Err(fail(other, status::UNKNOWN_REQUEST_TYPE, "unknown request type")),
        }
    }
}

/// Gateway backed by an in-memory scene graph
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    /// Create an empty remote
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- seeding ----------------------------------------------------------

    /// Add a scene that this program did not create
    pub fn seed_scene(&self, name: &str) {
        self.state.lock().scenes.entry(name.to_string()).or_default();
    }

    /// Add an input with one item in `scene`; returns the item id
    pub fn seed_input(&self, scene: &str, name: &str, kind: &str, settings: Value) -> i64 {
        let mut state = self.state.lock();
        state.scenes.entry(scene.to_string()).or_default();
        state.inputs.insert(
            name.to_string(),
            InputState {
                kind: kind.to_string(),
                settings: into_map(settings),
            },
        );
        state.add_item(scene, name)
    }

    /// Add an item showing an existing source; returns the item id
    pub fn seed_item(&self, scene: &str, source: &str) -> i64 {
        let mut state = self.state.lock();
        state.scenes.entry(scene.to_string()).or_default();
        state.add_item(scene, source)
    }

    pub fn seed_filter(&self, source: &str, name: &str, kind: &str, settings: Value) {
        self.state
            .lock()
            .filters
            .entry(source.to_string())
            .or_default()
            .push(FilterState {
                name: name.to_string(),
                kind: kind.to_string(),
                enabled: true,
                settings: into_map(settings),
            });
    }

    /// Replace the private metadata slot of `source`
    pub fn seed_private(&self, source: &str, settings: Value) {
        self.state
            .lock()
            .private
            .insert(source.to_string(), into_map(settings));
    }

    // --- fault injection --------------------------------------------------

    /// Fail every `method` call, or only those naming `name`, with a transport error
    pub fn fail_on(&self, method: &str, name: Option<&str>) {
        self.state.lock().failures.push(Injected {
            method: method.to_string(),
            name: name.map(str::to_string),
        });
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Refuse transform writes on items showing `source`
    pub fn lock_transform(&self, source: &str) {
        self.state.lock().locked_transforms.insert(source.to_string());
    }

    // --- call log ---------------------------------------------------------

    /// Every request received so far
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Requests that change remote state
    #[must_use]
    pub fn mutations(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of `method` requests received
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    // --- inspection -------------------------------------------------------

    #[must_use]
    pub fn has_scene(&self, name: &str) -> bool {
        self.state.lock().scenes.contains_key(name)
    }

    #[must_use]
    pub fn has_input(&self, name: &str) -> bool {
        self.state.lock().inputs.contains_key(name)
    }

    #[must_use]
    pub fn scene_names(&self) -> Vec<String> {
        self.state.lock().scenes.keys().cloned().collect()
    }

    #[must_use]
    pub fn input_names(&self) -> Vec<String> {
        self.state.lock().inputs.keys().cloned().collect()
    }

    #[must_use]
    pub fn input_kind(&self, name: &str) -> Option<String> {
        self.state.lock().inputs.get(name).map(|i| i.kind.clone())
    }

    #[must_use]
    pub fn input_settings(&self, name: &str) -> Option<Settings> {
        self.state.lock().inputs.get(name).map(|i| i.settings.clone())
    }

    /// Items of `scene` in stacking order
    #[must_use]
    pub fn items(&self, scene: &str) -> Vec<LiveSceneItem> {
        self.state
            .lock()
            .scenes
            .get(scene)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(index, i)| LiveSceneItem {
                        id: i.id,
                        source_name: i.source.clone(),
                        index,
                        enabled: i.enabled,
                        locked: i.locked,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Source names of the items of `scene` in stacking order
    #[must_use]
    pub fn item_sources(&self, scene: &str) -> Vec<String> {
        self.items(scene).into_iter().map(|i| i.source_name).collect()
    }

    /// Transform fields written to an item so far
    #[must_use]
    pub fn item_transform(&self, scene: &str, id: i64) -> Option<Settings> {
        self.state
            .lock()
            .scenes
            .get(scene)?
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.transform.clone())
    }

    /// Filters of `source` in chain order
    #[must_use]
    pub fn filters(&self, source: &str) -> Vec<LiveFilter> {
        self.state
            .lock()
            .filters
            .get(source)
            .map(|filters| {
                filters
                    .iter()
                    .enumerate()
                    .map(|(index, f)| LiveFilter {
                        name: f.name.clone(),
                        kind: f.kind.clone(),
                        index,
                        enabled: f.enabled,
                        settings: f.settings.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn filter_names(&self, source: &str) -> Vec<String> {
        self.filters(source).into_iter().map(|f| f.name).collect()
    }

    #[must_use]
    pub fn private_settings(&self, source: &str) -> Option<Settings> {
        self.state.lock().private.get(source).cloned()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
        });
        if let Some(err) = state.injected(method, &params) {
            return Err(err);
        }
        state.handle(method, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_codes_match_remote() {
        let gateway = MemoryGateway::new();
        gateway.seed_input("Main", "Chat", "browser_source", json!({}));

        let err = gateway
            .call(GET_INPUT_SETTINGS, json!({ "inputName": "Nope" }))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = gateway
            .call(CREATE_SCENE, json!({ "sceneName": "Chat" }))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        let err = gateway
            .call(GET_INPUT_SETTINGS, json!({ "inputName": "Main" }))
            .await
            .unwrap_err();
        assert_eq!(err.class(), crate::gateway::StatusClass::WrongType);

        let err = gateway.call("Bogus", json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { code: 204, .. }));

        let err = gateway.call(CREATE_SCENE, json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { code: 300, .. }));
    }

    #[tokio::test]
    async fn remove_input_drops_its_items_everywhere() {
        let gateway = MemoryGateway::new();
        gateway.seed_input("Main", "Chat", "browser_source", json!({}));
        gateway.seed_item("Other", "Chat");

        gateway
            .call(REMOVE_INPUT, json!({ "inputName": "Chat" }))
            .await
            .unwrap();
        assert!(gateway.items("Main").is_empty());
        assert!(gateway.items("Other").is_empty());
        assert_eq!(gateway.count(REMOVE_INPUT), 1);
    }

    #[tokio::test]
    async fn injected_failures_and_locked_transforms() {
        let gateway = MemoryGateway::new();
        let id = gateway.seed_input("Main", "Chat", "browser_source", json!({}));
        gateway.fail_on(REMOVE_INPUT, Some("Chat"));
        gateway.lock_transform("Chat");

        let err = gateway
            .call(REMOVE_INPUT, json!({ "inputName": "Chat" }))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));

        let err = gateway
            .call(
                SET_SCENE_ITEM_TRANSFORM,
                json!({ "sceneName": "Main", "sceneItemId": id, "sceneItemTransform": {} }),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_mutable());

        gateway.clear_failures();
        assert!(gateway
            .call(REMOVE_INPUT, json!({ "inputName": "Chat" }))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn filter_index_moves_within_chain() {
        let gateway = MemoryGateway::new();
        gateway.seed_scene("Main");
        gateway.seed_filter("Main", "A", "color_filter", json!({}));
        gateway.seed_filter("Main", "B", "color_filter", json!({}));
        gateway
            .call(
                SET_SOURCE_FILTER_INDEX,
                json!({ "sourceName": "Main", "filterName": "B", "filterIndex": 0 }),
            )
            .await
            .unwrap();
        assert_eq!(gateway.filter_names("Main"), vec!["B", "A"]);
    }
}
