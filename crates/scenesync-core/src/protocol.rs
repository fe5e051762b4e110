//! Typed requests over the remote gateway
//!
//! [`Remote`] turns the untyped `call(method, params)` contract into one async
//! method per request the core needs. Every method is a single round trip.

use crate::gateway::{Gateway, GatewayError};
use scenesync_model::{Settings, Transform};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Request names understood by the remote
pub mod requests {
    pub const GET_SCENE_LIST: &str = "GetSceneList";
    pub const GET_INPUT_LIST: &str = "GetInputList";
    pub const CREATE_SCENE: &str = "CreateScene";
    pub const REMOVE_SCENE: &str = "RemoveScene";
    pub const CREATE_INPUT: &str = "CreateInput";
    pub const REMOVE_INPUT: &str = "RemoveInput";
    pub const GET_INPUT_SETTINGS: &str = "GetInputSettings";
    pub const SET_INPUT_SETTINGS: &str = "SetInputSettings";
    pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
    pub const CREATE_SCENE_ITEM: &str = "CreateSceneItem";
    pub const REMOVE_SCENE_ITEM: &str = "RemoveSceneItem";
    pub const GET_SCENE_ITEM_TRANSFORM: &str = "GetSceneItemTransform";
    pub const SET_SCENE_ITEM_TRANSFORM: &str = "SetSceneItemTransform";
    pub const SET_SCENE_ITEM_ENABLED: &str = "SetSceneItemEnabled";
    pub const SET_SCENE_ITEM_LOCKED: &str = "SetSceneItemLocked";
    pub const SET_SCENE_ITEM_INDEX: &str = "SetSceneItemIndex";
    pub const GET_SOURCE_FILTER_LIST: &str = "GetSourceFilterList";
    pub const GET_SOURCE_FILTER: &str = "GetSourceFilter";
    pub const CREATE_SOURCE_FILTER: &str = "CreateSourceFilter";
    pub const REMOVE_SOURCE_FILTER: &str = "RemoveSourceFilter";
    pub const SET_SOURCE_FILTER_SETTINGS: &str = "SetSourceFilterSettings";
    pub const SET_SOURCE_FILTER_ENABLED: &str = "SetSourceFilterEnabled";
    pub const SET_SOURCE_FILTER_INDEX: &str = "SetSourceFilterIndex";
    pub const GET_SOURCE_PRIVATE_SETTINGS: &str = "GetSourcePrivateSettings";
    pub const SET_SOURCE_PRIVATE_SETTINGS: &str = "SetSourcePrivateSettings";
}

use requests::*;

/// Input as listed by the remote
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LiveInput {
    #[serde(rename = "inputName")]
    pub name: String,
    #[serde(rename = "inputKind")]
    pub kind: String,
}

/// Current kind and settings of an input
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveInputSettings {
    #[serde(rename = "inputKind")]
    pub kind: String,
    #[serde(rename = "inputSettings", default)]
    pub settings: Settings,
}

/// Scene item as listed by the remote
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LiveSceneItem {
    #[serde(rename = "sceneItemId")]
    pub id: i64,
    #[serde(rename = "sourceName")]
    pub source_name: String,
    #[serde(rename = "sceneItemIndex", default)]
    pub index: usize,
    #[serde(rename = "sceneItemEnabled", default)]
    pub enabled: bool,
    #[serde(rename = "sceneItemLocked", default)]
    pub locked: bool,
}

/// Filter as listed by the remote
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveFilter {
    #[serde(rename = "filterName", default)]
    pub name: String,
    #[serde(rename = "filterKind")]
    pub kind: String,
    #[serde(rename = "filterIndex", default)]
    pub index: usize,
    #[serde(rename = "filterEnabled", default)]
    pub enabled: bool,
    #[serde(rename = "filterSettings", default)]
    pub settings: Settings,
}

#[derive(Deserialize)]
struct SceneListResponse {
    scenes: Vec<SceneEntry>,
}

#[derive(Deserialize)]
struct SceneEntry {
    #[serde(rename = "sceneName")]
    name: String,
}

#[derive(Deserialize)]
struct InputListResponse {
    inputs: Vec<LiveInput>,
}

#[derive(Deserialize)]
struct ItemIdResponse {
    #[serde(rename = "sceneItemId")]
    id: i64,
}

#[derive(Deserialize)]
struct ItemListResponse {
    #[serde(rename = "sceneItems")]
    items: Vec<LiveSceneItem>,
}

#[derive(Deserialize)]
struct TransformResponse {
    #[serde(rename = "sceneItemTransform")]
    transform: Transform,
}

#[derive(Deserialize)]
struct FilterListResponse {
    filters: Vec<LiveFilter>,
}

#[derive(Deserialize)]
struct PrivateSettingsResponse {
    #[serde(rename = "sourceSettings", default)]
    settings: Settings,
}

/// Typed client over a shared [`Gateway`]
#[derive(Clone)]
pub struct Remote {
    gateway: Arc<dyn Gateway>,
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote").finish_non_exhaustive()
    }
}

impl Remote {
    /// Wrap a gateway
    #[inline]
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Raw call, for requests without a typed wrapper
    ///
    /// # Errors
    /// Whatever the gateway returns.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        tracing::trace!("-> {} {}", method, params);
        let result = self.gateway.call(method, params).await;
        match &result {
            Ok(_) => tracing::trace!("<- {} ok", method),
            Err(e) => tracing::trace!("<- {} {}", method, e),
        }
        result
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, GatewayError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| GatewayError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    async fn send(&self, method: &str, params: Value) -> Result<(), GatewayError> {
        self.call(method, params).await.map(|_| ())
    }

    // --- scenes -----------------------------------------------------------

    /// Names of all scenes
    pub async fn scene_list(&self) -> Result<Vec<String>, GatewayError> {
        let response: SceneListResponse = self.request(GET_SCENE_LIST, json!({})).await?;
        Ok(response.scenes.into_iter().map(|s| s.name).collect())
    }

    pub async fn create_scene(&self, scene: &str) -> Result<(), GatewayError> {
        self.send(CREATE_SCENE, json!({ "sceneName": scene })).await
    }

    pub async fn remove_scene(&self, scene: &str) -> Result<(), GatewayError> {
        self.send(REMOVE_SCENE, json!({ "sceneName": scene })).await
    }

    // --- inputs -----------------------------------------------------------

    /// All inputs with their kinds
    pub async fn input_list(&self) -> Result<Vec<LiveInput>, GatewayError> {
        let response: InputListResponse = self.request(GET_INPUT_LIST, json!({})).await?;
        Ok(response.inputs)
    }

    /// Create an input directly inside `scene`; returns the new item id
    pub async fn create_input(
        &self,
        scene: &str,
        name: &str,
        kind: &str,
        settings: &Settings,
    ) -> Result<i64, GatewayError> {
        let response: ItemIdResponse = self
            .request(
                CREATE_INPUT,
                json!({
                    "sceneName": scene,
                    "inputName": name,
                    "inputKind": kind,
                    "inputSettings": settings,
                    "sceneItemEnabled": true,
                }),
            )
            .await?;
        Ok(response.id)
    }

    pub async fn remove_input(&self, name: &str) -> Result<(), GatewayError> {
        self.send(REMOVE_INPUT, json!({ "inputName": name })).await
    }

    pub async fn input_settings(&self, name: &str) -> Result<LiveInputSettings, GatewayError> {
        self.request(GET_INPUT_SETTINGS, json!({ "inputName": name }))
            .await
    }

    /// Patch settings; keys not in `settings` are left untouched
    pub async fn set_input_settings(
        &self,
        name: &str,
        settings: &Settings,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_INPUT_SETTINGS,
            json!({ "inputName": name, "inputSettings": settings, "overlay": true }),
        )
        .await
    }

    // --- scene items ------------------------------------------------------

    pub async fn scene_item_list(&self, scene: &str) -> Result<Vec<LiveSceneItem>, GatewayError> {
        let response: ItemListResponse = self
            .request(GET_SCENE_ITEM_LIST, json!({ "sceneName": scene }))
            .await?;
        Ok(response.items)
    }

    /// Place an existing source in `scene`; returns the new item id
    pub async fn create_scene_item(&self, scene: &str, source: &str) -> Result<i64, GatewayError> {
        let response: ItemIdResponse = self
            .request(
                CREATE_SCENE_ITEM,
                json!({ "sceneName": scene, "sourceName": source, "sceneItemEnabled": true }),
            )
            .await?;
        Ok(response.id)
    }

    pub async fn remove_scene_item(&self, scene: &str, id: i64) -> Result<(), GatewayError> {
        self.send(
            REMOVE_SCENE_ITEM,
            json!({ "sceneName": scene, "sceneItemId": id }),
        )
        .await
    }

    pub async fn scene_item_transform(
        &self,
        scene: &str,
        id: i64,
    ) -> Result<Transform, GatewayError> {
        let response: TransformResponse = self
            .request(
                GET_SCENE_ITEM_TRANSFORM,
                json!({ "sceneName": scene, "sceneItemId": id }),
            )
            .await?;
        Ok(response.transform)
    }

    pub async fn set_scene_item_transform(
        &self,
        scene: &str,
        id: i64,
        transform: &Transform,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SCENE_ITEM_TRANSFORM,
            json!({ "sceneName": scene, "sceneItemId": id, "sceneItemTransform": transform }),
        )
        .await
    }

    pub async fn set_scene_item_enabled(
        &self,
        scene: &str,
        id: i64,
        enabled: bool,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SCENE_ITEM_ENABLED,
            json!({ "sceneName": scene, "sceneItemId": id, "sceneItemEnabled": enabled }),
        )
        .await
    }

    pub async fn set_scene_item_locked(
        &self,
        scene: &str,
        id: i64,
        locked: bool,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SCENE_ITEM_LOCKED,
            json!({ "sceneName": scene, "sceneItemId": id, "sceneItemLocked": locked }),
        )
        .await
    }

    pub async fn set_scene_item_index(
        &self,
        scene: &str,
        id: i64,
        index: usize,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SCENE_ITEM_INDEX,
            json!({ "sceneName": scene, "sceneItemId": id, "sceneItemIndex": index }),
        )
        .await
    }

    // --- filters ----------------------------------------------------------

    pub async fn filter_list(&self, source: &str) -> Result<Vec<LiveFilter>, GatewayError> {
        let response: FilterListResponse = self
            .request(GET_SOURCE_FILTER_LIST, json!({ "sourceName": source }))
            .await?;
        Ok(response.filters)
    }

    pub async fn filter(&self, source: &str, name: &str) -> Result<LiveFilter, GatewayError> {
        let mut filter: LiveFilter = self
            .request(
                GET_SOURCE_FILTER,
                json!({ "sourceName": source, "filterName": name }),
            )
            .await?;
        filter.name = name.to_string();
        Ok(filter)
    }

    pub async fn create_filter(
        &self,
        source: &str,
        name: &str,
        kind: &str,
        settings: &Settings,
    ) -> Result<(), GatewayError> {
        self.send(
            CREATE_SOURCE_FILTER,
            json!({
                "sourceName": source,
                "filterName": name,
                "filterKind": kind,
                "filterSettings": settings,
            }),
        )
        .await
    }

    pub async fn remove_filter(&self, source: &str, name: &str) -> Result<(), GatewayError> {
        self.send(
            REMOVE_SOURCE_FILTER,
            json!({ "sourceName": source, "filterName": name }),
        )
        .await
    }

    /// Patch filter settings; keys not in `settings` are left untouched
    pub async fn set_filter_settings(
        &self,
        source: &str,
        name: &str,
        settings: &Settings,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SOURCE_FILTER_SETTINGS,
            json!({
                "sourceName": source,
                "filterName": name,
                "filterSettings": settings,
                "overlay": true,
            }),
        )
        .await
    }

    pub async fn set_filter_enabled(
        &self,
        source: &str,
        name: &str,
        enabled: bool,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SOURCE_FILTER_ENABLED,
            json!({ "sourceName": source, "filterName": name, "filterEnabled": enabled }),
        )
        .await
    }

    pub async fn set_filter_index(
        &self,
        source: &str,
        name: &str,
        index: usize,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SOURCE_FILTER_INDEX,
            json!({ "sourceName": source, "filterName": name, "filterIndex": index }),
        )
        .await
    }

    // --- private metadata -------------------------------------------------

    /// Private metadata slot of a source, separate from its declared settings
    pub async fn private_settings(&self, source: &str) -> Result<Settings, GatewayError> {
        let response: PrivateSettingsResponse = self
            .request(GET_SOURCE_PRIVATE_SETTINGS, json!({ "sourceName": source }))
            .await?;
        Ok(response.settings)
    }

    pub async fn set_private_settings(
        &self,
        source: &str,
        settings: &Settings,
    ) -> Result<(), GatewayError> {
        self.send(
            SET_SOURCE_PRIVATE_SETTINGS,
            json!({ "sourceName": source, "sourceSettings": settings }),
        )
        .await
    }
}

/// Keys of `declared` whose value differs from `live`
///
/// Used to keep settings writes minimal; an empty result means no patch is needed.
#[must_use]
pub fn settings_patch(declared: &Settings, live: &Settings) -> Settings {
    declared
        .iter()
        .filter(|(key, value)| live.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(value: Value) -> Settings {
        match value {
            Value::Object(m) => m,
            _ => Settings::new(),
        }
    }

    #[test]
    fn patch_contains_only_changed_keys() {
        let declared = map(json!({ "url": "https://y", "width": 800 }));
        let live = map(json!({ "url": "https://x", "width": 800, "css": "" }));
        assert_eq!(settings_patch(&declared, &live), map(json!({ "url": "https://y" })));
    }

    #[test]
    fn patch_empty_when_converged() {
        let declared = map(json!({ "url": "https://x" }));
        assert!(settings_patch(&declared, &declared.clone()).is_empty());
    }

    #[test]
    fn live_item_decodes_remote_shape() {
        let item: LiveSceneItem = serde_json::from_value(json!({
            "sceneItemId": 7,
            "sourceName": "Chat",
            "sceneItemIndex": 2,
            "sceneItemEnabled": true,
            "sceneItemLocked": false,
            "sourceType": "OBS_SOURCE_TYPE_INPUT",
        }))
        .unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.source_name, "Chat");
        assert_eq!(item.index, 2);
    }
}
