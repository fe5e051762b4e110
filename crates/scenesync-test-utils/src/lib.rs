//! Testing utilities for scenesync workspace
//!
//! Shared fixtures: declarations, typed kinds and sessions over the
//! in-memory remote.

#![allow(missing_docs)]

use scenesync_core::protocol::requests;
use scenesync_core::{ForeignPolicy, MemoryGateway, Session, SyncConfig};
use scenesync_model::{FilterConfig, InputDeclaration, Kind, SceneDeclaration, SceneItemDeclaration};
use serde::Serialize;
use std::sync::Arc;

pub struct BrowserSource;

#[derive(Debug, Clone, Serialize)]
pub struct BrowserSettings {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Kind for BrowserSource {
    const KIND: &'static str = "browser_source";
    type Settings = BrowserSettings;
}

pub struct ColorCorrection;

#[derive(Debug, Clone, Serialize)]
pub struct ColorCorrectionSettings {
    pub gamma: f64,
}

impl Kind for ColorCorrection {
    const KIND: &'static str = "color_filter_v2";
    type Settings = ColorCorrectionSettings;
}

pub fn browser(name: &str, url: &str) -> InputDeclaration {
    InputDeclaration::new(name, BrowserSource::KIND).with_setting("url", url)
}

/// The `Chat` browser input used throughout the tests
pub fn chat(url: &str) -> InputDeclaration {
    browser("Chat", url)
}

pub fn color_filter(name: &str, gamma: f64) -> FilterConfig {
    FilterConfig::new(name, ColorCorrection::KIND).with_setting("gamma", gamma)
}

/// Scene with one item per input, keyed by the input name
pub fn scene_with(name: &str, inputs: &[InputDeclaration]) -> SceneDeclaration {
    inputs.iter().fold(SceneDeclaration::new(name), |scene, input| {
        scene.with_item(input.name.clone(), SceneItemDeclaration::new(input.clone()))
    })
}

/// Empty remote plus a session over it
pub fn memory_session() -> (Arc<MemoryGateway>, Session) {
    memory_session_with(SyncConfig::default())
}

pub fn memory_session_with(config: SyncConfig) -> (Arc<MemoryGateway>, Session) {
    let gateway = Arc::new(MemoryGateway::new());
    let session = Session::new(gateway.clone(), config);
    (gateway, session)
}

/// Session on an existing remote, as after a process restart
pub fn restart(gateway: &Arc<MemoryGateway>) -> Session {
    Session::new(gateway.clone(), SyncConfig::default())
}

pub fn adopting() -> SyncConfig {
    SyncConfig::default().with_foreign_policy(ForeignPolicy::Adopt)
}

/// Number of create requests of any kind
pub fn creates(gateway: &MemoryGateway) -> usize {
    [
        requests::CREATE_SCENE,
        requests::CREATE_INPUT,
        requests::CREATE_SCENE_ITEM,
        requests::CREATE_SOURCE_FILTER,
    ]
    .iter()
    .map(|m| gateway.count(m))
    .sum()
}

/// Number of remove requests of any kind
pub fn removes(gateway: &MemoryGateway) -> usize {
    [
        requests::REMOVE_SCENE,
        requests::REMOVE_INPUT,
        requests::REMOVE_SCENE_ITEM,
        requests::REMOVE_SOURCE_FILTER,
    ]
    .iter()
    .map(|m| gateway.count(m))
    .sum()
}

/// Mutations other than ownership bookkeeping
pub fn scene_mutations(gateway: &MemoryGateway) -> Vec<String> {
    gateway
        .mutations()
        .into_iter()
        .filter(|c| c.method != requests::SET_SOURCE_PRIVATE_SETTINGS)
        .map(|c| c.method)
        .collect()
}
