//! Garbage collector tests

use pretty_assertions::assert_eq;
use scenesync_core::prelude::*;
use scenesync_core::protocol::requests::*;
use scenesync_core::{FileLedger, OwnershipLedger, SyncError};
use scenesync_test_utils::*;
use serde_json::json;
use std::sync::Arc;

fn methods(gateway: &MemoryGateway) -> Vec<String> {
    gateway.mutations().into_iter().map(|c| c.method).collect()
}

#[tokio::test]
async fn test_clean_keeps_referenced_objects() {
    let (gateway, mut session) = memory_session();
    session.sync(&scene_with("Show", &[chat("https://x")])).await.unwrap();

    gateway.clear_calls();
    let report = session.clean().await.unwrap();
    assert_eq!(report.removed_count(), 0);
    assert!(report.is_clean());
    assert!(gateway.mutations().is_empty());
}

#[tokio::test]
async fn test_clean_never_touches_foreign_objects() {
    let (gateway, mut session) = memory_session();
    gateway.seed_input("Main", "Logo", "image_source", json!({}));
    session.sync(&scene_with("Show", &[chat("https://x")])).await.unwrap();
    assert!(session.forget_scene("Show"));

    let report = session.clean().await.unwrap();
    assert_eq!(report.removed_inputs, vec!["Chat"]);
    assert_eq!(report.removed_scenes, vec!["Show"]);
    assert!(gateway.has_input("Logo"));
    assert!(gateway.has_scene("Main"));
    assert!(!gateway.has_input("Chat"));
    assert!(!session.registry().has("Chat"));
}

#[tokio::test]
async fn test_clean_deletes_items_then_inputs_then_scenes() {
    let (gateway, mut session) = memory_session();
    let overlay = scene_with("Overlay", &[chat("https://x")]);
    let main = SceneDeclaration::new("Main").with_item("overlay", SceneItemDeclaration::new(overlay));
    session.sync(&main).await.unwrap();
    session.forget_scene("Main");

    gateway.clear_calls();
    let report = session.clean().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.removed_items.len(), 2);

    let order = methods(&gateway);
    let last_item = order.iter().rposition(|m| m == REMOVE_SCENE_ITEM).unwrap();
    let first_input = order.iter().position(|m| m == REMOVE_INPUT).unwrap();
    let last_input = order.iter().rposition(|m| m == REMOVE_INPUT).unwrap();
    let first_scene = order.iter().position(|m| m == REMOVE_SCENE).unwrap();
    assert!(last_item < first_input);
    assert!(last_input < first_scene);
    assert!(gateway.scene_names().is_empty());
    assert!(gateway.input_names().is_empty());
}

#[tokio::test]
async fn test_clean_removes_undeclared_owned_filters() {
    let (gateway, mut session) = memory_session();
    let both = chat("https://x")
        .with_filter("color", color_filter("Color", 1.0))
        .with_filter("blur", FilterConfig::new("Blur", "blur_filter"));
    session.sync(&scene_with("Main", &[both])).await.unwrap();
    gateway.seed_filter("Chat", "Mask", "mask_filter", json!({}));

    let color_only = chat("https://x").with_filter("color", color_filter("Color", 1.0));
    session.sync(&scene_with("Main", &[color_only])).await.unwrap();

    let report = session.clean().await.unwrap();
    assert_eq!(report.removed_filters, vec![("Chat".to_string(), "Blur".to_string())]);
    assert!(report.removed_inputs.is_empty());
    assert_eq!(gateway.filter_names("Chat"), vec!["Color", "Mask"]);

    let private = gateway.private_settings("Chat").unwrap();
    assert_eq!(private["scenesync"]["ownedFilterNames"], json!(["Color"]));
}

#[tokio::test]
async fn test_clean_collects_failures() {
    let (gateway, mut session) = memory_session();
    let show = scene_with("Show", &[chat("https://x"), browser("Cam", "https://cam")]);
    session.sync(&show).await.unwrap();
    session.forget_scene("Show");
    gateway.fail_on(REMOVE_INPUT, Some("Chat"));

    let report = session.clean().await.unwrap();
    assert_eq!(report.removed_inputs, vec!["Cam"]);
    assert_eq!(report.removed_scenes, vec!["Show"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].object, "Chat");
    assert!(session.registry().has("Chat"));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, SyncError::Clean { ref errors } if errors.len() == 1));

    // Next pass retries what is left
    gateway.clear_failures();
    let report = session.clean().await.unwrap();
    assert_eq!(report.removed_inputs, vec!["Chat"]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_scene_with_failed_record_write_is_still_collected() {
    let (gateway, mut session) = memory_session();
    let show = scene_with("Show", &[chat("https://x")]);

    gateway.fail_on(SET_SOURCE_PRIVATE_SETTINGS, Some("Show"));
    assert!(session.sync(&show).await.is_err());
    assert!(gateway.has_scene("Show"));

    gateway.clear_failures();
    session.sync(&show).await.unwrap();
    let private = gateway.private_settings("Show").unwrap();
    assert_eq!(private["scenesync"]["owned"], json!(true));

    session.forget_scene("Show");
    let report = session.clean().await.unwrap();
    assert_eq!(report.removed_scenes, vec!["Show"]);
    assert_eq!(report.removed_inputs, vec!["Chat"]);
    assert!(gateway.scene_names().is_empty());
}

#[tokio::test]
async fn test_clean_retries_queued_records_first() {
    let (gateway, mut session) = memory_session();
    gateway.fail_on(SET_SOURCE_PRIVATE_SETTINGS, Some("Show"));
    assert!(session.sync(&SceneDeclaration::new("Show")).await.is_err());

    gateway.clear_failures();
    session.forget_scene("Show");
    let report = session.clean().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.removed_scenes, vec!["Show"]);
    assert!(!gateway.has_scene("Show"));
}

#[tokio::test]
async fn test_clean_fails_when_listing_fails() {
    let (gateway, mut session) = memory_session();
    gateway.fail_on(GET_INPUT_LIST, None);
    assert!(session.clean().await.is_err());
}

#[tokio::test]
async fn test_clean_after_restart_removes_everything_owned() {
    let (gateway, mut session) = memory_session();
    session.sync(&scene_with("Show", &[chat("https://x")])).await.unwrap();
    gateway.seed_input("Main", "Logo", "image_source", json!({}));

    let mut restarted = restart(&gateway);
    let report = restarted.clean().await.unwrap();
    assert_eq!(report.removed_inputs, vec!["Chat"]);
    assert_eq!(report.removed_scenes, vec!["Show"]);
    assert_eq!(gateway.scene_names(), vec!["Main"]);
    assert_eq!(gateway.input_names(), vec!["Logo"]);
}

#[tokio::test]
async fn test_file_ledger_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let gateway = Arc::new(MemoryGateway::new());

    let ledger = Arc::new(FileLedger::open(&path).await.unwrap());
    let mut session = Session::with_ledger(gateway.clone(), ledger, SyncConfig::default());
    session.sync(&scene_with("Show", &[chat("https://x")])).await.unwrap();
    assert_eq!(gateway.count(SET_SOURCE_PRIVATE_SETTINGS), 0);

    // A fresh process with no declarations cleans up from the file
    let ledger = Arc::new(FileLedger::open(&path).await.unwrap());
    let mut restarted = Session::with_ledger(gateway.clone(), ledger, SyncConfig::default());
    let report = restarted.clean().await.unwrap();
    assert_eq!(report.removed_inputs, vec!["Chat"]);
    assert_eq!(report.removed_scenes, vec!["Show"]);

    let ledger = FileLedger::open(&path).await.unwrap();
    assert_eq!(ledger.read("Chat").await.unwrap(), None);
}
