//! Reconciler tests against the in-memory remote

use pretty_assertions::assert_eq;
use scenesync_core::prelude::*;
use scenesync_core::protocol::requests::*;
use scenesync_core::SyncError;
use scenesync_test_utils::*;
use serde_json::json;

fn main_with_chat(url: &str) -> SceneDeclaration {
    SceneDeclaration::new("Main").with_item("chat", SceneItemDeclaration::new(chat(url)))
}

#[tokio::test]
async fn test_end_to_end_create_patch_prune() {
    let (gateway, mut session) = memory_session();

    // First sync creates scene and input
    let scene = session.sync(&main_with_chat("https://x")).await.unwrap();
    assert_eq!(gateway.count(CREATE_SCENE), 1);
    assert_eq!(gateway.count(CREATE_INPUT), 1);
    assert_eq!(removes(&gateway), 0);
    let chat_id = scene.item("chat").unwrap().id();

    // Second sync patches only the changed key
    gateway.clear_calls();
    session.sync(&main_with_chat("https://y")).await.unwrap();
    assert_eq!(creates(&gateway), 0);
    let patches: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.method == SET_INPUT_SETTINGS)
        .collect();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].params["inputSettings"], json!({ "url": "https://y" }));
    assert_eq!(
        gateway.input_settings("Chat").unwrap()["url"],
        json!("https://y")
    );

    // Third sync drops the item but keeps the input
    gateway.clear_calls();
    session.sync(&SceneDeclaration::new("Main")).await.unwrap();
    let removed: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.method == REMOVE_SCENE_ITEM)
        .collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].params["sceneItemId"], json!(chat_id));
    assert_eq!(gateway.count(REMOVE_INPUT), 0);
    assert!(gateway.has_input("Chat"));
}

#[tokio::test]
async fn test_unchanged_declaration_is_idempotent() {
    let (gateway, mut session) = memory_session();
    let main = main_with_chat("https://x");

    session.sync(&main).await.unwrap();
    gateway.clear_calls();
    session.sync(&main).await.unwrap();

    assert_eq!(creates(&gateway), 0);
    assert!(scene_mutations(&gateway).is_empty());
}

#[tokio::test]
async fn test_idempotent_across_restart() {
    let (gateway, mut session) = memory_session();
    let main = main_with_chat("https://x");
    session.sync(&main).await.unwrap();

    let mut restarted = restart(&gateway);
    gateway.clear_calls();
    let scene = restarted.sync(&main).await.unwrap();

    assert_eq!(creates(&gateway), 0);
    assert!(scene_mutations(&gateway).is_empty());
    assert_eq!(scene.item("chat").unwrap().source_name(), "Chat");
    assert!(restarted.registry().has("Chat"));
}

#[tokio::test]
async fn test_shared_input_created_once() {
    let (gateway, mut session) = memory_session();
    let a = scene_with("A", &[chat("https://x")]);
    let b = scene_with("B", &[chat("https://x")]);

    session.sync(&a).await.unwrap();
    session.sync(&b).await.unwrap();

    assert_eq!(gateway.count(CREATE_INPUT), 1);
    let memberships: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.method == CREATE_SCENE_ITEM)
        .collect();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].param("sceneName"), Some("B"));
    assert_eq!(memberships[0].param("sourceName"), Some("Chat"));
    assert_eq!(gateway.item_sources("B"), vec!["Chat"]);
}

#[tokio::test]
async fn test_prune_removes_item_not_input() {
    let (gateway, mut session) = memory_session();
    let main = main_with_chat("https://x");
    session.sync(&main).await.unwrap();

    let ad = gateway.seed_input("Main", "Ad", "image_source", json!({}));
    gateway.clear_calls();
    session.sync(&main).await.unwrap();

    let removed: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.method == REMOVE_SCENE_ITEM)
        .collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].params["sceneItemId"], json!(ad));
    assert_eq!(gateway.count(REMOVE_INPUT), 0);
    assert!(gateway.has_input("Ad"));
}

#[tokio::test]
async fn test_prune_disabled_keeps_items() {
    let (gateway, mut session) = memory_session_with(SyncConfig::default().with_prune(false));
    gateway.seed_input("Main", "Ad", "image_source", json!({}));

    session.sync(&main_with_chat("https://x")).await.unwrap();
    assert_eq!(gateway.count(REMOVE_SCENE_ITEM), 0);
    assert_eq!(gateway.item_sources("Main"), vec!["Ad", "Chat"]);
}

#[tokio::test]
async fn test_kind_conflict_issues_no_mutation() {
    let (gateway, mut session) = memory_session();
    gateway.seed_input("Main", "Chat", "color_source", json!({}));

    let err = session.sync(&main_with_chat("https://x")).await.unwrap_err();
    let leaves = err.flatten();
    assert_eq!(leaves.len(), 1);
    assert!(leaves[0].is_conflict());
    let message = leaves[0].to_string();
    assert!(message.contains("Chat"));
    assert!(message.contains("browser_source"));
    assert!(message.contains("color_source"));

    assert!(gateway.mutations().is_empty());
    assert_eq!(gateway.input_kind("Chat").as_deref(), Some("color_source"));
}

#[tokio::test]
async fn test_unowned_input_is_conflict_by_default() {
    let (gateway, mut session) = memory_session();
    gateway.seed_input("Main", "Chat", "browser_source", json!({ "url": "https://other" }));

    let err = session.sync(&main_with_chat("https://x")).await.unwrap_err();
    assert!(err.flatten().iter().all(|e| e.is_conflict()));
    assert_eq!(
        gateway.input_settings("Chat").unwrap()["url"],
        json!("https://other")
    );
}

#[tokio::test]
async fn test_skip_policy_leaves_foreign_input() {
    let config = SyncConfig::default().with_foreign_policy(ForeignPolicy::Skip);
    let (gateway, mut session) = memory_session_with(config);
    gateway.seed_input("Main", "Chat", "browser_source", json!({ "url": "https://other" }));

    let scene = session.sync(&main_with_chat("https://x")).await.unwrap();
    assert!(scene.item("chat").is_none());
    assert_eq!(gateway.count(SET_INPUT_SETTINGS), 0);
    assert_eq!(gateway.item_sources("Main"), vec!["Chat"]);
}

#[tokio::test]
async fn test_adopt_policy_claims_matching_kind() {
    let (gateway, mut session) = memory_session_with(adopting());
    gateway.seed_input("Main", "Chat", "browser_source", json!({ "url": "https://other" }));

    session.sync(&main_with_chat("https://x")).await.unwrap();
    assert_eq!(gateway.count(CREATE_INPUT), 0);
    assert_eq!(gateway.input_settings("Chat").unwrap()["url"], json!("https://x"));
    let private = gateway.private_settings("Chat").unwrap();
    assert_eq!(private["scenesync"]["owned"], json!(true));
}

#[tokio::test]
async fn test_adopt_policy_still_rejects_kind_mismatch() {
    let (gateway, mut session) = memory_session_with(adopting());
    gateway.seed_input("Main", "Chat", "color_source", json!({}));

    let err = session.sync(&main_with_chat("https://x")).await.unwrap_err();
    assert!(err.flatten()[0].is_conflict());
    assert!(gateway.mutations().is_empty());
}

#[tokio::test]
async fn test_input_name_taken_by_scene() {
    let (gateway, mut session) = memory_session();
    gateway.seed_scene("Chat");

    let err = session.sync(&main_with_chat("https://x")).await.unwrap_err();
    assert!(err.flatten()[0].is_conflict());
    assert_eq!(gateway.count(CREATE_INPUT), 0);
}

#[tokio::test]
async fn test_item_errors_do_not_stop_siblings() {
    let (gateway, mut session) = memory_session();
    gateway.seed_input("Main", "Cam", "color_source", json!({}));
    let main = scene_with("Main", &[browser("Cam", "https://cam"), chat("https://x")]);

    let err = session.sync(&main).await.unwrap_err();
    match &err {
        SyncError::Aggregate { scene, errors } => {
            assert_eq!(scene, "Main");
            assert_eq!(errors.len(), 1);
        }
        other => panic!("expected aggregate, got {other}"),
    }
    assert!(gateway.has_input("Chat"));
}

#[tokio::test]
async fn test_invalid_declaration_sends_nothing() {
    let (gateway, mut session) = memory_session();
    let looped = SceneDeclaration::new("Loop").with_item(
        "me",
        SceneItemDeclaration::new(SceneDeclaration::new("Loop")),
    );

    let err = session.sync(&looped).await.unwrap_err();
    assert!(matches!(err, SyncError::Model(_)));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_scene_list_failure_is_structural() {
    let (gateway, mut session) = memory_session();
    gateway.fail_on(GET_SCENE_LIST, None);

    let err = session.sync(&main_with_chat("https://x")).await.unwrap_err();
    assert!(matches!(err, SyncError::Gateway(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_input_filters_created_in_index_order() {
    let (gateway, mut session) = memory_session();
    let input = chat("https://x")
        .with_filter("b", color_filter("B", 1.0).with_index(1))
        .with_filter("c", color_filter("C", 1.0))
        .with_filter("a", color_filter("A", 1.0).with_index(0));

    session.sync(&scene_with("Main", &[input])).await.unwrap();
    assert_eq!(gateway.filter_names("Chat"), vec!["A", "B", "C"]);

    let private = gateway.private_settings("Chat").unwrap();
    assert_eq!(
        private["scenesync"]["ownedFilterNames"],
        json!(["A", "B", "C"])
    );
}

#[tokio::test]
async fn test_filter_update_is_minimal() {
    let (gateway, mut session) = memory_session();
    let input = chat("https://x").with_filter("color", color_filter("Color", 1.0));
    session.sync(&scene_with("Main", &[input])).await.unwrap();

    let changed = chat("https://x").with_filter("color", color_filter("Color", 2.2).with_enabled(false));
    gateway.clear_calls();
    session.sync(&scene_with("Main", &[changed])).await.unwrap();

    assert_eq!(gateway.count(SET_SOURCE_FILTER_SETTINGS), 1);
    assert_eq!(gateway.count(SET_SOURCE_FILTER_ENABLED), 1);
    assert_eq!(gateway.count(CREATE_SOURCE_FILTER), 0);
    let filter = &gateway.filters("Chat")[0];
    assert_eq!(filter.settings["gamma"], json!(2.2));
    assert!(!filter.enabled);
}

#[tokio::test]
async fn test_foreign_filter_on_owned_input_is_rejected() {
    let (gateway, mut session) = memory_session();
    session.sync(&main_with_chat("https://x")).await.unwrap();
    gateway.seed_filter("Chat", "Sharpen", "sharpness_filter", json!({ "amount": 0.3 }));

    let input = chat("https://x").with_filter("sharpen", FilterConfig::new("Sharpen", "sharpness_filter"));
    let mut restarted = restart(&gateway);
    gateway.clear_calls();
    let err = restarted
        .sync(&scene_with("Main", &[input]))
        .await
        .unwrap_err();

    assert!(err.flatten()[0].is_ownership_violation());
    assert_eq!(gateway.count(SET_SOURCE_FILTER_SETTINGS), 0);
    assert_eq!(gateway.filters("Chat")[0].settings["amount"], json!(0.3));
}

#[tokio::test]
async fn test_undeclared_foreign_filters_are_left_alone() {
    let (gateway, mut session) = memory_session();
    let input = chat("https://x").with_filter("color", color_filter("Color", 1.0));
    session.sync(&scene_with("Main", &[input.clone()])).await.unwrap();
    gateway.seed_filter("Chat", "Mask", "mask_filter", json!({}));

    let mut restarted = restart(&gateway);
    restarted.sync(&scene_with("Main", &[input])).await.unwrap();
    assert_eq!(gateway.filter_names("Chat"), vec!["Color", "Mask"]);
    assert_eq!(gateway.count(REMOVE_SOURCE_FILTER), 0);
}

#[tokio::test]
async fn test_filter_kind_mismatch_is_conflict() {
    let (gateway, mut session) = memory_session();
    session.sync(&main_with_chat("https://x")).await.unwrap();
    gateway.seed_filter("Chat", "Color", "mask_filter", json!({}));

    let input = chat("https://x").with_filter("color", color_filter("Color", 1.0));
    let err = session.sync(&scene_with("Main", &[input])).await.unwrap_err();
    assert!(err.flatten()[0].is_conflict());
}

#[tokio::test]
async fn test_scene_filters_on_existing_scene() {
    let (gateway, mut session) = memory_session();
    gateway.seed_scene("Main");
    gateway.seed_filter("Main", "Color", "color_filter_v2", json!({ "gamma": 0.5 }));

    let main = main_with_chat("https://x")
        .with_filter("color", color_filter("Color", 2.0))
        .with_filter("blur", FilterConfig::new("Blur", "blur_filter"));
    session.sync(&main).await.unwrap();

    // Pre-existing filter untouched, new one created and recorded
    let filters = gateway.filters("Main");
    assert_eq!(filters[0].settings["gamma"], json!(0.5));
    assert_eq!(gateway.filter_names("Main"), vec!["Color", "Blur"]);
    let private = gateway.private_settings("Main").unwrap();
    assert_eq!(private["scenesync"]["owned"], json!(false));
    assert_eq!(private["scenesync"]["ownedFilterNames"], json!(["Blur"]));
}

#[tokio::test]
async fn test_scene_filter_push_when_configured() {
    let config = SyncConfig::default().with_push_existing_scene_filters(true);
    let (gateway, mut session) = memory_session_with(config);
    gateway.seed_scene("Main");
    gateway.seed_filter("Main", "Color", "color_filter_v2", json!({ "gamma": 0.5 }));

    let main = SceneDeclaration::new("Main").with_filter("color", color_filter("Color", 2.0));
    session.sync(&main).await.unwrap();
    assert_eq!(gateway.filters("Main")[0].settings["gamma"], json!(2.0));
}

#[tokio::test]
async fn test_nested_scene_synced_before_parent() {
    let (gateway, mut session) = memory_session();
    let overlay = scene_with("Overlay", &[chat("https://x")]);
    let main = SceneDeclaration::new("Main").with_item("overlay", SceneItemDeclaration::new(overlay));

    let scene = session.sync(&main).await.unwrap();
    assert_eq!(scene.name(), "Main");
    assert_eq!(scene.item("overlay").unwrap().source_name(), "Overlay");
    assert_eq!(gateway.item_sources("Main"), vec!["Overlay"]);
    assert_eq!(gateway.item_sources("Overlay"), vec!["Chat"]);

    let created: Vec<String> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.method == CREATE_SCENE)
        .filter_map(|c| c.param("sceneName").map(str::to_string))
        .collect();
    assert_eq!(created, vec!["Overlay", "Main"]);
}

#[tokio::test]
async fn test_item_placement_applied() {
    let (gateway, mut session) = memory_session();
    let item = SceneItemDeclaration::new(chat("https://x"))
        .with_transform(Transform::new().with_position(10.0, 20.0))
        .with_enabled(false)
        .with_locked(true);
    let main = SceneDeclaration::new("Main").with_item("chat", item);

    let scene = session.sync(&main).await.unwrap();
    let id = scene.item("chat").unwrap().id();
    let transform = gateway.item_transform("Main", id).unwrap();
    assert_eq!(transform["positionX"], json!(10.0));
    assert_eq!(transform["positionY"], json!(20.0));
    let live = &gateway.items("Main")[0];
    assert!(!live.enabled);
    assert!(live.locked);
}

#[tokio::test]
async fn test_locked_transform_is_skipped() {
    let (gateway, mut session) = memory_session();
    gateway.lock_transform("Chat");
    let item = SceneItemDeclaration::new(chat("https://x"))
        .with_transform(Transform::new().with_rotation(90.0));
    let main = SceneDeclaration::new("Main").with_item("chat", item);

    let scene = session.sync(&main).await.unwrap();
    let id = scene.item("chat").unwrap().id();
    assert!(gateway.item_transform("Main", id).unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_failure_converges_on_next_sync() {
    let (gateway, mut session) = memory_session();
    let input = chat("https://x").with_filter("color", color_filter("Color", 1.0));
    let main = scene_with("Main", &[input]);

    gateway.fail_on(CREATE_SOURCE_FILTER, None);
    assert!(session.sync(&main).await.is_err());
    assert!(gateway.has_input("Chat"));

    gateway.clear_failures();
    session.sync(&main).await.unwrap();
    assert_eq!(gateway.count(CREATE_INPUT), 1);
    assert_eq!(gateway.filter_names("Chat"), vec!["Color"]);
}

#[tokio::test]
async fn test_failed_ownership_write_is_retried() {
    let (gateway, mut session) = memory_session();
    let input = chat("https://x").with_filter("color", color_filter("Color", 1.0));
    let main = scene_with("Main", &[input]);

    gateway.fail_on(SET_SOURCE_PRIVATE_SETTINGS, Some("Chat"));
    assert!(session.sync(&main).await.is_err());
    assert!(gateway.has_input("Chat"));
    assert!(session.registry().has("Chat"));

    gateway.clear_failures();
    session.sync(&main).await.unwrap();
    assert_eq!(gateway.count(CREATE_INPUT), 1);
    assert_eq!(gateway.filter_names("Chat"), vec!["Color"]);
    let private = gateway.private_settings("Chat").unwrap();
    assert_eq!(private["scenesync"]["owned"], json!(true));
    assert_eq!(private["scenesync"]["ownedFilterNames"], json!(["Color"]));

    // A fresh process recognises the input as its own
    let mut restarted = restart(&gateway);
    restarted.sync(&main).await.unwrap();
    assert_eq!(gateway.count(CREATE_INPUT), 1);
}

#[tokio::test]
async fn test_prune_removes_extra_items_of_declared_source() {
    let (gateway, mut session) = memory_session();
    let twice = SceneDeclaration::new("Main")
        .with_item("a", SceneItemDeclaration::new(chat("https://x")))
        .with_item("b", SceneItemDeclaration::new(chat("https://x")));
    session.sync(&twice).await.unwrap();
    assert_eq!(gateway.item_sources("Main"), vec!["Chat", "Chat"]);

    gateway.clear_calls();
    let once = SceneDeclaration::new("Main")
        .with_item("a", SceneItemDeclaration::new(chat("https://x")));
    let scene = session.sync(&once).await.unwrap();
    assert_eq!(gateway.count(REMOVE_SCENE_ITEM), 1);
    assert_eq!(gateway.count(REMOVE_INPUT), 0);
    assert_eq!(gateway.item_sources("Main"), vec!["Chat"]);
    assert_eq!(scene.item("a").unwrap().id(), gateway.items("Main")[0].id);
}

#[tokio::test]
async fn test_declaration_from_yaml() {
    let (gateway, mut session) = memory_session();
    let main = SceneDeclaration::from_yaml_str(
        r#"
name: Main
items:
  chat:
    source:
      input:
        name: Chat
        kind: browser_source
        settings:
          url: https://x
"#,
    )
    .unwrap();

    session.sync(&main).await.unwrap();
    assert_eq!(gateway.input_kind("Chat").as_deref(), Some("browser_source"));
}

#[tokio::test]
async fn test_typed_kind_declarations() {
    let (gateway, mut session) = memory_session();
    let settings = BrowserSettings {
        url: "https://x".into(),
        width: Some(800),
        height: None,
    };
    let color = FilterConfig::of_kind::<ColorCorrection>(
        "Color",
        &ColorCorrectionSettings { gamma: 0.5 },
    )
    .unwrap();
    let chat = InputDeclaration::of_kind::<BrowserSource>("Chat", &settings)
        .unwrap()
        .with_filter("color", color);

    session.sync(&scene_with("Main", &[chat])).await.unwrap();
    assert_eq!(gateway.input_kind("Chat").as_deref(), Some("browser_source"));
    let live = gateway.input_settings("Chat").unwrap();
    assert_eq!(live["width"], json!(800));
    assert!(live.get("height").is_none());
    assert_eq!(gateway.filters("Chat")[0].kind, "color_filter_v2");
}
