//! Integration tests for the story endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use storyrunner_core::module::ModulePath;
use storyrunner_test_support::ScriptedLauncher;

#[tokio::test]
async fn test_get_info_returns_initial_story() {
    let app = common::build_test_app();

    let (status, json) = common::get_json(app.router, "/api/v1/story").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["story_id"], common::STORY_ID);
    assert_eq!(json["state"], "initial");
    assert!(json["url"].is_null());
}

#[tokio::test]
async fn test_start_and_stop_report_story_state() {
    // Arrange
    let app = common::build_test_app();

    // Act
    let (start_status, started) =
        common::post_json(app.router.clone(), "/api/v1/story/start", &json!({})).await;
    let (stop_status, stopped) =
        common::post_json(app.router, "/api/v1/story/stop", &json!({})).await;

    // Assert
    assert_eq!(start_status, StatusCode::OK);
    assert_eq!(started["state"], "running");
    assert_eq!(stop_status, StatusCode::OK);
    assert_eq!(stopped["state"], "stopped");
    assert_eq!(app.shell_host.launches(), 1);
}

#[tokio::test]
async fn test_added_module_starts_with_the_story() {
    // Arrange
    let app = common::build_test_app();
    let (status, added) = common::post_json(
        app.router.clone(),
        "/api/v1/story/modules",
        &json!({ "name": "weather", "url": "mod://weather" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["module_path"], json!(["weather"]));

    // Act
    common::post_json(app.router.clone(), "/api/v1/story/start", &json!({})).await;
    let (status, active) = common::get_json(app.router, "/api/v1/story/modules/active").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let active = active.as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["module_url"], "mod://weather");
    assert_eq!(
        app.launcher.launched(),
        vec![ModulePath::from_segments(["weather"])]
    );
}

#[tokio::test]
async fn test_list_modules_includes_modules_not_yet_running() {
    // Arrange
    let app = common::build_test_app();
    common::post_json(
        app.router.clone(),
        "/api/v1/story/modules",
        &json!({ "name": "notes", "url": "mod://notes" }),
    )
    .await;

    // Act
    let (status, modules) = common::get_json(app.router.clone(), "/api/v1/story/modules").await;
    let (_, active) = common::get_json(app.router, "/api/v1/story/modules/active").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modules.as_array().unwrap().len(), 1);
    assert_eq!(modules[0]["module_path"], json!(["notes"]));
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_add_module_below_unknown_parent_returns_400() {
    // Arrange
    let app = common::build_test_app();
    common::post_json(app.router.clone(), "/api/v1/story/start", &json!({})).await;

    // Act
    let (status, json) = common::post_json(
        app.router,
        "/api/v1/story/modules",
        &json!({ "parent": ["ghost"], "name": "child", "url": "mod://child" }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_parent");
}

#[tokio::test]
async fn test_failing_launch_returns_502() {
    // Arrange
    let app = common::build_test_app_with_launcher(ScriptedLauncher::new().failing("mod://broken"));
    common::post_json(app.router.clone(), "/api/v1/story/start", &json!({})).await;

    // Act
    let (status, json) = common::post_json(
        app.router,
        "/api/v1/story/modules",
        &json!({ "name": "broken", "url": "mod://broken" }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "launch_failure");
}

#[tokio::test]
async fn test_stop_module_that_is_not_running_returns_404() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        app.router,
        "/api/v1/story/modules/stop",
        &json!({ "module_path": ["nobody"] }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "module_not_running");
}

#[tokio::test]
async fn test_stop_module_stops_a_running_module() {
    // Arrange
    let app = common::build_test_app();
    common::post_json(app.router.clone(), "/api/v1/story/start", &json!({})).await;
    common::post_json(
        app.router.clone(),
        "/api/v1/story/modules",
        &json!({ "name": "timer", "url": "mod://timer" }),
    )
    .await;

    // Act
    let (status, json) = common::post_json(
        app.router.clone(),
        "/api/v1/story/modules/stop",
        &json!({ "module_path": ["timer"] }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(
        app.launcher.stopped(),
        vec![ModulePath::from_segments(["timer"])]
    );
    let (_, active) = common::get_json(app.router, "/api/v1/story/modules/active").await;
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_focus_records_last_focus_time() {
    // Arrange
    let app = common::build_test_app();
    common::post_json(app.router.clone(), "/api/v1/story/start", &json!({})).await;
    common::post_json(
        app.router.clone(),
        "/api/v1/story/modules",
        &json!({ "name": "map", "url": "mod://map" }),
    )
    .await;

    // Act
    let (focus_status, _) = common::post_json(
        app.router.clone(),
        "/api/v1/story/modules/focus",
        &json!({ "module_path": ["map"] }),
    )
    .await;
    let (defocus_status, _) = common::post_json(
        app.router.clone(),
        "/api/v1/story/modules/defocus",
        &json!({ "module_path": ["map"] }),
    )
    .await;
    let (_, info) = common::get_json(app.router, "/api/v1/story").await;

    // Assert
    assert_eq!(focus_status, StatusCode::OK);
    assert_eq!(defocus_status, StatusCode::OK);
    assert!(info["last_focus_time"].is_string());
}

#[tokio::test]
async fn test_put_extra_updates_story_info() {
    let app = common::build_test_app();

    let (status, info) = common::put_json(
        app.router,
        "/api/v1/story/extra/color",
        &json!({ "value": "teal" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["extra"]["color"], "teal");
}

#[tokio::test]
async fn test_written_link_value_is_read_back() {
    // Arrange
    let app = common::build_test_app();
    let link = json!({ "module_path": ["recipe"], "link_name": "servings" });

    // Act
    let (write_status, written) = common::post_json(
        app.router.clone(),
        "/api/v1/story/links/write",
        &json!({ "module_path": ["recipe"], "link_name": "servings", "value": { "count": 4 } }),
    )
    .await;
    let (read_status, read) =
        common::post_json(app.router, "/api/v1/story/links/read", &link).await;

    // Assert
    assert_eq!(write_status, StatusCode::OK);
    assert_eq!(written["value"], json!({ "count": 4 }));
    assert_eq!(read_status, StatusCode::OK);
    assert_eq!(read["link_name"], "servings");
    assert_eq!(read["value"], json!({ "count": 4 }));
}

#[tokio::test]
async fn test_sync_acknowledges() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(app.router, "/api/v1/story/sync", &json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn test_requests_after_delete_return_503() {
    // Arrange
    let app = common::build_test_app();
    app.controller.stop_for_delete().await.unwrap();

    // Act
    let (status, json) = common::get_json(app.router, "/api/v1/story").await;

    // Assert
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "story_halted");
}
