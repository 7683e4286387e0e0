//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use storyrunner_api::routes;
use storyrunner_api::state::AppState;
use storyrunner_controller::{ControllerConfig, StoryCollaborators, StoryController};
use storyrunner_ledger::InMemoryPage;
use storyrunner_test_support::{FixedClock, RecordingShellHost, ScriptedLauncher};

/// Id of the story hosted by every test app.
pub const STORY_ID: &str = "story-1";

/// The app router plus the scripted collaborators behind it.
pub struct TestApp {
    pub router: Router,
    pub controller: StoryController,
    pub launcher: ScriptedLauncher,
    pub shell_host: Arc<RecordingShellHost>,
    pub page: Arc<InMemoryPage>,
}

/// Build the full app router with scripted collaborators and a pinned clock.
/// Uses the same route structure as `main.rs`.
pub fn build_test_app() -> TestApp {
    build_test_app_with_launcher(ScriptedLauncher::new())
}

/// Build the full app router around a custom `ScriptedLauncher`.
pub fn build_test_app_with_launcher(launcher: ScriptedLauncher) -> TestApp {
    let shell_host = Arc::new(RecordingShellHost::new());
    let page = Arc::new(InMemoryPage::new());
    let collaborators = StoryCollaborators::new(
        Arc::clone(&page) as Arc<dyn storyrunner_core::ledger::LedgerPage>,
        Arc::new(launcher.clone()),
        Arc::clone(&shell_host) as Arc<dyn storyrunner_controller::StoryShellHost>,
    )
    .with_clock(Arc::new(FixedClock::pinned()));
    let controller = StoryController::spawn(
        STORY_ID,
        collaborators,
        ControllerConfig::default().with_module_stop_timeout(std::time::Duration::from_millis(200)),
    );
    let app_state = AppState::new(controller.clone());

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/story", routes::story::router())
        .with_state(app_state);

    TestApp {
        router,
        controller,
        launcher,
        shell_host,
        page,
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, json_request("POST", uri, body)).await
}

/// Send a PUT request with a JSON body and return the response.
pub async fn put_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, json_request("PUT", uri, body)).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
