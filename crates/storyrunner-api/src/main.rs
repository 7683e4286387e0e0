//! Story runner API server entry point.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use storyrunner_api::config::ServerConfig;
use storyrunner_api::error::AppError;
use storyrunner_api::launcher::LocalModuleLauncher;
use storyrunner_api::routes;
use storyrunner_api::shell::LoggingShellHost;
use storyrunner_api::state::AppState;
use storyrunner_controller::{StoryCollaborators, StoryController};
use storyrunner_ledger::InMemoryLedger;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting story runner API server");

    let config = ServerConfig::from_env()?;

    // Wire the story controller to its collaborators.
    let ledger = InMemoryLedger::new();
    let page = ledger.page(&config.story_id);
    let collaborators = StoryCollaborators::new(
        page,
        Arc::new(LocalModuleLauncher::new()),
        Arc::new(LoggingShellHost),
    );
    let controller = StoryController::spawn(
        config.story_id.clone(),
        collaborators,
        config.controller.clone(),
    );
    let app_state = AppState::new(controller);

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/story", routes::story::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!(story_id = %config.story_id, "Listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
