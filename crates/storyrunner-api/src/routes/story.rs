//! Routes for the hosted story.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use storyrunner_core::link::{LinkConnectionType, LinkPath};
use storyrunner_core::module::{ModuleData, ModuleIntent, ModulePath, Noun, SurfaceRelation};
use storyrunner_core::story::{StoryInfo, StoryState};

use crate::error::ApiError;
use crate::state::AppState;

/// Response body carrying the story state after a lifecycle request.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// Story state once the request completed.
    pub state: StoryState,
}

/// Request body for PUT /extra/{name}.
#[derive(Debug, Deserialize)]
pub struct ExtraRequest {
    /// Annotation value.
    pub value: String,
}

/// Request body for POST /modules.
#[derive(Debug, Deserialize)]
pub struct AddModuleRequest {
    /// Parent module; empty for a top-level module.
    #[serde(default)]
    pub parent: ModulePath,
    /// Module name below the parent.
    pub name: String,
    /// Module URL to launch.
    pub url: Option<String>,
    /// Verb to resolve when no URL is given.
    pub verb: Option<String>,
    /// Data slots handed to the module.
    #[serde(default)]
    pub nouns: BTreeMap<String, Noun>,
    /// Surface relation to the parent.
    #[serde(default)]
    pub relation: Option<SurfaceRelation>,
}

/// Response body for POST /modules.
#[derive(Debug, Serialize)]
pub struct ModuleResponse {
    /// Path of the added module.
    pub module_path: ModulePath,
}

/// Request body naming one module.
#[derive(Debug, Deserialize)]
pub struct ModulePathRequest {
    /// The module.
    pub module_path: ModulePath,
}

/// Request body for POST /links/write.
#[derive(Debug, Deserialize)]
pub struct LinkWriteRequest {
    /// The link to write.
    #[serde(flatten)]
    pub link: LinkPath,
    /// New link value.
    pub value: serde_json::Value,
}

/// Response body carrying a link value.
#[derive(Debug, Serialize)]
pub struct LinkValueResponse {
    /// The link.
    #[serde(flatten)]
    pub link: LinkPath,
    /// Its value.
    pub value: serde_json::Value,
}

/// Empty acknowledgement.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    /// Always `true`.
    pub ok: bool,
}

impl AckResponse {
    fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

/// GET /
#[instrument(skip(state))]
async fn get_info(State(state): State<AppState>) -> Result<Json<StoryInfo>, ApiError> {
    Ok(Json(state.controller.info().await?))
}

/// POST /start
#[instrument(skip(state))]
async fn start(State(state): State<AppState>) -> Result<Json<StateResponse>, ApiError> {
    info!(story_id = %state.controller.story_id(), "handling start request");
    state.controller.start().await?;
    Ok(Json(StateResponse {
        state: state.controller.state().await?,
    }))
}

/// POST /stop
#[instrument(skip(state))]
async fn stop(State(state): State<AppState>) -> Result<Json<StateResponse>, ApiError> {
    info!(story_id = %state.controller.story_id(), "handling stop request");
    state.controller.stop().await?;
    Ok(Json(StateResponse {
        state: state.controller.state().await?,
    }))
}

/// PUT /extra/{name}
#[instrument(skip(state, request))]
async fn set_extra(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ExtraRequest>,
) -> Result<Json<StoryInfo>, ApiError> {
    state.controller.set_info_extra(name, request.value).await?;
    Ok(Json(state.controller.info().await?))
}

/// GET /modules
#[instrument(skip(state))]
async fn list_modules(State(state): State<AppState>) -> Result<Json<Vec<ModuleData>>, ApiError> {
    Ok(Json(state.controller.modules().await?))
}

/// GET /modules/active
#[instrument(skip(state))]
async fn list_active_modules(
    State(state): State<AppState>,
) -> Result<Json<Vec<ModuleData>>, ApiError> {
    Ok(Json(state.controller.active_modules().await?.modules))
}

/// POST /modules
#[instrument(skip(state, request), fields(name = %request.name))]
async fn add_module(
    State(state): State<AppState>,
    Json(request): Json<AddModuleRequest>,
) -> Result<Json<ModuleResponse>, ApiError> {
    let module_path = request.parent.child(request.name.clone());
    let intent = ModuleIntent {
        url: request.url,
        verb: request.verb,
        nouns: request.nouns,
    };
    state
        .controller
        .add_module(
            request.parent,
            request.name,
            intent,
            request.relation.unwrap_or_default(),
        )
        .await?;
    info!(module = %module_path, "module added");
    Ok(Json(ModuleResponse { module_path }))
}

/// POST /modules/stop
#[instrument(skip(state, request), fields(module = %request.module_path))]
async fn stop_module(
    State(state): State<AppState>,
    Json(request): Json<ModulePathRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    state.controller.stop_module(request.module_path).await?;
    Ok(AckResponse::ok())
}

/// POST /modules/focus
#[instrument(skip(state, request), fields(module = %request.module_path))]
async fn focus_module(
    State(state): State<AppState>,
    Json(request): Json<ModulePathRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    state.controller.focus_module(request.module_path).await?;
    Ok(AckResponse::ok())
}

/// POST /modules/defocus
#[instrument(skip(state, request), fields(module = %request.module_path))]
async fn defocus_module(
    State(state): State<AppState>,
    Json(request): Json<ModulePathRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    state.controller.defocus_module(request.module_path).await?;
    Ok(AckResponse::ok())
}

/// POST /links/read
#[instrument(skip(state, link), fields(link = %link))]
async fn read_link(
    State(state): State<AppState>,
    Json(link): Json<LinkPath>,
) -> Result<Json<LinkValueResponse>, ApiError> {
    let connection = state
        .controller
        .connect_link(link.clone(), LinkConnectionType::ReadOnly)
        .await?;
    Ok(Json(LinkValueResponse {
        value: connection.get(),
        link,
    }))
}

/// POST /links/write
#[instrument(skip(state, request), fields(link = %request.link))]
async fn write_link(
    State(state): State<AppState>,
    Json(request): Json<LinkWriteRequest>,
) -> Result<Json<LinkValueResponse>, ApiError> {
    let connection = state
        .controller
        .connect_link(request.link.clone(), LinkConnectionType::ReadWrite)
        .await?;
    connection.set(request.value).await?;
    Ok(Json(LinkValueResponse {
        value: connection.get(),
        link: request.link,
    }))
}

/// POST /sync
#[instrument(skip(state))]
async fn sync(State(state): State<AppState>) -> Result<Json<AckResponse>, ApiError> {
    state.controller.sync().await?;
    Ok(AckResponse::ok())
}

/// Returns the router for the hosted story.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_info))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/extra/{name}", put(set_extra))
        .route("/modules", get(list_modules).post(add_module))
        .route("/modules/active", get(list_active_modules))
        .route("/modules/stop", post(stop_module))
        .route("/modules/focus", post(focus_module))
        .route("/modules/defocus", post(defocus_module))
        .route("/links/read", post(read_link))
        .route("/links/write", post(write_link))
        .route("/sync", post(sync))
}
