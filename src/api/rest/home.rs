use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::machine::TaskAction;
use crate::engine::progression::{ActionOutcome, HomeView};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/home", get(current_view))
        .route("/home/init", post(init_view))
        .route("/home/action", post(dispatch_action))
        .route("/home/contacted", post(contacted))
}

async fn current_view(State(state): State<Arc<AppState>>) -> Json<HomeView> {
    Json(state.home.view())
}

/// Idempotent entry point for the progression view: tears down any prior
/// feeds and re-attaches them, then reports the current view (which may
/// still be catching up with the first snapshot).
async fn init_view(State(state): State<Arc<AppState>>) -> Json<HomeView> {
    state.home.clone().initialize();
    Json(state.home.view())
}

#[derive(Deserialize)]
pub struct ActionRequest {
    pub action: TaskAction,
}

async fn dispatch_action(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ActionRequest>,
) -> Result<Json<ActionOutcome>, AppError> {
    let outcome = state.home.perform_action(payload.action).await?;
    Ok(Json(outcome))
}

async fn contacted(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.home.note_contacted().await?;
    Ok(StatusCode::NO_CONTENT)
}
