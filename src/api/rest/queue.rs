use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::queue::{CancelReason, QueueView};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queue", get(current_view))
        .route("/queue/init", post(init_view))
        .route("/queue/order", put(reorder))
        .route("/queue/route", post(save_route))
        .route("/queue/tasks/:id/start", post(start_task))
        .route("/queue/tasks/:id/cancel", post(cancel_task))
}

async fn current_view(State(state): State<Arc<AppState>>) -> Json<QueueView> {
    Json(state.queue.view())
}

async fn init_view(State(state): State<Arc<AppState>>) -> Result<Json<QueueView>, AppError> {
    Ok(Json(state.queue.initialize().await?))
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<String>,
}

async fn reorder(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<QueueView>, AppError> {
    Ok(Json(state.queue.reorder(&payload.order)?))
}

#[derive(Serialize)]
struct SaveRouteResponse {
    saved: bool,
}

async fn save_route(State(state): State<Arc<AppState>>) -> Result<Json<SaveRouteResponse>, AppError> {
    state.queue.save_route().await?;
    Ok(Json(SaveRouteResponse { saved: true }))
}

/// Started tasks continue on the progression view; the response says so as
/// data, navigation itself is the caller's concern.
#[derive(Serialize)]
struct StartResponse {
    task_id: String,
    next_view: &'static str,
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StartResponse>, AppError> {
    state.queue.start(&id).await?;
    Ok(Json(StartResponse {
        task_id: id,
        next_view: "home",
    }))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(reason): Json<CancelReason>,
) -> Result<Json<QueueView>, AppError> {
    Ok(Json(state.queue.cancel(&id, &reason).await?))
}
