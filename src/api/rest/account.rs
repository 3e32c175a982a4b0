use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;

use crate::engine::account::{AccountView, DepositReceipt};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/account", get(account_view))
        .route("/account/deposit", post(deposit))
}

async fn account_view(State(state): State<Arc<AppState>>) -> Result<Json<AccountView>, AppError> {
    Ok(Json(state.account.view().await?))
}

async fn deposit(State(state): State<Arc<AppState>>) -> Result<Json<DepositReceipt>, AppError> {
    Ok(Json(state.account.deposit().await?))
}
