use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::engine::machine::TaskAction;
use crate::models::task::TaskStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not signed in")]
    NotAuthenticated,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no active task")]
    NoActiveTask,

    #[error("action {action} is not available while the task is {status}")]
    ActionUnavailable {
        action: TaskAction,
        status: TaskStatus,
    },

    #[error("a task update is already in flight")]
    UpdateInFlight,

    #[error("task {0} is not linked to an order")]
    MissingOrderLink(String),

    #[error("already working on a task; complete it first")]
    TaskInFlight,

    #[error("task is no longer available; the queue was reloaded")]
    QueueOutOfDate,

    #[error("no collected cash to deposit")]
    NothingToDeposit,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoActiveTask
            | AppError::ActionUnavailable { .. }
            | AppError::UpdateInFlight
            | AppError::TaskInFlight
            | AppError::NothingToDeposit => StatusCode::CONFLICT,
            AppError::MissingOrderLink(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::QueueOutOfDate => StatusCode::GONE,
            AppError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Store(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
