use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use redis::RedisError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::queue::QueueStatus;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("{0}")]
    Validation(String),
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Waiting list entry {0} not found")]
    EntryNotFound(String),
    #[error("{0} is already in the waiting list")]
    DuplicateEntry(String),
    #[error("Cannot move entry from {from} to {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
            other => AppError::MalformedRequest(other.body_text()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::MalformedRequest(_)
            | AppError::InvalidPhoneNumber(_)
            | AppError::InvalidRecipient(_)
            | AppError::UnsupportedMediaType(_) => StatusCode::BAD_REQUEST,
            AppError::EntryNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateEntry(_) | AppError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Upstream(UpstreamError::Unavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Upstream(_)
            | AppError::RedisError(_)
            | AppError::JsonError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            AppError::Validation(msg) => ("Validation failed", Some(msg.clone())),
            AppError::MalformedRequest(msg) => ("Malformed request", Some(msg.clone())),
            AppError::InvalidPhoneNumber(msg) => ("Invalid phone number", Some(msg.clone())),
            AppError::InvalidRecipient(msg) => ("Invalid recipient", Some(msg.clone())),
            AppError::UnsupportedMediaType(kind) => (
                "Unsupported media type",
                Some(format!(
                    "'{kind}' is not one of image, document, video, audio"
                )),
            ),
            AppError::EntryNotFound(_) => ("Not found", Some(self.to_string())),
            AppError::DuplicateEntry(_) => ("Already in waiting list", Some(self.to_string())),
            AppError::InvalidTransition { .. } => {
                ("Invalid status transition", Some(self.to_string()))
            }
            AppError::Upstream(UpstreamError::Unavailable { .. }) => {
                ("Upstream provider unavailable", None)
            }
            AppError::Upstream(UpstreamError::Rejected { status, .. }) => (
                "Upstream provider rejected the request",
                Some(format!("provider responded with status {status}")),
            ),
            AppError::Upstream(UpstreamError::Failed { .. }) => ("Upstream provider error", None),
            AppError::RedisError(_) | AppError::JsonError(_) | AppError::Internal(_) => {
                ("Internal server error", None)
            }
        };
        ErrorBody {
            success: false,
            error,
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "request failed: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
