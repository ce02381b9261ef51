//! Error types for the API

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// JSON error body returned by every failing route
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Error, Debug, Clone)]
pub enum WebError {
    #[error("{0}")]
    BadRequest(String),

    /// Request the framework could not extract, with the status it chose
    #[error("{1}")]
    Rejected(StatusCode, String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Missing x-org-id header")]
    MissingOrgId,

    #[error("Invalid x-org-id header: {0}")]
    InvalidOrgId(String),

    #[error("Site with this URL already exists")]
    Conflict(String),

    /// Storage failure during ingestion; the cause is logged, never returned
    #[error("Failed to process heartbeat")]
    IngestFailed(String),

    #[error("Database error")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WebError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) | WebError::MissingOrgId | WebError::InvalidOrgId(_) => {
                StatusCode::BAD_REQUEST
            }
            WebError::Rejected(code, _) => *code,
            WebError::SiteNotFound(_) => StatusCode::NOT_FOUND,
            WebError::Conflict(_) => StatusCode::CONFLICT,
            WebError::IngestFailed(_)
            | WebError::Database(_)
            | WebError::Internal(_)
            | WebError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<pulsar::Error> for WebError {
    fn from(err: pulsar::Error) -> Self {
        match err {
            pulsar::Error::BadRequest(msg) => WebError::BadRequest(msg),
            pulsar::Error::SiteNotFound { url } => WebError::SiteNotFound(url),
            pulsar::Error::UnknownSite(id) => WebError::SiteNotFound(id.to_string()),
            pulsar::Error::DuplicateSite { url } => WebError::Conflict(url),
            pulsar::Error::Storage(msg) => WebError::Database(msg),
            pulsar::Error::Serialization(e) => WebError::Serialization(e.to_string()),
        }
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for WebError {
    fn from(rejection: PathRejection) -> Self {
        WebError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for WebError {
    fn from(rejection: QueryRejection) -> Self {
        WebError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<serde_json::Error> for WebError {
    fn from(err: serde_json::Error) -> Self {
        WebError::Serialization(err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            match &self {
                WebError::IngestFailed(cause) | WebError::Database(cause) => {
                    tracing::error!(error = %cause, "{}", self)
                }
                _ => tracing::error!(error = %self, "Request failed"),
            }
        } else {
            tracing::debug!(status = code.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

pub type WebResult<T> = Result<T, WebError>;
