//! HTTP error responses.
//!
//! [`AppError`] bridges [`AdmissionError`] and HTTP, implementing Axum's
//! `IntoResponse`. Bodies are `{"code": …, "message": …}`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use waitline_core::error::{AdmissionError, ErrorKind, StoreError};

/// Application error type for handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    retry_after: Option<Duration>,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            retry_after: None,
            source: None,
        }
    }

    /// Attach an internal error for logging; it is never sent to the client.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} {id} not found"),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        let message = err.to_string();
        match &err {
            AdmissionError::Throttled { retry_after } => Self {
                retry_after: Some(*retry_after),
                ..Self::new(StatusCode::TOO_MANY_REQUESTS, "THROTTLED", message)
            },
            AdmissionError::EventCancelled(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "EVENT_CANCELLED", message)
            }
            AdmissionError::EventPassed(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "EVENT_PASSED", message)
            }
            AdmissionError::OwnEvent { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "OWN_EVENT", message)
            }
            AdmissionError::Store(StoreError::Conflict(_) | StoreError::Unavailable(_)) => {
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "The service is busy, please retry",
                )
                .with_source(err.into())
            }
            AdmissionError::Store(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
            _ => match err.kind() {
                ErrorKind::NotFound => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
                ErrorKind::Conflict => Self::new(StatusCode::CONFLICT, "ALREADY_QUEUED", message),
                ErrorKind::Validation => Self::bad_request(message),
                ErrorKind::InvalidState | ErrorKind::Throttled | ErrorKind::Store => {
                    Self::new(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE", message)
                }
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(status = %self.status, code = self.code, "Request failed"),
            }
        } else {
            tracing::debug!(status = %self.status, code = self.code, message = %self.message, "Request rejected");
        }

        let retry_after = self.retry_after;
        let mut response = (
            self.status,
            Json(ErrorResponse {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response();

        if let Some(retry_after) = retry_after {
            // Round up so clients never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
