//! Relay error types.
//!
//! Every failure leaves the relay as `{"error": "..."}` with a status the
//! pairing client can act on: 404 means "keep polling", anything else is
//! final for that request.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Slot is empty")]
    SlotEmpty,

    #[error("Slot already holds an unread message")]
    SlotOccupied,

    #[error("Rate limited")]
    RateLimited,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SlotEmpty => StatusCode::NOT_FOUND,
            Self::SlotOccupied => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Malformed or oversized bodies caught by the `Json` extractor.
impl From<JsonRejection> for RelayError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
