//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::conversation::core::errors::StoreError;
use crate::llm::LlmError;

/// Errors surfaced by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected request input.
    #[error("{0}")]
    BadRequest(String),
    /// Missing resource.
    #[error("{0}")]
    NotFound(String),
    /// Conversation store failure.
    #[error(transparent)]
    Store(StoreError),
    /// Model API failure.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(format!("Session not found: {id}")),
            other => Self::Store(other),
        }
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Llm(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(err) => {
                tracing::warn!(%err, "Conversation store failure");
                "Conversation store unavailable".to_string()
            }
            Self::Llm(err) => {
                tracing::warn!(%err, "Model request failed");
                format!("Model error: {err}")
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::core::ids::SessionId;

    #[test]
    fn store_not_found_maps_to_404() {
        let err = ApiError::from(StoreError::NotFound(SessionId::new("s1")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Session not found: s1");
    }

    #[test]
    fn backend_failure_maps_to_500() {
        let err = ApiError::from(StoreError::Backend("down".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
