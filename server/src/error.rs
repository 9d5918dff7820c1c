use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::SpeechError;
use voice_store::StoreError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speech provider error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Voice store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Speech(SpeechError::InvalidArgument(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Speech(e) => {
                tracing::error!("Speech provider error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Store(StoreError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Voice not found: {id}"))
            }
            ApiError::Store(e) => {
                tracing::error!("Voice store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Speech(SpeechError::InvalidArgument("Text is required".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Speech(SpeechError::UpstreamUnavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Speech(SpeechError::StreamInterrupted("reset".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Store(StoreError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Store(StoreError::Request("timeout".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
