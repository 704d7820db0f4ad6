//! Centralized error handling for the HTTP boundary.
//!
//! Every failure leaving a handler is an [`AppError`]; it renders as
//! `{"error": "<message>"}` with an optional machine-readable `code` and
//! `details`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::middleware::AuthRejection;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid request format: {0}")]
    RequestFormat(String),

    #[error("Authentication rejected: {0}")]
    Gate(#[from] AuthRejection),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A failed upstream operation whose message is safe to show.
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code, details) = match self {
            AppError::Validation(err) => {
                let details = json!(err.field_errors());
                (StatusCode::BAD_REQUEST, "Validation failed".to_string(), None, Some(details))
            },
            AppError::BadRequest(msg) | AppError::RequestFormat(msg) => (StatusCode::BAD_REQUEST, msg, None, None),
            AppError::Gate(rejection) => {
                tracing::warn!(code = rejection.code(), "Request rejected by authentication gate");
                (rejection.status(), rejection.to_string(), Some(rejection.code()), None)
            },
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None, None),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None, None),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None, None),
        };

        (status, Json(ErrorResponse { error, code, details })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use serde_json::Value;
    use validator::{ValidationError, ValidationErrors};

    use super::*;

    async fn extract_json_response(response: Response<Body>) -> (StatusCode, Value) {
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let json: Value = serde_json::from_slice(&body_bytes).expect("Failed to parse JSON response");
        (status, json)
    }

    #[tokio::test]
    async fn test_bad_request_error() {
        let response = AppError::BadRequest("Email and password are required".to_string()).into_response();
        let (status, json) = extract_json_response(response).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Email and password are required");
        assert!(json.get("code").is_none());
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn test_validation_error() {
        let mut errors = ValidationErrors::new();
        let mut email_error = ValidationError::new("email");
        email_error.message = Some("Invalid email format".into());
        errors.add("email", email_error);

        let (status, json) = extract_json_response(AppError::Validation(errors).into_response()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Validation failed");
        assert!(json["details"]["email"].is_array());
    }

    #[tokio::test]
    async fn test_gate_rejections() {
        let cases = [
            (AuthRejection::NoToken, StatusCode::UNAUTHORIZED, "No token provided", "no-token"),
            (AuthRejection::Expired, StatusCode::UNAUTHORIZED, "Token expired", "token-expired"),
            (AuthRejection::Revoked, StatusCode::UNAUTHORIZED, "Token revoked", "token-revoked"),
            (AuthRejection::Invalid, StatusCode::UNAUTHORIZED, "Invalid token", "invalid-token"),
            (AuthRejection::EmailNotVerified, StatusCode::FORBIDDEN, "Email verification required", "email-unverified"),
        ];

        for (rejection, expected_status, message, code) in cases {
            let (status, json) = extract_json_response(AppError::Gate(rejection).into_response()).await;
            assert_eq!(status, expected_status);
            assert_eq!(json["error"], message);
            assert_eq!(json["code"], code);
        }
    }

    #[tokio::test]
    async fn test_gate_unavailable() {
        let (status, json) = extract_json_response(AppError::Gate(AuthRejection::Unavailable).into_response()).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "provider-unavailable");
    }

    #[tokio::test]
    async fn test_forbidden_error() {
        let response = AppError::Forbidden("Unauthorized to delete this account".to_string()).into_response();
        let (status, json) = extract_json_response(response).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "Unauthorized to delete this account");
    }

    #[tokio::test]
    async fn test_internal_error_keeps_message() {
        let response = AppError::Internal("Failed to create user".to_string()).into_response();
        let (status, json) = extract_json_response(response).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to create user");
    }
}
