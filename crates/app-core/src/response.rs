//! Success envelope for JSON API responses: `{"success": true, "message"?, ...data}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

/// Payload for responses that only carry the envelope.
#[derive(Serialize, Debug, Default, Clone, Copy)]
pub struct Empty {}

#[derive(Serialize)]
pub struct Response<T> {
    success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    #[serde(flatten)]
    data: T,

    #[serde(skip)]
    status: StatusCode,
}

impl<T> Response<T> {
    pub fn with_message(data: T, message: &str) -> Self {
        Self { success: true, message: Some(message.to_string()), data, status: StatusCode::OK }
    }

    pub fn created(data: T, message: &str) -> Self {
        Self { status: StatusCode::CREATED, ..Self::with_message(data, message) }
    }
}

impl Response<Empty> {
    pub fn message(message: &str) -> Self {
        Self::with_message(Empty {}, message)
    }
}

impl<T> From<T> for Response<T> {
    fn from(data: T) -> Self {
        Self { success: true, message: None, data, status: StatusCode::OK }
    }
}

impl<T: Serialize> IntoResponse for Response<T> {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Serialize)]
    struct UserData {
        user: Value,
    }

    async fn body(resp: axum::response::Response) -> (StatusCode, Value) {
        let status = resp.status();
        let body_bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    #[tokio::test]
    async fn test_response_from_flattens_data() {
        let resp = Response::from(UserData { user: json!({ "uid": "u1" }) });
        let (status, json_val) = body(resp.into_response()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_val, json!({ "success": true, "user": { "uid": "u1" } }));
    }

    #[tokio::test]
    async fn test_response_created() {
        let resp = Response::created(UserData { user: json!({ "uid": "u2" }) }, "User created successfully");
        let (status, json_val) = body(resp.into_response()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_val["message"], "User created successfully");
        assert_eq!(json_val["user"]["uid"], "u2");
    }

    #[tokio::test]
    async fn test_response_message_only() {
        let (status, json_val) = body(Response::message("User deleted successfully").into_response()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_val, json!({ "success": true, "message": "User deleted successfully" }));
    }
}
