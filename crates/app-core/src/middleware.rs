//! Defines application-specific Axum middleware.
//!
//! [`auth`] is the authentication gate in front of every protected route. Per
//! request it moves through
//! `Received -> TokenExtracted -> Verifying -> Accepted | Rejected(..)`, with
//! a missing or malformed header rejected before the verifier is consulted.
//! No retries happen here; refreshing credentials is up to the client.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use thiserror::Error;

use super::error::AppError;
use super::token::{DecodedToken, TokenError, TokenVerifier};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Terminal rejection states of the authentication gate.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("No token provided")]
    NoToken,

    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,

    #[error("Invalid token")]
    Invalid,

    #[error("Identity provider is not configured. Please configure the backend credentials.")]
    Unavailable,

    #[error("Email verification required")]
    EmailNotVerified,
}

impl AuthRejection {
    pub fn code(&self) -> &'static str {
        match self {
            AuthRejection::NoToken => "no-token",
            AuthRejection::Expired => "token-expired",
            AuthRejection::Revoked => "token-revoked",
            AuthRejection::Invalid => "invalid-token",
            AuthRejection::Unavailable => "provider-unavailable",
            AuthRejection::EmailNotVerified => "email-unverified",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthRejection::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthRejection::EmailNotVerified => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<TokenError> for AuthRejection {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthRejection::Expired,
            TokenError::Revoked => AuthRejection::Revoked,
            TokenError::Invalid(_) | TokenError::KeysUnavailable(_) => AuthRejection::Invalid,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        AppError::Gate(self).into_response()
    }
}

/// The verified caller, attached to the request by [`auth`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub claims: Map<String, Value>,
}

impl From<DecodedToken> for AuthenticatedUser {
    fn from(token: DecodedToken) -> Self {
        Self { uid: token.uid, email: token.email, email_verified: token.email_verified, claims: token.claims }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::Gate(AuthRejection::NoToken))
    }
}

/// Gate state. `None` means the identity provider was never initialized and
/// every protected request short-circuits with [`AuthRejection::Unavailable`].
#[derive(Clone)]
pub struct AuthGate {
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier: Some(verifier) }
    }

    pub fn unconfigured() -> Self {
        Self { verifier: None }
    }

    pub fn is_configured(&self) -> bool {
        self.verifier.is_some()
    }

    /// Runs the gate state machine for one request.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthRejection> {
        let verifier = self.verifier.as_ref().ok_or(AuthRejection::Unavailable)?;
        let token = bearer_token(headers).ok_or(AuthRejection::NoToken)?;

        match verifier.verify(token).await {
            Ok(decoded) => Ok(decoded.into()),
            Err(err) => {
                tracing::warn!(error = %err, "Token verification failed");
                Err(err.into())
            },
        }
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn auth(State(gate): State<AuthGate>, req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let user = gate.authenticate(req.headers()).await?;

    let (mut parts, body) = req.into_parts();
    parts.extensions.insert(user);
    let req = Request::from_parts(parts, body);

    Ok(next.run(req).await)
}

/// Rejects callers whose email address is not verified. Must run after [`auth`].
pub async fn require_verified_email(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let verified = req
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.email_verified)
        .ok_or(AuthRejection::NoToken)?;

    if !verified {
        return Err(AuthRejection::EmailNotVerified.into());
    }

    Ok(next.run(req).await)
}

pub async fn request_response_logger(mut req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    req.extensions_mut().insert(request_id.clone());

    tracing::info!(_cID = request_id, method = %method, uri = %uri, version = ?req.version(), "Incoming request");

    let mut response = next.run(req).await;
    let duration_ms = start_time.elapsed().as_millis();
    let status = response.status();

    response.headers_mut().insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("invalid-correlation-id")),
    );

    if status.is_server_error() {
        tracing::error!(_cID = request_id, method = %method, uri = %uri, status = %status, duration_ms, "Request completed with server error");
    } else if status.is_client_error() {
        tracing::warn!(_cID = request_id, method = %method, uri = %uri, status = %status, duration_ms, "Request completed with client error");
    } else {
        tracing::info!(_cID = request_id, method = %method, uri = %uri, status = %status, duration_ms, "Request completed successfully");
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use axum::routing::get;
    use axum::{Router, middleware};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::token::MockTokenVerifier;

    fn decoded(uid: &str, email_verified: bool) -> DecodedToken {
        let claims = json!({ "sub": uid, "email": "ada@example.com", "email_verified": email_verified, "role": "admin" });
        DecodedToken {
            uid: uid.to_string(),
            email: Some("ada@example.com".to_string()),
            email_verified,
            auth_time: Some(1),
            claims: claims.as_object().cloned().unwrap_or_default(),
        }
    }

    fn verifier() -> MockTokenVerifier {
        let mut tm = MockTokenVerifier::new();
        tm.expect_verify().returning(|token| match token {
            "valid" => Ok(decoded("user-1", true)),
            "unverified" => Ok(decoded("user-2", false)),
            "expired" => Err(TokenError::Expired),
            "revoked" => Err(TokenError::Revoked),
            _ => Err(TokenError::Invalid("bad signature".to_string())),
        });
        tm
    }

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    async fn whoami(user: AuthenticatedUser) -> String {
        format!("{}:{}", user.uid, user.claims["role"].as_str().unwrap_or_default())
    }

    fn app(gate: AuthGate) -> Router {
        Router::new()
            .route("/protected", get(whoami))
            .route_layer(middleware::from_fn_with_state(gate.clone(), auth))
            .with_state(gate)
    }

    async fn call(app: Router, authorization: Option<&str>) -> Response {
        let mut builder = Request::builder().method(Method::GET).uri("/protected");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_outcomes() {
        let gate = AuthGate::new(Arc::new(verifier()));

        let accepted = gate.authenticate(&headers(Some("Bearer valid"))).await.unwrap();
        assert_eq!(accepted.uid, "user-1");
        assert_eq!(accepted.email.as_deref(), Some("ada@example.com"));
        assert!(accepted.email_verified);
        assert_eq!(accepted.claims["role"], "admin");

        assert_eq!(gate.authenticate(&headers(Some("Bearer expired"))).await, Err(AuthRejection::Expired));
        assert_eq!(gate.authenticate(&headers(Some("Bearer revoked"))).await, Err(AuthRejection::Revoked));
        assert_eq!(gate.authenticate(&headers(Some("Bearer forged"))).await, Err(AuthRejection::Invalid));
        assert_eq!(gate.authenticate(&headers(None)).await, Err(AuthRejection::NoToken));
    }

    #[tokio::test]
    async fn test_malformed_header_skips_verifier() {
        let mut tm = MockTokenVerifier::new();
        tm.expect_verify().never();
        let gate = AuthGate::new(Arc::new(tm));

        assert_eq!(gate.authenticate(&headers(Some("Basic abc"))).await, Err(AuthRejection::NoToken));
        assert_eq!(gate.authenticate(&headers(Some("Bearer "))).await, Err(AuthRejection::NoToken));
    }

    #[tokio::test]
    async fn test_unconfigured_gate_short_circuits() {
        let gate = AuthGate::unconfigured();

        assert!(!gate.is_configured());
        assert_eq!(gate.authenticate(&headers(Some("Bearer valid"))).await, Err(AuthRejection::Unavailable));
    }

    #[tokio::test]
    async fn test_auth_middleware_success() {
        let response = call(app(AuthGate::new(Arc::new(verifier()))), Some("Bearer valid")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8(body_bytes.to_vec()).unwrap(), "user-1:admin");
    }

    #[tokio::test]
    async fn test_auth_middleware_rejections() {
        let gate = AuthGate::new(Arc::new(verifier()));

        assert_eq!(call(app(gate.clone()), None).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(call(app(gate.clone()), Some("Bearer expired")).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(call(app(AuthGate::unconfigured()), Some("Bearer valid")).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_require_verified_email() {
        let gate = AuthGate::new(Arc::new(verifier()));
        let app = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(require_verified_email))
            .route_layer(middleware::from_fn_with_state(gate.clone(), auth))
            .with_state(gate);

        let request = |token: &str| {
            Request::builder()
                .uri("/admin")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(request("valid")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.oneshot(request("unverified")).await.unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_request_logger_sets_request_id() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(request_response_logger));

        let request = Request::builder().uri("/").header(REQUEST_ID_HEADER, "abc-123").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
    }
}
