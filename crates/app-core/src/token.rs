//! Verification of ID tokens issued by the identity provider.
//!
//! Tokens are RS256 JWTs signed with rotating keys published as a JWK set.
//! A token is accepted when its signature, issuer, audience and expiry check
//! out and, if a [`RevocationSource`] is configured, when it was issued after
//! the user's last session revocation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

pub const SECURE_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);
const MAX_UID_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// The identity asserted by a verified token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedToken {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub auth_time: Option<i64>,
    pub claims: Map<String, Value>,
}

impl DecodedToken {
    fn from_claims(claims: Map<String, Value>) -> Result<Self, TokenError> {
        let uid = claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty() && sub.len() <= MAX_UID_LEN)
            .ok_or_else(|| TokenError::Invalid("subject claim must be a non-empty string".to_string()))?
            .to_string();

        Ok(Self {
            uid,
            email: claims.get("email").and_then(Value::as_str).map(str::to_string),
            email_verified: claims.get("email_verified").and_then(Value::as_bool).unwrap_or(false),
            auth_time: claims.get("auth_time").and_then(Value::as_i64),
            claims,
        })
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<DecodedToken, TokenError>;
}

/// Resolves the key a token was signed with.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, TokenError>;
}

/// Reports the instant (seconds since the epoch) before which every token of
/// a user counts as revoked. `None` means the user never revoked sessions.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RevocationSource: Send + Sync {
    async fn tokens_valid_after(&self, uid: &str) -> Result<Option<i64>, TokenError>;
}

struct CachedKeys {
    set: JwkSet,
    expires_at: Instant,
}

/// Fetches signing keys from a JWKS endpoint and caches them for as long as
/// the endpoint's `Cache-Control: max-age` allows.
pub struct JwksKeySource {
    url: String,
    client: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksKeySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new(), cache: RwLock::new(None) }
    }

    async fn cached(&self, kid: &str) -> Option<DecodingKey> {
        let guard = self.cache.read().await;
        let cached = guard.as_ref().filter(|c| c.expires_at > Instant::now())?;
        cached.set.find(kid).and_then(|jwk| DecodingKey::from_jwk(jwk).ok())
    }

    async fn refresh(&self) -> Result<(), TokenError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TokenError::KeysUnavailable(e.to_string()))?;

        let ttl = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEY_TTL);

        let set: JwkSet = response.json().await.map_err(|e| TokenError::KeysUnavailable(e.to_string()))?;
        tracing::debug!(keys = set.keys.len(), ttl_secs = ttl.as_secs(), "Refreshed token signing keys");

        *self.cache.write().await = Some(CachedKeys { set, expires_at: Instant::now() + ttl });
        Ok(())
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        // Unknown kid usually means the provider rotated its keys.
        self.refresh().await?;

        self.cached(kid)
            .await
            .ok_or_else(|| TokenError::Invalid(format!("no signing key matches kid {kid}")))
    }
}

fn parse_max_age(header: &str) -> Option<Duration> {
    header
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Verifies provider-issued ID tokens for a single project.
pub struct JwksVerifier {
    project_id: String,
    algorithm: Algorithm,
    keys: Arc<dyn KeySource>,
    revocation: Option<Arc<dyn RevocationSource>>,
}

impl JwksVerifier {
    pub fn new(project_id: impl Into<String>, keys: Arc<dyn KeySource>) -> Self {
        Self { project_id: project_id.into(), algorithm: Algorithm::RS256, keys, revocation: None }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_revocation(mut self, revocation: Arc<dyn RevocationSource>) -> Self {
        self.revocation = Some(revocation);
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[format!("{ISSUER_PREFIX}{}", self.project_id)]);
        validation.set_audience(&[&self.project_id]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "aud", "iss"]);
        validation
    }

    async fn check_revoked(&self, token: &DecodedToken) -> Result<(), TokenError> {
        let Some(revocation) = &self.revocation else {
            return Ok(());
        };

        match revocation.tokens_valid_after(&token.uid).await? {
            Some(valid_after) if token.auth_time.unwrap_or(0) < valid_after => Err(TokenError::Revoked),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<DecodedToken, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Invalid(e.to_string()))?;
        if header.alg != self.algorithm {
            return Err(TokenError::Invalid(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header.kid.ok_or_else(|| TokenError::Invalid("missing key id".to_string()))?;
        let key = self.keys.decoding_key(&kid).await?;

        let data = decode::<Map<String, Value>>(token, &key, &self.validation()).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;

        let decoded = DecodedToken::from_claims(data.claims)?;
        self.check_revoked(&decoded).await?;

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";
    const PROJECT: &str = "demo-project";

    struct StaticKey;

    #[async_trait]
    impl KeySource for StaticKey {
        async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, TokenError> {
            match kid {
                "k1" => Ok(DecodingKey::from_secret(SECRET)),
                _ => Err(TokenError::Invalid(format!("no signing key matches kid {kid}"))),
            }
        }
    }

    fn verifier() -> JwksVerifier {
        JwksVerifier::new(PROJECT, Arc::new(StaticKey)).with_algorithm(Algorithm::HS256)
    }

    fn sign(claims: Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn claims(exp_offset: i64) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "sub": "user-1",
            "aud": PROJECT,
            "iss": format!("{ISSUER_PREFIX}{PROJECT}"),
            "iat": now - 10,
            "exp": now + exp_offset,
            "auth_time": now - 10,
            "email": "ada@example.com",
            "email_verified": true,
            "role": "admin",
        })
    }

    #[tokio::test]
    async fn test_verify_valid_token() {
        let decoded = verifier().verify(&sign(claims(3600), "k1")).await.unwrap();

        assert_eq!(decoded.uid, "user-1");
        assert_eq!(decoded.email.as_deref(), Some("ada@example.com"));
        assert!(decoded.email_verified);
        assert_eq!(decoded.claims["role"], "admin");
    }

    #[tokio::test]
    async fn test_verify_expired_token() {
        let result = verifier().verify(&sign(claims(-3600), "k1")).await;
        assert_eq!(result.unwrap_err(), TokenError::Expired);
    }

    #[tokio::test]
    async fn test_verify_wrong_audience() {
        let mut c = claims(3600);
        c["aud"] = json!("other-project");

        let result = verifier().verify(&sign(c, "k1")).await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_verify_unknown_kid() {
        let result = verifier().verify(&sign(claims(3600), "rotated")).await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_verify_malformed_token() {
        let result = verifier().verify("not-a-jwt").await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_verify_empty_subject() {
        let mut c = claims(3600);
        c["sub"] = json!("");

        let result = verifier().verify(&sign(c, "k1")).await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_verify_revoked_token() {
        let mut revocation = MockRevocationSource::new();
        revocation
            .expect_tokens_valid_after()
            .withf(|uid| uid == "user-1")
            .returning(|_| Ok(Some(Utc::now().timestamp())));

        let verifier = verifier().with_revocation(Arc::new(revocation));
        let result = verifier.verify(&sign(claims(3600), "k1")).await;

        assert_eq!(result.unwrap_err(), TokenError::Revoked);
    }

    #[tokio::test]
    async fn test_verify_not_revoked_when_issued_after_revocation() {
        let mut revocation = MockRevocationSource::new();
        revocation
            .expect_tokens_valid_after()
            .returning(|_| Ok(Some(Utc::now().timestamp() - 3600)));

        let verifier = verifier().with_revocation(Arc::new(revocation));
        assert!(verifier.verify(&sign(claims(3600), "k1")).await.is_ok());
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("public, max-age=19302, must-revalidate"), Some(Duration::from_secs(19302)));
        assert_eq!(parse_max_age("no-cache"), None);
    }
}
