//! The binary entry point for the identity starter server.

use std::sync::Arc;
use std::time::Duration;

use app_core::config::Config;
use app_core::error::AppError;
use app_core::middleware::{AuthGate, request_response_logger};
use app_core::token::{JwksKeySource, JwksVerifier, SECURE_TOKEN_JWKS_URL};
use auth::{FirebaseAdmin, IdentityAdmin, ServiceAccount};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::IntoResponse;
use axum::{Json, Router, middleware, routing};
use serde_json::json;
use tokio::signal;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(fmt::format::FmtSpan::CLOSE),
        )
        .init();

    if let Err(err) = run().await {
        panic!("❌ Application failed to start: {err}");
    }
}

/// Initializes all dependencies and starts the web server.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // The .watch() method enables automatic reloading when the config file changes.
    let config = Arc::new(
        Config::builder("config/config.yaml")
            .watch_interval(Duration::from_secs(5))
            .watch()
            .build()?,
    );

    // Without admin credentials the server still starts; protected routes answer 503.
    let admin = init_admin(&config).await;
    let gate = match &admin {
        Some(admin) => AuthGate::new(Arc::new(init_verifier(&config, admin))),
        None => AuthGate::unconfigured(),
    };

    let auth_state = auth::new(auth::Dependency {
        config: config.clone(),
        admin: admin.map(|admin| admin as Arc<dyn IdentityAdmin>),
    });

    let timeout_secs = Duration::from_secs(config.get_or::<u64>("server.timeout_secs", 30));
    let app = create_app(auth::create_router(auth_state, gate)).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(request_response_logger))
            .layer(cors_layer(&config)?)
            .layer(RequestDecompressionLayer::new()) // Enables request decompression
            .layer(CompressionLayer::new()) // Enables response compression
            .layer(TimeoutLayer::new(timeout_secs)), // Adds a request timeout
    );

    let server_address = config.get::<String>("server.address")?;
    let listener = tokio::net::TcpListener::bind(&server_address).await?;

    tracing::info!("🚀 listening on {}", listener.local_addr()?);

    // Create a broadcast channel to signal shutdown to all application components.
    let (shutdown_tx, _) = broadcast::channel(1);
    spawn_shutdown_listener(shutdown_tx.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_tx.subscribe().recv().await.ok();
            tracing::info!("🛑 Server is shutting down gracefully...");
        })
        .await?;

    Ok(())
}

/// Loads the service account named by `firebase.service_account_path`.
async fn init_admin(config: &Config) -> Option<Arc<FirebaseAdmin>> {
    let path = config.get_or::<String>("firebase.service_account_path", String::new());
    if path.is_empty() {
        tracing::warn!("firebase.service_account_path is not set, identity provider admin is disabled");
        return None;
    }

    let account = match ServiceAccount::from_file(&path).await {
        Ok(account) => account,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load service account, identity provider admin is disabled");
            return None;
        },
    };

    let project_id = config.get_opt::<String>("firebase.project_id").ok().flatten();
    match FirebaseAdmin::new(account, project_id) {
        Ok(admin) => {
            tracing::info!(project_id = admin.project_id(), "Identity provider admin initialized");
            Some(Arc::new(admin))
        },
        Err(err) => {
            tracing::warn!(error = %err, "Failed to initialize identity provider admin");
            None
        },
    }
}

fn init_verifier(config: &Config, admin: &Arc<FirebaseAdmin>) -> JwksVerifier {
    let jwks_url = config.get_or("firebase.jwks_url", SECURE_TOKEN_JWKS_URL.to_string());
    let verifier = JwksVerifier::new(admin.project_id(), Arc::new(JwksKeySource::new(jwks_url)));

    if config.get_or("firebase.check_revoked", true) {
        verifier.with_revocation(admin.clone())
    } else {
        verifier
    }
}

fn cors_layer(config: &Config) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let origin = config.get_or("server.cors_origin", DEFAULT_CORS_ORIGIN.to_string());
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origin == "*" {
        return Ok(layer.allow_origin(Any));
    }
    Ok(layer.allow_origin(origin.parse::<HeaderValue>()?).allow_credentials(true))
}

/// Mounts `api` under `/api` next to the health check.
fn create_app(api: Router) -> Router {
    Router::new()
        .route("/health", routing::get(health))
        .nest("/api", api)
        .fallback(|| async { AppError::NotFound("Route not found".to_string()) })
        .method_not_allowed_fallback(|| async {
            (StatusCode::METHOD_NOT_ALLOWED, Json(json!({ "error": "Method not allowed" })))
        })
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

/// Spawns a background task to listen for system shutdown signals.
fn spawn_shutdown_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("🔻 Received SIGINT (Ctrl+C)")},
            _ = terminate => { tracing::info!("🔻 Received SIGTERM")},
        }

        // Send the shutdown signal to all parts of the application.
        if shutdown_tx.send(()).is_err() {
            tracing::error!("Failed to send shutdown signal");
        }
    });
}
