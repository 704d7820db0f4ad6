use app_core::middleware::{AuthGate, auth, require_verified_email};
use axum::routing::{delete, get, post};
use axum::{Router, middleware};

use crate::inbound::http::auth::*;
use crate::inbound::http::user::*;
use crate::inbound::state::AuthState;

const REQUIRE_VERIFIED_EMAIL_KEY: &str = "auth.require_verified_email_for_admin";

/// Every route sits behind the authentication gate. Paths are relative to the
/// `/api` prefix the server nests this router under.
pub fn create_router(state: AuthState, gate: AuthGate) -> Router {
    let mut admin_routes = Router::new().route("/auth/create-user", post(create_user));
    if state.config.get_or(REQUIRE_VERIFIED_EMAIL_KEY, false) {
        admin_routes = admin_routes.route_layer(middleware::from_fn(require_verified_email));
    }

    let protected_routes = Router::new()
        // auth scope
        .route("/auth/verify", get(verify))
        .route("/auth/delete-user/{uid}", delete(delete_user))
        // users scope
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users", get(list_users))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(gate, auth));

    Router::new().merge(protected_routes).with_state(state)
}
