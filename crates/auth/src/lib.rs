mod domain;
mod inbound;
mod outbound;
mod usecase;

use std::sync::Arc;

use app_core::config::Config;
pub use inbound::router::create_router;
pub use outbound::admin::{AdminError, FirebaseAdmin, IdentityAdmin, ServiceAccount};

use crate::inbound::state::AuthState;
use crate::usecase::auth::AuthService;
use crate::usecase::user::UserService;

pub struct Dependency {
    pub config: Arc<Config>,
    /// `None` when no service account is configured; admin routes then answer 503.
    pub admin: Option<Arc<dyn IdentityAdmin>>,
}

pub fn new(dep: Dependency) -> AuthState {
    let auth_svc = Arc::new(AuthService::new(dep.admin.clone()));
    let user_svc = Arc::new(UserService::new(dep.admin));

    AuthState::new(dep.config, auth_svc, user_svc)
}
