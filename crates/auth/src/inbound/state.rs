use std::sync::Arc;

use app_core::config::Config;

use crate::usecase::auth::AuthUseCase;
use crate::usecase::user::UserUseCase;

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn AuthUseCase>,
    pub user: Arc<dyn UserUseCase>,
}

impl AuthState {
    pub fn new(config: Arc<Config>, auth: Arc<dyn AuthUseCase>, user: Arc<dyn UserUseCase>) -> Self {
        Self { config, auth, user }
    }
}
