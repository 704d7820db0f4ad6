use app_core::extractors::{AppJson, AppPath};
use app_core::middleware::AuthenticatedUser;
use app_core::response::Response;
use axum::debug_handler;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::domain::inout::prelude::*;
use crate::inbound::model::prelude::*;
use crate::inbound::state::AuthState;

#[debug_handler]
pub async fn verify(State(state): State<AuthState>, caller: AuthenticatedUser) -> impl IntoResponse {
    state
        .auth
        .verify(VerifyInput { uid: caller.uid })
        .await
        .map(|user| UserEnvelope { user: UserResponse::from(user) })
        .map(Response::from)
}

#[debug_handler]
pub async fn create_user(State(state): State<AuthState>, AppJson(req): AppJson<CreateUserRequest>) -> impl IntoResponse {
    state
        .auth
        .create_user(CreateUserInput {
            email: req.email.unwrap_or_default(),
            password: req.password.unwrap_or_default(),
            display_name: req.display_name,
            photo_url: req.photo_url,
        })
        .await
        .map(|user| Response::created(UserEnvelope { user: CreatedUserResponse::from(user) }, "User created successfully"))
}

#[debug_handler]
pub async fn delete_user(
    State(state): State<AuthState>,
    caller: AuthenticatedUser,
    AppPath(uid): AppPath<String>,
) -> impl IntoResponse {
    state
        .auth
        .delete_user(DeleteUserInput { requester_uid: caller.uid, uid })
        .await
        .map(|_| Response::message("User deleted successfully"))
}
