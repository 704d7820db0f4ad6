use app_core::extractors::{AppJson, AppQuery};
use app_core::middleware::AuthenticatedUser;
use app_core::response::Response;
use axum::debug_handler;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::domain::inout::prelude::*;
use crate::inbound::model::prelude::*;
use crate::inbound::state::AuthState;

#[debug_handler]
pub async fn get_profile(State(state): State<AuthState>, caller: AuthenticatedUser) -> impl IntoResponse {
    state
        .user
        .get_profile(GetProfileInput { uid: caller.uid })
        .await
        .map(|user| UserEnvelope { user: ProfileResponse::from(user) })
        .map(Response::from)
}

#[debug_handler]
pub async fn update_profile(
    State(state): State<AuthState>,
    caller: AuthenticatedUser,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> impl IntoResponse {
    state
        .user
        .update_profile(UpdateProfileInput {
            uid: caller.uid,
            display_name: req.display_name,
            photo_url: req.photo_url,
            email: req.email,
        })
        .await
        .map(|user| Response::with_message(UserEnvelope { user: UpdatedUserResponse::from(user) }, "Profile updated successfully"))
}

#[debug_handler]
pub async fn list_users(State(state): State<AuthState>, AppQuery(query): AppQuery<ListUsersRequest>) -> impl IntoResponse {
    state
        .user
        .list_users(ListUsersInput { page_token: query.page_token, max_results: query.max_results })
        .await
        .map(|output| {
            let users = output.users.into_iter().map(UserResponse::from).collect::<Vec<_>>();

            ListUsersResponse { total_users: users.len(), users, page_token: output.page_token }
        })
        .map(Response::from)
}
