use std::sync::Arc;

use app_core::error::AppError;
use async_trait::async_trait;
use validator::Validate;

use super::auth::{EMAIL_EXISTS_MSG, NOT_CONFIGURED_MSG, internal};
use crate::domain::entity::user::UserRecord;
use crate::domain::inout::prelude::*;
use crate::outbound::admin::{AdminError, IdentityAdmin};

const NO_FIELDS_MSG: &str = "No fields to update";
const GET_PROFILE_FAILED_MSG: &str = "Failed to get user profile";
const UPDATE_PROFILE_FAILED_MSG: &str = "Failed to update profile";
const LIST_USERS_FAILED_MSG: &str = "Failed to get user list";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserUseCase: Send + Sync {
    async fn get_profile(&self, input: GetProfileInput) -> Result<UserRecord, AppError>;
    async fn update_profile(&self, input: UpdateProfileInput) -> Result<UserRecord, AppError>;
    async fn list_users(&self, input: ListUsersInput) -> Result<ListUsersOutput, AppError>;
}

#[derive(Clone)]
pub struct UserService {
    admin: Option<Arc<dyn IdentityAdmin>>,
}

impl UserService {
    pub fn new(admin: Option<Arc<dyn IdentityAdmin>>) -> Self {
        Self { admin }
    }

    fn admin(&self) -> Result<&Arc<dyn IdentityAdmin>, AppError> {
        self.admin.as_ref().ok_or_else(|| AppError::ServiceUnavailable(NOT_CONFIGURED_MSG.to_string()))
    }
}

#[async_trait]
impl UserUseCase for UserService {
    async fn get_profile(&self, input: GetProfileInput) -> Result<UserRecord, AppError> {
        self.admin()?
            .get_user(&input.uid)
            .await
            .map_err(|e| internal(e, GET_PROFILE_FAILED_MSG))
    }

    async fn update_profile(&self, input: UpdateProfileInput) -> Result<UserRecord, AppError> {
        let changes = input.changes();
        if changes.is_empty() {
            return Err(AppError::BadRequest(NO_FIELDS_MSG.to_string()));
        }
        input.validate()?;

        let user = self.admin()?.update_user(&input.uid, changes).await.map_err(|e| match e {
            AdminError::EmailExists => AppError::BadRequest(EMAIL_EXISTS_MSG.to_string()),
            other => internal(other, UPDATE_PROFILE_FAILED_MSG),
        })?;

        tracing::info!("Profile updated successfully for user: {}", input.uid);

        Ok(user)
    }

    async fn list_users(&self, input: ListUsersInput) -> Result<ListUsersOutput, AppError> {
        input.validate()?;

        let page = self
            .admin()?
            .list_users(input.page_token, input.max_results)
            .await
            .map_err(|e| internal(e, LIST_USERS_FAILED_MSG))?;

        Ok(ListUsersOutput { users: page.users, page_token: page.next_page_token })
    }
}
