use std::sync::Arc;

use app_core::error::AppError;
use async_trait::async_trait;
use validator::Validate;

use crate::domain::entity::user::{NewUser, UserRecord};
use crate::domain::inout::prelude::*;
use crate::outbound::admin::{AdminError, IdentityAdmin};

pub(crate) const NOT_CONFIGURED_MSG: &str =
    "Identity provider admin is not configured. Please configure the backend service account.";
const CREDENTIALS_REQUIRED_MSG: &str = "Email and password are required";
pub(crate) const EMAIL_EXISTS_MSG: &str = "Email already exists";
const DELETE_FORBIDDEN_MSG: &str = "Unauthorized to delete this account";
const USER_NOT_FOUND_MSG: &str = "User not found";
const VERIFY_FAILED_MSG: &str = "Failed to get user information";
const CREATE_FAILED_MSG: &str = "Failed to create user";
const DELETE_FAILED_MSG: &str = "Failed to delete user";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthUseCase: Send + Sync {
    async fn verify(&self, input: VerifyInput) -> Result<UserRecord, AppError>;
    async fn create_user(&self, input: CreateUserInput) -> Result<UserRecord, AppError>;
    async fn delete_user(&self, input: DeleteUserInput) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct AuthService {
    admin: Option<Arc<dyn IdentityAdmin>>,
}

impl AuthService {
    pub fn new(admin: Option<Arc<dyn IdentityAdmin>>) -> Self {
        Self { admin }
    }

    fn admin(&self) -> Result<&Arc<dyn IdentityAdmin>, AppError> {
        self.admin.as_ref().ok_or_else(|| AppError::ServiceUnavailable(NOT_CONFIGURED_MSG.to_string()))
    }
}

pub(crate) fn internal(err: AdminError, message: &str) -> AppError {
    tracing::error!(error = %err, "{}", message);
    AppError::Internal(message.to_string())
}

#[async_trait]
impl AuthUseCase for AuthService {
    async fn verify(&self, input: VerifyInput) -> Result<UserRecord, AppError> {
        self.admin()?
            .get_user(&input.uid)
            .await
            .map_err(|e| internal(e, VERIFY_FAILED_MSG))
    }

    async fn create_user(&self, input: CreateUserInput) -> Result<UserRecord, AppError> {
        if !input.has_credentials() {
            return Err(AppError::BadRequest(CREDENTIALS_REQUIRED_MSG.to_string()));
        }
        input.validate()?;

        let admin = self.admin()?;
        let user = admin
            .create_user(NewUser {
                email: input.email,
                password: input.password,
                display_name: input.display_name,
                photo_url: input.photo_url,
                email_verified: false,
            })
            .await
            .map_err(|e| match e {
                AdminError::EmailExists => AppError::BadRequest(EMAIL_EXISTS_MSG.to_string()),
                other => internal(other, CREATE_FAILED_MSG),
            })?;

        tracing::info!("User created successfully: {}", user.uid);

        Ok(user)
    }

    async fn delete_user(&self, input: DeleteUserInput) -> Result<(), AppError> {
        if input.requester_uid != input.uid {
            tracing::warn!(requester = %input.requester_uid, target = %input.uid, "Refused to delete another account");
            return Err(AppError::Forbidden(DELETE_FORBIDDEN_MSG.to_string()));
        }

        self.admin()?.delete_user(&input.uid).await.map_err(|e| match e {
            AdminError::UserNotFound => AppError::NotFound(USER_NOT_FOUND_MSG.to_string()),
            other => internal(other, DELETE_FAILED_MSG),
        })?;

        tracing::info!("User deleted successfully: {}", input.uid);

        Ok(())
    }
}
