use validator::Validate;

// ╔════════════════════════════╗
// ║        Verify              ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct VerifyInput {
    pub uid: String,
}

// ╔════════════════════════════╗
// ║       Create User          ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct CreateUserInput {
    #[validate(email(message = "invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "password must be at least 6 characters long"))]
    pub password: String,

    pub display_name: Option<String>,

    #[validate(url(message = "photo URL must be a valid URL"))]
    pub photo_url: Option<String>,
}

impl CreateUserInput {
    pub fn has_credentials(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

// ╔════════════════════════════╗
// ║       Delete User          ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct DeleteUserInput {
    /// The authenticated caller.
    pub requester_uid: String,
    pub uid: String,
}
