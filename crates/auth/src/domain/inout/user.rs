use validator::Validate;

use super::super::entity::user::{UserChanges, UserRecord};

pub const DEFAULT_MAX_RESULTS: u32 = 1000;

// ╔════════════════════════════╗
// ║        Get Profile         ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct GetProfileInput {
    pub uid: String,
}

// ╔════════════════════════════╗
// ║      Update Profile        ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct UpdateProfileInput {
    pub uid: String,

    pub display_name: Option<String>,

    #[validate(url(message = "photo URL must be a valid URL"))]
    pub photo_url: Option<String>,

    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,
}

impl UpdateProfileInput {
    pub fn changes(&self) -> UserChanges {
        UserChanges { display_name: self.display_name.clone(), photo_url: self.photo_url.clone(), email: self.email.clone() }
    }
}

// ╔════════════════════════════╗
// ║        List Users          ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct ListUsersInput {
    pub page_token: Option<String>,

    #[validate(range(min = 1, max = 1000, message = "maxResults must be between 1 and 1000"))]
    pub max_results: u32,
}

#[derive(Debug)]
pub struct ListUsersOutput {
    pub users: Vec<UserRecord>,
    pub page_token: Option<String>,
}
