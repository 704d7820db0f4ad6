pub mod auth;
pub mod user;

pub mod prelude {
    pub use super::auth::*;
    pub use super::user::*;
}
