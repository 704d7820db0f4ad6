//! Maps Axum's extractor rejections into [`AppError`].

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};

use super::error::AppError;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::RequestFormat(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::RequestFormat(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::RequestFormat(rejection.body_text())
    }
}
