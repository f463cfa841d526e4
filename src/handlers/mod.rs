pub mod health;
pub mod roles;
pub mod tokens;
pub mod users;

use axum::extract::{rejection::PathRejection, Path};

use crate::error::ApiError;

/// Positive numeric ID from the path. Anything else is treated as an unknown resource.
pub(crate) fn read_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    let Path(id) = path?;
    if id < 1 {
        return Err(ApiError::not_found());
    }
    Ok(id)
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
