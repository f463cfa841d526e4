pub mod cors;
pub mod rate_limit;
pub mod recover;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

pub use cors::cors_layer;
pub use rate_limit::{rate_limit, RateLimiter};
pub use recover::recover_layer;

/// The router answers an unsupported method with an empty 405; give it the
/// standard JSON error body and keep the Allow header.
pub async fn json_method_not_allowed(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut rewritten = ApiError::method_not_allowed().into_response();
    if let Some(allow) = allow {
        rewritten.headers_mut().insert(header::ALLOW, allow);
    }
    rewritten
}
