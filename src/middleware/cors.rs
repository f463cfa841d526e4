use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Whether a request origin matches the trusted list. Entries ending in `*`
/// match by prefix; any two localhost (or 127.0.0.1) origins match each other.
pub fn origin_allowed(origin: &str, trusted: &[String]) -> bool {
    trusted.iter().any(|candidate| {
        if origin == candidate {
            return true;
        }
        if let Some(prefix) = candidate.strip_suffix('*') {
            if origin.starts_with(prefix) {
                return true;
            }
        }
        (origin.contains("localhost") && candidate.contains("localhost"))
            || (origin.contains("127.0.0.1") && candidate.contains("127.0.0.1"))
    })
}

pub fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let trusted = trusted_origins.to_vec();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| origin_allowed(origin, &trusted))
                .unwrap_or(false)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
