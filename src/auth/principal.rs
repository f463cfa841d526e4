use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;

use super::token::{is_well_formed, TokenService};
use crate::database::models::{TokenScope, User};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::state::AppState;

/// Identity attached to every request that passed through [`authenticate`]
#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    Authenticated(Arc<User>),
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(user) => Some(user),
        }
    }

    pub fn from_extensions(extensions: &Extensions) -> Option<&Principal> {
        extensions.get::<Principal>()
    }
}

/// Missing principal means the route was mounted outside the authenticate
/// layer. That is a wiring bug, so it panics; the recovery layer answers 500.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match Principal::from_extensions(&parts.extensions) {
            Some(principal) => Ok(principal.clone()),
            None => panic!("missing principal in request extensions"),
        }
    }
}

/// What the Authorization header carries
#[derive(Debug, PartialEq, Eq)]
pub enum Credential<'a> {
    Missing,
    Malformed,
    Bearer(&'a str),
}

pub fn bearer_credential(headers: &HeaderMap) -> Credential<'_> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Credential::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Credential::Malformed;
    };
    if value.is_empty() {
        return Credential::Missing;
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Credential::Bearer(token),
        _ => Credential::Malformed,
    }
}

pub async fn resolve_principal(tokens: &TokenService, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = match bearer_credential(headers) {
        Credential::Missing => return Ok(Principal::Anonymous),
        Credential::Malformed => return Err(ApiError::InvalidToken),
        Credential::Bearer(token) => token,
    };

    if !is_well_formed(token) {
        return Err(ApiError::InvalidToken);
    }

    match tokens.resolve(token, TokenScope::Authentication).await {
        Ok(user) => Ok(Principal::Authenticated(Arc::new(user))),
        Err(DatabaseError::NotFound) => Err(ApiError::InvalidToken),
        Err(e) => Err(ApiError::internal(format!("resolving bearer token: {}", e))),
    }
}

pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let resolved = resolve_principal(&state.tokens, request.headers()).await;
    let mut response = match resolved {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}
