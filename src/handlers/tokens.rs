use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::read_id;
use crate::auth::password::validate_password_plaintext;
use crate::auth::principal::Principal;
use crate::auth::token::validate_token_plaintext;
use crate::database::models::TokenScope;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::state::AppState;
use crate::validator::{validate_email, Validator};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationTokenInput {
    #[serde(default)]
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateTokenInput {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeQuery {
    pub scope: Option<String>,
}

/// POST /v1/tokens/authentication
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let user = match state.store.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound) => return Err(ApiError::invalid_credentials()),
        Err(e) => return Err(e.into()),
    };

    if !user.password.matches(&input.password).await? {
        return Err(ApiError::invalid_credentials());
    }

    // Record the login before a token exists
    state
        .store
        .users
        .record_login(user.id, state.tokens.clock().now())
        .await?;
    let token = state
        .tokens
        .issue(user.id, state.config.auth_token_ttl(), TokenScope::Authentication)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "token": token }))))
}

/// DELETE /v1/tokens/authentication
pub async fn logout(State(state): State<AppState>, principal: Principal) -> Result<Json<Value>, ApiError> {
    let user = principal.user().ok_or_else(ApiError::authentication_required)?;
    state.tokens.revoke_all(user.id, TokenScope::Authentication).await?;
    Ok(Json(json!({ "message": "you have been logged out" })))
}

/// POST /v1/tokens/activation
pub async fn create_activation(
    State(state): State<AppState>,
    payload: Result<Json<ActivationTokenInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    v.check(input.user_id > 0, "user_id", "must be provided");
    v.finish()?;

    let user = match state.store.users.get(input.user_id).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound) => return Err(ApiError::field_error("user_id", "no matching user found")),
        Err(e) => return Err(e.into()),
    };

    let token = state
        .tokens
        .issue(user.id, state.config.activation_token_ttl(), TokenScope::Activation)
        .await?;
    info!(user_id = user.id, expiry = %token.expiry, "Activation token issued");

    Ok((StatusCode::CREATED, Json(json!({ "token": token }))))
}

/// DELETE /v1/tokens/user/:user_id
pub async fn revoke_for_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<RevokeQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let user_id = read_id(path)?;
    let Query(query) = query?;

    let scope = match query.scope.as_deref() {
        None | Some("") => Some(TokenScope::Authentication),
        Some(name) => TokenScope::parse(name),
    };
    let Some(scope) = scope else {
        return Err(ApiError::field_error("scope", "must be 'activation' or 'authentication'"));
    };

    state.tokens.revoke_all(user_id, scope).await?;
    Ok(Json(json!({ "message": "tokens successfully deleted" })))
}

/// POST /v1/tokens/validate
pub async fn validate(payload: Result<Json<ValidateTokenInput>, JsonRejection>) -> Result<Json<Value>, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.finish()?;

    Ok(Json(json!({ "message": "token format is valid" })))
}
