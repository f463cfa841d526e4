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
use tracing::{debug, info};

use super::read_id;
use crate::auth::guards::ensure_self_or_role;
use crate::auth::password::{validate_password_plaintext, Password};
use crate::auth::principal::Principal;
use crate::auth::token::validate_token_plaintext;
use crate::database::models::role::{ADMIN, CEO, DEC, TSC};
use crate::database::models::user::{validate_profile, validate_user};
use crate::database::models::{TokenScope, User};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::mailer::Message;
use crate::state::AppState;
use crate::validator::Validator;

/// Roles that may read any user's record
pub const VIEW_ROLES: &[&str] = &[ADMIN, CEO, DEC, TSC];
/// Roles that may edit any user's record
pub const UPDATE_ROLES: &[&str] = &[ADMIN, CEO, DEC];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Accepted for compatibility; registration always assigns the default role.
    #[serde(default)]
    pub role_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateInput {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<i32>,
    pub is_active: Option<bool>,
    pub is_activated: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub email: Option<String>,
}

/// POST /v1/users
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = payload?;
    if let Some(role_id) = input.role_id {
        debug!(role_id, "Ignoring role_id supplied at registration");
    }

    // Reject bad input before paying for a hash
    let mut v = Validator::new();
    validate_profile(&mut v, &input.username, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let mut password = Password::default();
    password.set(&input.password, &state.hashing).await?;

    let user = User::new(
        input.username,
        input.email,
        password,
        state.config.security.default_role_id,
    );

    let mut v = Validator::new();
    validate_user(&mut v, &user);
    v.finish()?;

    let user = state.store.users.insert(user).await?;

    let token = state
        .tokens
        .issue(user.id, state.config.activation_token_ttl(), TokenScope::Activation)
        .await?;
    info!(user_id = user.id, expiry = %token.expiry, "Registered user, activation token issued");

    let message = Message::welcome(&user, &token);
    let mailer = state.mailer.clone();
    state.background("welcome email", async move { mailer.send(&message).await });

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

/// PUT /v1/users/activated
pub async fn activate(
    State(state): State<AppState>,
    payload: Result<Json<ActivateInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.finish()?;

    let mut user = match state.tokens.resolve(&input.token, TokenScope::Activation).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound) => {
            return Err(ApiError::field_error("token", "invalid or expired activation token"));
        }
        Err(e) => return Err(e.into()),
    };

    match state.store.users.update_activation(user.id, true).await {
        Ok(()) => {}
        Err(DatabaseError::NotFound) => return Err(ApiError::field_error("token", "user not found")),
        Err(e) => return Err(e.into()),
    }
    user.is_active = true;

    // Activation tokens are single use
    state.tokens.revoke_all(user.id, TokenScope::Activation).await?;
    info!(user_id = user.id, "Activated user");

    Ok(Json(json!({ "user": user })))
}

/// GET /v1/users
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let users = state.store.users.list(query.email.as_deref()).await?;
    Ok(Json(json!({ "users": users })))
}

/// GET /v1/users/:id
pub async fn get(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_id(path)?;
    ensure_self_or_role(&principal, id, VIEW_ROLES, state.store.roles.as_ref()).await?;

    let user = state.store.users.get(id).await?;
    Ok(Json(json!({ "user": user })))
}

/// PATCH /v1/users/:id
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_id(path)?;
    ensure_self_or_role(&principal, id, UPDATE_ROLES, state.store.roles.as_ref()).await?;
    let caller = principal.user().ok_or_else(ApiError::authentication_required)?;

    let mut user = state.store.users.get(id).await?;
    let Json(input) = payload?;

    // Role and activation flags are administrator-only
    if input.role_id.is_some() || input.is_active.is_some() || input.is_activated.is_some() {
        let caller_role = state
            .store
            .roles
            .get(caller.role_id)
            .await
            .map_err(|e| ApiError::internal(format!("loading role for user {}: {}", caller.id, e)))?;

        if caller_role.role_name != ADMIN {
            let mut v = Validator::new();
            if input.role_id.is_some() {
                v.add_error("role_id", "only administrators can change user roles");
            }
            if input.is_active.is_some() {
                v.add_error("is_active", "only administrators can change user activation status");
            }
            if input.is_activated.is_some() {
                v.add_error("is_activated", "only administrators can change activation status");
            }
            v.finish()?;
        }
    }

    if let Some(username) = input.username {
        user.username = username;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(role_id) = input.role_id {
        match state.store.roles.get(role_id).await {
            Ok(_) => user.role_id = role_id,
            Err(DatabaseError::NotFound) => return Err(ApiError::field_error("role_id", "no matching role found")),
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(is_active) = input.is_active {
        user.is_active = is_active;
    }
    if let Some(is_activated) = input.is_activated {
        user.is_activated = is_activated;
    }
    if let Some(password) = input.password {
        let mut v = Validator::new();
        validate_profile(&mut v, &user.username, &user.email);
        validate_password_plaintext(&mut v, &password);
        v.finish()?;

        user.password.set(&password, &state.hashing).await?;
    }
    user.updated_by = Some(caller.id);

    let mut v = Validator::new();
    validate_user(&mut v, &user);
    v.finish()?;

    let user = state.store.users.update(&user).await?;
    Ok(Json(json!({ "user": user })))
}

/// DELETE /v1/users/:id
pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_id(path)?;
    state.store.users.delete(id).await?;
    info!(user_id = id, "Deleted user");
    Ok(Json(json!({ "message": "user successfully deleted" })))
}
