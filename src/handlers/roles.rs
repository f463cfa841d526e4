use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::read_id;
use crate::database::models::role::validate_role_name;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::state::AppState;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoleInput {
    #[serde(default)]
    pub role_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleInput {
    pub role_name: Option<String>,
}

fn read_role_id(path: Result<Path<i64>, PathRejection>) -> Result<i32, ApiError> {
    let id = read_id(path)?;
    i32::try_from(id).map_err(|_| ApiError::not_found())
}

/// POST /v1/roles
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateRoleInput>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<Value>), ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_role_name(&mut v, &input.role_name);
    v.finish()?;

    let role = state.store.roles.insert(&input.role_name).await?;
    info!(role_id = role.id, role = %role.role_name, "Created role");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/roles/{}", role.id)) {
        headers.insert(header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(json!({ "role": role }))))
}

/// GET /v1/roles
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let roles = state.store.roles.list().await?;
    Ok(Json(json!({ "roles": roles })))
}

/// GET /v1/roles/:id
pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_role_id(path)?;
    let role = state.store.roles.get(id).await?;
    Ok(Json(json!({ "role": role })))
}

/// PATCH /v1/roles/:id
pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateRoleInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_role_id(path)?;
    let mut role = state.store.roles.get(id).await?;
    let Json(input) = payload?;

    if let Some(role_name) = input.role_name {
        role.role_name = role_name;
    }

    let mut v = Validator::new();
    validate_role_name(&mut v, &role.role_name);
    v.finish()?;

    let role = state.store.roles.update(&role).await?;
    Ok(Json(json!({ "role": role })))
}

/// DELETE /v1/roles/:id
pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_role_id(path)?;
    match state.store.roles.delete(id).await {
        Ok(()) => {}
        Err(DatabaseError::RoleReference) => {
            return Err(ApiError::Conflict("role is still assigned to one or more users".to_string()));
        }
        Err(e) => return Err(e.into()),
    }
    info!(role_id = id, "Deleted role");
    Ok(Json(json!({ "message": "role successfully deleted" })))
}
