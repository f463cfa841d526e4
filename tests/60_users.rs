mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::*;
use impart_api::database::models::TokenScope;
use serde_json::json;

#[tokio::test]
async fn users_see_themselves_but_not_others() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let me = ctx.create_user("me@example.com", PASSWORD, "Secretary", true).await?;
    let other = ctx.create_user("other@example.com", PASSWORD, "Secretary", true).await?;
    let token = ctx.token_for(&me).await?;

    let own = get(&app, &format!("/v1/users/{}", me.id), Some(&token)).await?;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["user"]["user_id"], me.id);

    let theirs = get(&app, &format!("/v1/users/{}", other.id), Some(&token)).await?;
    assert_eq!(theirs.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn tsc_can_view_but_not_edit_others() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let tsc = ctx.create_user("tsc@example.com", PASSWORD, "TSC", true).await?;
    let teacher = ctx.create_user("teacher@example.com", PASSWORD, "Secretary", true).await?;
    let token = ctx.token_for(&tsc).await?;
    let uri = format!("/v1/users/{}", teacher.id);

    assert_eq!(get(&app, &uri, Some(&token)).await?.status, StatusCode::OK);

    let edit = patch(&app, &uri, Some(&token), json!({ "username": "Renamed" })).await?;
    assert_eq!(edit.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn dec_can_edit_others() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let dec = ctx.create_user("dec@example.com", PASSWORD, "DEC", true).await?;
    let teacher = ctx.create_user("teacher@example.com", PASSWORD, "Secretary", true).await?;
    let token = ctx.token_for(&dec).await?;

    let edit = patch(
        &app,
        &format!("/v1/users/{}", teacher.id),
        Some(&token),
        json!({ "username": "Renamed" }),
    )
    .await?;
    assert_eq!(edit.status, StatusCode::OK);
    assert_eq!(edit.body["user"]["username"], "Renamed");
    assert_eq!(edit.body["user"]["updated_by"], dec.id);
    Ok(())
}

#[tokio::test]
async fn only_admins_change_roles_and_flags() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let ceo = ctx.create_user("ceo@example.com", PASSWORD, "CEO", true).await?;
    let teacher = ctx.create_user("teacher@example.com", PASSWORD, "Secretary", true).await?;
    let uri = format!("/v1/users/{}", teacher.id);
    let dec_role = ctx.role_id("DEC").await?;

    let token = ctx.token_for(&ceo).await?;
    let denied = patch(
        &app,
        &uri,
        Some(&token),
        json!({ "role_id": dec_role, "is_active": false }),
    )
    .await?;
    assert_eq!(denied.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(denied.body["field_errors"]["role_id"], "only administrators can change user roles");
    assert!(denied.body["field_errors"]["is_active"].is_string());

    let own = ctx.token_for(&teacher).await?;
    let self_promotion = patch(&app, &uri, Some(&own), json!({ "role_id": 1 })).await?;
    assert_eq!(self_promotion.status, StatusCode::UNPROCESSABLE_ENTITY);

    let admin = ctx.create_user("admin@example.com", PASSWORD, "Admin", true).await?;
    let token = ctx.token_for(&admin).await?;
    let allowed = patch(&app, &uri, Some(&token), json!({ "role_id": dec_role })).await?;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.body["user"]["role_id"], dec_role);
    Ok(())
}

#[tokio::test]
async fn update_rejects_invalid_fields() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let user = ctx.create_user("valid@example.com", PASSWORD, "Secretary", true).await?;
    let token = ctx.token_for(&user).await?;

    let response = patch(
        &app,
        &format!("/v1/users/{}", user.id),
        Some(&token),
        json!({ "email": "broken" }),
    )
    .await?;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["field_errors"]["email"], "must be a valid email address");
    Ok(())
}

#[tokio::test]
async fn user_ids_must_be_positive_integers() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let user = ctx.create_user("ids@example.com", PASSWORD, "Admin", true).await?;
    let token = ctx.token_for(&user).await?;

    for uri in ["/v1/users/0", "/v1/users/-4", "/v1/users/abc"] {
        assert_eq!(get(&app, uri, Some(&token)).await?.status, StatusCode::NOT_FOUND, "{}", uri);
    }
    assert_eq!(get(&app, "/v1/users/4242", Some(&token)).await?.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn deleting_users_is_admin_only() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let ceo = ctx.create_user("ceo@example.com", PASSWORD, "CEO", true).await?;
    let admin = ctx.create_user("admin@example.com", PASSWORD, "Admin", true).await?;
    let teacher = ctx.create_user("teacher@example.com", PASSWORD, "Secretary", true).await?;
    let uri = format!("/v1/users/{}", teacher.id);

    let token = ctx.token_for(&ceo).await?;
    assert_eq!(delete(&app, &uri, Some(&token)).await?.status, StatusCode::FORBIDDEN);

    let token = ctx.token_for(&admin).await?;
    let removed = delete(&app, &uri, Some(&token)).await?;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["message"], "user successfully deleted");

    assert_eq!(delete(&app, &uri, Some(&token)).await?.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn admin_revokes_tokens_by_scope() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let admin = ctx.create_user("admin@example.com", PASSWORD, "Admin", true).await?;
    let teacher = ctx.create_user("teacher@example.com", PASSWORD, "Secretary", false).await?;
    let admin_token = ctx.token_for(&admin).await?;

    ctx.token_for(&teacher).await?;
    post(&app, "/v1/tokens/activation", None, json!({ "user_id": teacher.id })).await?;
    assert_eq!(ctx.store.token_count(teacher.id, TokenScope::Authentication).await, 1);
    assert_eq!(ctx.store.token_count(teacher.id, TokenScope::Activation).await, 1);

    let uri = format!("/v1/tokens/user/{}", teacher.id);
    let revoked = delete(&app, &uri, Some(&admin_token)).await?;
    assert_eq!(revoked.status, StatusCode::OK);
    assert_eq!(revoked.body["message"], "tokens successfully deleted");
    assert_eq!(ctx.store.token_count(teacher.id, TokenScope::Authentication).await, 0);
    assert_eq!(ctx.store.token_count(teacher.id, TokenScope::Activation).await, 1);

    let activation = delete(&app, &format!("{}?scope=activation", uri), Some(&admin_token)).await?;
    assert_eq!(activation.status, StatusCode::OK);
    assert_eq!(ctx.store.token_count(teacher.id, TokenScope::Activation).await, 0);

    let invalid = delete(&app, &format!("{}?scope=refresh", uri), Some(&admin_token)).await?;
    assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(invalid.body["field_errors"]["scope"], "must be 'activation' or 'authentication'");

    let teacher_token = ctx.token_for(&teacher).await?;
    let forbidden = delete(&app, &uri, Some(&teacher_token)).await?;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn unknown_role_is_a_field_error() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let admin = ctx.create_user("admin@example.com", PASSWORD, "Admin", true).await?;
    let teacher = ctx.create_user("teacher@example.com", PASSWORD, "Secretary", true).await?;
    let token = ctx.token_for(&admin).await?;
    let uri = format!("/v1/users/{}", teacher.id);

    let response = patch(&app, &uri, Some(&token), json!({ "role_id": 999 })).await?;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["field_errors"]["role_id"], "no matching role found");

    let unchanged = get(&app, &uri, Some(&token)).await?;
    assert_eq!(unchanged.body["user"]["role_id"], ctx.role_id("Secretary").await?);
    Ok(())
}

#[tokio::test]
async fn assigned_role_cannot_be_deleted() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();
    let admin = ctx.create_user("admin@example.com", PASSWORD, "Admin", true).await?;
    ctx.create_user("teacher@example.com", PASSWORD, "Secretary", true).await?;
    let token = ctx.token_for(&admin).await?;

    let secretary = ctx.role_id("Secretary").await?;
    let response = delete(&app, &format!("/v1/roles/{}", secretary), Some(&token)).await?;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["code"], "CONFLICT");

    let unused = ctx.role_id("TSC").await?;
    let removed = delete(&app, &format!("/v1/roles/{}", unused), Some(&token)).await?;
    assert_eq!(removed.status, StatusCode::OK);
    Ok(())
}
