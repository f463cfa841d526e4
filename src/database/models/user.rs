use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Row};

use crate::auth::password::{validate_password_plaintext, Password};
use crate::validator::{validate_email, Validator};

/// Registered account. The credential is write-only and never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub role_id: i32,
    /// Only filled when the user was loaded through a token lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    pub is_active: bool,
    pub is_activated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<i64>,
}

impl User {
    /// Fresh registration: inactive, unactivated, not yet persisted.
    pub fn new(username: String, email: String, password: Password, role_id: i32) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password,
            role_id,
            role_name: None,
            is_active: false,
            is_activated: false,
            last_login: None,
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        }
    }
}

/// Field checks for a user about to be written. A user without a password
/// hash at this point is a bug in the caller, not bad input.
pub fn validate_user(v: &mut Validator, user: &User) {
    validate_profile(v, &user.username, &user.email);

    if let Some(plaintext) = user.password.plaintext() {
        validate_password_plaintext(v, plaintext);
    }

    if user.password.hash().is_empty() {
        panic!("missing password hash for user");
    }
}

/// Username and email rules, usable before a `User` exists
pub fn validate_profile(v: &mut Validator, username: &str, email: &str) {
    v.check(!username.is_empty(), "username", "must be provided");
    v.check(username.len() <= 100, "username", "must not be more than 100 bytes long");

    validate_email(v, email);
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        // role_name only exists on the token join
        let role_name = match row.try_get::<Option<String>, _>("role_name") {
            Ok(name) => name,
            Err(sqlx::Error::ColumnNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password: Password::from_hash(row.try_get("password_hash")?),
            role_id: row.try_get("role_id")?,
            role_name,
            is_active: row.try_get("is_active")?,
            is_activated: row.try_get("is_activated")?,
            last_login: row.try_get("last_login")?,
            created_at: row.try_get("created_at")?,
            created_by: row.try_get("created_by")?,
            updated_at: row.try_get("updated_at")?,
            updated_by: row.try_get("updated_by")?,
        })
    }
}
