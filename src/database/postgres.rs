use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use super::error::DatabaseError;
use super::models::{Role, Token, TokenScope, User};
use super::store::{RoleRepository, TokenRepository, UserRepository};
use crate::config::DatabaseConfig;

const USER_COLUMNS: &str = "user_id, username, email, password_hash, role_id, is_active, \
     is_activated, last_login, created_at, created_by, updated_at, updated_by";

/// Open the pool and make sure the server answers before accepting traffic
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(&config.dsn)
        .await?;

    let ping = sqlx::query("SELECT 1").execute(&pool);
    match tokio::time::timeout(Duration::from_secs(config.connection_timeout), ping).await {
        Ok(result) => {
            result?;
        }
        Err(_) => return Err(DatabaseError::Timeout),
    }

    info!("Database connection pool established");
    Ok(pool)
}

/// PostgreSQL-backed repositories. Every call is bounded by the query timeout.
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }

    async fn timed<T, F>(&self, query: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result.map_err(DatabaseError::from),
            Err(_) => Err(DatabaseError::Timeout),
        }
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: User) -> Result<User, DatabaseError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role_id, is_active, is_activated, \
             last_login, created_by, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {}",
            USER_COLUMNS
        );

        self.timed(
            sqlx::query_as::<_, User>(&sql)
                .bind(&user.username)
                .bind(&user.email)
                .bind(user.password.hash())
                .bind(user.role_id)
                .bind(user.is_active)
                .bind(user.is_activated)
                .bind(user.last_login)
                .bind(user.created_by)
                .bind(user.updated_by)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get(&self, id: i64) -> Result<User, DatabaseError> {
        if id < 1 {
            return Err(DatabaseError::NotFound);
        }

        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        self.timed(sqlx::query_as::<_, User>(&sql).bind(id).fetch_one(&self.pool))
            .await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        self.timed(sqlx::query_as::<_, User>(&sql).bind(email).fetch_one(&self.pool))
            .await
    }

    async fn list(&self, email: Option<&str>) -> Result<Vec<User>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM users WHERE ($1::text IS NULL OR email = $1) ORDER BY user_id",
            USER_COLUMNS
        );
        self.timed(sqlx::query_as::<_, User>(&sql).bind(email).fetch_all(&self.pool))
            .await
    }

    async fn update(&self, user: &User) -> Result<User, DatabaseError> {
        let sql = format!(
            "UPDATE users SET username = $1, email = $2, password_hash = $3, role_id = $4, \
             is_active = $5, is_activated = $6, last_login = $7, updated_at = NOW(), updated_by = $8 \
             WHERE user_id = $9 \
             RETURNING {}",
            USER_COLUMNS
        );

        let updated = self
            .timed(
                sqlx::query_as::<_, User>(&sql)
                    .bind(&user.username)
                    .bind(&user.email)
                    .bind(user.password.hash())
                    .bind(user.role_id)
                    .bind(user.is_active)
                    .bind(user.is_activated)
                    .bind(user.last_login)
                    .bind(user.updated_by)
                    .bind(user.id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        updated.ok_or(DatabaseError::EditConflict)
    }

    async fn update_activation(&self, id: i64, is_active: bool) -> Result<(), DatabaseError> {
        let result = self
            .timed(
                sqlx::query("UPDATE users SET is_active = $1, updated_at = NOW() WHERE user_id = $2")
                    .bind(is_active)
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let result = self
            .timed(
                sqlx::query("UPDATE users SET last_login = $1 WHERE user_id = $2")
                    .bind(at)
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        if id < 1 {
            return Err(DatabaseError::NotFound);
        }

        let result = self
            .timed(
                sqlx::query("DELETE FROM users WHERE user_id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn get(&self, id: i32) -> Result<Role, DatabaseError> {
        if id < 1 {
            return Err(DatabaseError::NotFound);
        }

        self.timed(
            sqlx::query_as::<_, Role>("SELECT role_id, role_name FROM roles WHERE role_id = $1")
                .bind(id)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_by_name(&self, name: &str) -> Result<Role, DatabaseError> {
        self.timed(
            sqlx::query_as::<_, Role>("SELECT role_id, role_name FROM roles WHERE role_name = $1")
                .bind(name)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn list(&self) -> Result<Vec<Role>, DatabaseError> {
        self.timed(
            sqlx::query_as::<_, Role>("SELECT role_id, role_name FROM roles ORDER BY role_id")
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn insert(&self, name: &str) -> Result<Role, DatabaseError> {
        self.timed(
            sqlx::query_as::<_, Role>(
                "INSERT INTO roles (role_name) VALUES ($1) RETURNING role_id, role_name",
            )
            .bind(name)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn update(&self, role: &Role) -> Result<Role, DatabaseError> {
        let updated = self
            .timed(
                sqlx::query_as::<_, Role>(
                    "UPDATE roles SET role_name = $2 WHERE role_id = $1 RETURNING role_id, role_name",
                )
                .bind(role.id)
                .bind(&role.role_name)
                .fetch_optional(&self.pool),
            )
            .await?;

        updated.ok_or(DatabaseError::EditConflict)
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        if id < 1 {
            return Err(DatabaseError::NotFound);
        }

        let result = self
            .timed(
                sqlx::query("DELETE FROM roles WHERE role_id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        self.timed(
            sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
                .bind(&token.fingerprint)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn find_valid(
        &self,
        fingerprint: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError> {
        self.timed(
            sqlx::query_as::<_, User>(
                "SELECT users.user_id, users.username, users.email, users.password_hash, \
                 users.role_id, roles.role_name, users.is_active, users.is_activated, \
                 users.last_login, users.created_at, users.created_by, users.updated_at, \
                 users.updated_by \
                 FROM users \
                 INNER JOIN tokens ON users.user_id = tokens.user_id \
                 INNER JOIN roles ON users.role_id = roles.role_id \
                 WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3",
            )
            .bind(fingerprint)
            .bind(scope.as_str())
            .bind(now)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn delete_all_for_user(&self, user_id: i64, scope: TokenScope) -> Result<(), DatabaseError> {
        self.timed(
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
