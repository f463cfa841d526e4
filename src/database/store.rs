use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use super::error::DatabaseError;
use super::models::{Role, Token, TokenScope, User};
use super::postgres::PgStore;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new user, returning it with its assigned ID and timestamps.
    async fn insert(&self, user: User) -> Result<User, DatabaseError>;
    async fn get(&self, id: i64) -> Result<User, DatabaseError>;
    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError>;
    async fn list(&self, email: Option<&str>) -> Result<Vec<User>, DatabaseError>;
    /// Write every mutable field. A user deleted in the meantime is an edit conflict.
    async fn update(&self, user: &User) -> Result<User, DatabaseError>;
    async fn update_activation(&self, id: i64, is_active: bool) -> Result<(), DatabaseError>;
    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError>;
    async fn delete(&self, id: i64) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn get(&self, id: i32) -> Result<Role, DatabaseError>;
    async fn get_by_name(&self, name: &str) -> Result<Role, DatabaseError>;
    async fn list(&self) -> Result<Vec<Role>, DatabaseError>;
    async fn insert(&self, name: &str) -> Result<Role, DatabaseError>;
    async fn update(&self, role: &Role) -> Result<Role, DatabaseError>;
    async fn delete(&self, id: i32) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError>;
    /// Owner of an unexpired token with this fingerprint and scope, joined
    /// with its role name.
    async fn find_valid(
        &self,
        fingerprint: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError>;
    async fn delete_all_for_user(&self, user_id: i64, scope: TokenScope) -> Result<(), DatabaseError>;
}

/// Repository handles shared by every request
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub tokens: Arc<dyn TokenRepository>,
}

impl Store {
    pub fn postgres(pool: PgPool, query_timeout: Duration) -> Self {
        let store = Arc::new(PgStore::new(pool, query_timeout));
        Self {
            users: store.clone(),
            roles: store.clone(),
            tokens: store,
        }
    }
}
