//! Fixtures for exercising the router in-process against the memory store.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::clock::ManualClock;
use crate::auth::password::Password;
use crate::config::AppConfig;
use crate::database::models::role::{ADMIN, CEO, DEC, SECRETARY, TSC};
use crate::database::models::{Role, Token, TokenScope, User};
use crate::database::{DatabaseError, MemoryStore, RoleRepository, Store, TokenRepository, UserRepository};
use crate::mailer::{Mailer, Message};
use crate::state::AppState;

/// Seeded in this order, so IDs are 1..=5 and the default role (3) is Secretary.
pub const SEED_ROLES: [&str; 5] = [ADMIN, CEO, SECRETARY, DEC, TSC];

/// Memory store wrapper whose lookups can be switched to fail with
/// `DatabaseError::Timeout`.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    token_lookup: AtomicBool,
    role_lookup: AtomicBool,
    login_record: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            token_lookup: AtomicBool::new(false),
            role_lookup: AtomicBool::new(false),
            login_record: AtomicBool::new(false),
        }
    }

    /// `TokenRepository::find_valid` fails from now on.
    pub fn fail_token_lookup(&self) {
        self.token_lookup.store(true, Ordering::SeqCst);
    }

    /// `RoleRepository::get` fails from now on.
    pub fn fail_role_lookup(&self) {
        self.role_lookup.store(true, Ordering::SeqCst);
    }

    /// `UserRepository::record_login` fails from now on.
    pub fn fail_login_record(&self) {
        self.login_record.store(true, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), DatabaseError> {
        if flag.load(Ordering::SeqCst) {
            return Err(DatabaseError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for FaultyStore {
    async fn insert(&self, user: User) -> Result<User, DatabaseError> {
        UserRepository::insert(self.inner.as_ref(), user).await
    }

    async fn get(&self, id: i64) -> Result<User, DatabaseError> {
        UserRepository::get(self.inner.as_ref(), id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        self.inner.get_by_email(email).await
    }

    async fn list(&self, email: Option<&str>) -> Result<Vec<User>, DatabaseError> {
        UserRepository::list(self.inner.as_ref(), email).await
    }

    async fn update(&self, user: &User) -> Result<User, DatabaseError> {
        UserRepository::update(self.inner.as_ref(), user).await
    }

    async fn update_activation(&self, id: i64, is_active: bool) -> Result<(), DatabaseError> {
        self.inner.update_activation(id, is_active).await
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        Self::check(&self.login_record)?;
        self.inner.record_login(id, at).await
    }

    async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        UserRepository::delete(self.inner.as_ref(), id).await
    }
}

#[async_trait]
impl RoleRepository for FaultyStore {
    async fn get(&self, id: i32) -> Result<Role, DatabaseError> {
        Self::check(&self.role_lookup)?;
        RoleRepository::get(self.inner.as_ref(), id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Role, DatabaseError> {
        self.inner.get_by_name(name).await
    }

    async fn list(&self) -> Result<Vec<Role>, DatabaseError> {
        RoleRepository::list(self.inner.as_ref()).await
    }

    async fn insert(&self, name: &str) -> Result<Role, DatabaseError> {
        RoleRepository::insert(self.inner.as_ref(), name).await
    }

    async fn update(&self, role: &Role) -> Result<Role, DatabaseError> {
        RoleRepository::update(self.inner.as_ref(), role).await
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        RoleRepository::delete(self.inner.as_ref(), id).await
    }
}

#[async_trait]
impl TokenRepository for FaultyStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        TokenRepository::insert(self.inner.as_ref(), token).await
    }

    async fn find_valid(
        &self,
        fingerprint: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError> {
        Self::check(&self.token_lookup)?;
        self.inner.find_valid(fingerprint, scope, now).await
    }

    async fn delete_all_for_user(&self, user_id: i64, scope: TokenScope) -> Result<(), DatabaseError> {
        self.inner.delete_all_for_user(user_id, scope).await
    }
}

/// Keeps every message instead of delivering it
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Message>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Wait for a message to `to`. Delivery runs on a detached task.
    pub async fn wait_for(&self, to: &str) -> anyhow::Result<Message> {
        for _ in 0..200 {
            if let Some(message) = self.sent().into_iter().find(|m| m.to == to) {
                return Ok(message);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(anyhow!("no message delivered to {}", to))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub faults: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestContext {
    /// Development preset with cheap hashing and the rate limiter off.
    pub fn config() -> AppConfig {
        let mut config = AppConfig::development();
        config.limiter.enabled = false;
        config.security.argon2_memory_cost_kib = 1024;
        config.security.argon2_time_cost = 1;
        config
    }

    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(Self::config()).await
    }

    pub async fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        for name in SEED_ROLES {
            RoleRepository::insert(store.as_ref(), name)
                .await
                .with_context(|| format!("seeding role {}", name))?;
        }

        let faults = Arc::new(FaultyStore::new(store.clone()));
        let repositories = Store {
            users: faults.clone(),
            roles: faults.clone(),
            tokens: faults.clone(),
        };

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::with_clock(config, repositories, clock.clone())
            .context("building test state")?
            .with_mailer(mailer.clone());

        Ok(Self {
            state,
            store,
            faults,
            clock,
            mailer,
        })
    }

    pub fn router(&self) -> Router {
        crate::router(self.state.clone())
    }

    pub async fn role_id(&self, name: &str) -> anyhow::Result<i32> {
        let role = self.store.get_by_name(name).await?;
        Ok(role.id)
    }

    /// Insert a user directly, bypassing registration.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role_name: &str,
        active: bool,
    ) -> anyhow::Result<User> {
        let mut credential = Password::default();
        credential.set(password, &self.state.hashing).await?;
        self.insert_user(email, credential, role_name, active).await
    }

    /// Insert a user with a ready-made credential, skipping the hash.
    pub async fn insert_user(
        &self,
        email: &str,
        credential: Password,
        role_name: &str,
        active: bool,
    ) -> anyhow::Result<User> {
        let username = email.split('@').next().unwrap_or(email).to_string();
        let mut user = User::new(username, email.to_string(), credential, self.role_id(role_name).await?);
        user.is_active = active;
        user.is_activated = active;

        Ok(UserRepository::insert(self.store.as_ref(), user).await?)
    }

    /// Plaintext authentication token for `user`, issued at the current clock time.
    pub async fn token_for(&self, user: &User) -> anyhow::Result<String> {
        let token = self
            .state
            .tokens
            .issue(user.id, self.state.config.auth_token_ttl(), TokenScope::Authentication)
            .await?;
        Ok(token.plaintext)
    }
}
