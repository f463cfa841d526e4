use std::future::Future;
use std::sync::Arc;
use tracing::error;

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::password::{PasswordError, PasswordHashing};
use crate::auth::token::TokenService;
use crate::config::{AppConfig, ConfigError};
use crate::database::Store;
use crate::mailer::{LogMailer, Mailer};
use crate::middleware::rate_limit::RateLimiter;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Shared per-process state handed to every handler and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub tokens: TokenService,
    pub hashing: PasswordHashing,
    pub limiter: Arc<RateLimiter>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Result<Self, StateError> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, store: Store, clock: Arc<dyn Clock>) -> Result<Self, StateError> {
        config.validate()?;
        let hashing = PasswordHashing::from_config(&config.security)?;
        let limiter = Arc::new(RateLimiter::new(&config.limiter)?);
        let tokens = TokenService::new(store.tokens.clone(), clock);

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            hashing,
            limiter,
            mailer: Arc::new(LogMailer),
        })
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Run `task` detached from the request. Failures are only logged.
    pub fn background<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Background task failed");
            }
        });
    }
}
