//! Outbound user notifications. Delivery is fire-and-forget from the
//! request's point of view; see [`crate::state::AppState::background`].

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::database::models::{Token, User};

pub const USER_WELCOME: &str = "user_welcome";

/// One message for one recipient. `data` carries the values a template
/// would render; no body is produced here.
#[derive(Debug, Clone)]
pub struct Message {
    pub to: String,
    pub template: &'static str,
    pub data: Value,
}

impl Message {
    /// Welcome message carrying the plaintext activation token.
    pub fn welcome(user: &User, activation: &Token) -> Self {
        Self {
            to: user.email.clone(),
            template: USER_WELCOME,
            data: json!({
                "activationToken": activation.plaintext,
                "userID": user.id,
            }),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &Message) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            template = message.template,
            data = %message.data,
            "Mail delivery stub"
        );
        Ok(())
    }
}
