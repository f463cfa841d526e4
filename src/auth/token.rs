use chrono::Duration as ChronoDuration;
use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::clock::Clock;
use crate::database::models::{Token, TokenScope, User};
use crate::database::{DatabaseError, TokenRepository};
use crate::validator::Validator;

/// Random bytes behind every plaintext token
pub const TOKEN_ENTROPY_BYTES: usize = 16;
/// Length of the base32 (no padding) encoding of the entropy
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token entropy unavailable: {0}")]
    Entropy(#[from] rand::Error),

    #[error("token ttl out of range")]
    TtlOutOfRange,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Fresh plaintext: 16 bytes from the OS RNG, base32 without padding.
pub fn generate_plaintext() -> Result<String, rand::Error> {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(BASE32_NOPAD.encode(&bytes))
}

/// SHA-256 of the plaintext; the only form that is stored or compared.
pub fn fingerprint(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Shape check only. Says nothing about whether the token exists.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
        && plaintext.bytes().all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == TOKEN_PLAINTEXT_LEN, "token", "must be 26 bytes long");
    v.check(is_well_formed(plaintext), "token", "must be base32 encoded");
}

/// Issues, resolves and revokes scoped bearer tokens
#[derive(Clone)]
pub struct TokenService {
    tokens: Arc<dyn TokenRepository>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(tokens: Arc<dyn TokenRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { tokens, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: TokenScope) -> Result<Token, TokenError> {
        let ttl = ChronoDuration::from_std(ttl).map_err(|_| TokenError::TtlOutOfRange)?;
        let expiry = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or(TokenError::TtlOutOfRange)?;
        let plaintext = generate_plaintext()?;

        let token = Token {
            fingerprint: fingerprint(&plaintext),
            plaintext,
            user_id,
            scope,
            expiry,
        };

        self.tokens.insert(&token).await?;
        debug!(user_id, scope = %scope, expiry = %token.expiry, "Issued token");
        Ok(token)
    }

    /// Owner of a live token. Absent, expired and wrong-scope all come back
    /// as `NotFound`.
    pub async fn resolve(&self, plaintext: &str, scope: TokenScope) -> Result<User, DatabaseError> {
        self.tokens
            .find_valid(&fingerprint(plaintext), scope, self.clock.now())
            .await
    }

    pub async fn revoke_all(&self, user_id: i64, scope: TokenScope) -> Result<(), DatabaseError> {
        self.tokens.delete_all_for_user(user_id, scope).await?;
        info!(user_id, scope = %scope, "Revoked tokens");
        Ok(())
    }
}
