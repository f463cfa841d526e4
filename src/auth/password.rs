use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;
use tokio::task;

use crate::config::SecurityConfig;
use crate::validator::Validator;

pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("password task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// Argon2id cost parameters, fixed at startup
#[derive(Debug, Clone)]
pub struct PasswordHashing {
    params: Params,
}

impl PasswordHashing {
    pub fn new(memory_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_cost_kib, time_cost, parallelism, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self, PasswordError> {
        Self::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Salted Argon2id hash in PHC string form. Runs on the blocking pool.
    pub async fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let argon2 = self.argon2();
        let plaintext = plaintext.to_string();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| PasswordError::Hash(e.to_string()))
        })
        .await?
    }
}

/// Stored credential plus, for the lifetime of one request, the plaintext it
/// was derived from. Neither half is ever serialized.
#[derive(Clone, Default)]
pub struct Password {
    hash: Vec<u8>,
    plaintext: Option<String>,
}

impl Password {
    pub fn from_hash(hash: Vec<u8>) -> Self {
        Self { hash, plaintext: None }
    }

    pub async fn set(&mut self, plaintext: &str, hashing: &PasswordHashing) -> Result<(), PasswordError> {
        let hash = hashing.hash(plaintext).await?;
        self.hash = hash.into_bytes();
        self.plaintext = Some(plaintext.to_string());
        Ok(())
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_deref()
    }

    /// Constant-time check of a candidate. Only a corrupt stored hash is an error.
    pub async fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let stored = String::from_utf8(self.hash.clone())
            .map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        let plaintext = plaintext.to_string();

        task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&stored).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
            match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(PasswordError::MalformedHash(e.to_string())),
            }
        })
        .await?
    }
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= MIN_PASSWORD_BYTES, "password", "must be at least 8 bytes long");
    v.check(password.len() <= MAX_PASSWORD_BYTES, "password", "must not be more than 72 bytes long");
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("hash", &"[redacted]")
            .field("plaintext", &self.plaintext.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHashing {
        PasswordHashing::new(1024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn round_trip_matches() {
        let mut password = Password::default();
        password.set("pa55word", &cheap()).await.unwrap();

        assert!(password.hash().starts_with(b"$argon2id$"));
        assert_eq!(password.plaintext(), Some("pa55word"));
        assert!(password.matches("pa55word").await.unwrap());
    }

    #[tokio::test]
    async fn mismatch_is_false_not_error() {
        let mut password = Password::default();
        password.set("pa55word", &cheap()).await.unwrap();
        assert!(!password.matches("pa55wore").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_hash_is_error() {
        let password = Password::from_hash(b"not-a-phc-string".to_vec());
        assert!(matches!(
            password.matches("pa55word").await,
            Err(PasswordError::MalformedHash(_))
        ));
    }

    #[tokio::test]
    async fn same_plaintext_salts_differently() {
        let hashing = cheap();
        let a = hashing.hash("pa55word").await.unwrap();
        let b = hashing.hash("pa55word").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn plaintext_length_bounds() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert_eq!(v.errors()["password"], "must not be more than 72 bytes long");

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(72));
        assert!(v.valid());
    }

    #[test]
    fn debug_redacts() {
        let password = Password::from_hash(b"$argon2id$secret".to_vec());
        assert!(!format!("{:?}", password).contains("secret"));
    }
}
