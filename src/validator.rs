use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::error::ApiError;

pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|e| panic!("email pattern must compile: {}", e))
});

/// Collects one message per field; the first failed check for a field wins.
#[derive(Debug, Default)]
pub struct Validator {
    errors: HashMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &HashMap<String, String> {
        &self.errors
    }

    /// Ok when every check passed, otherwise a 422 carrying the field errors.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.valid() {
            Ok(())
        } else {
            Err(ApiError::failed_validation(self.errors))
        }
    }
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(email.len() <= 255, "email", "must not be more than 255 bytes long");
    v.check(matches(email, &EMAIL_RX), "email", "must be a valid email address");
}
