use chrono::{DateTime, Utc};
use serde::Serialize;

/// Purpose tag carried by every token record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Authentication,
    Activation,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
            TokenScope::Activation => "activation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authentication" => Some(TokenScope::Authentication),
            "activation" => Some(TokenScope::Activation),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issued bearer token. Only the fingerprint is ever persisted; the
/// plaintext is handed to the client once.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub fingerprint: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(skip)]
    pub scope: TokenScope,
    pub expiry: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parses_known_names_only() {
        assert_eq!(TokenScope::parse("activation"), Some(TokenScope::Activation));
        assert_eq!(TokenScope::parse("authentication"), Some(TokenScope::Authentication));
        assert_eq!(TokenScope::parse("Authentication"), None);
        assert_eq!(TokenScope::parse(""), None);
    }

    #[test]
    fn token_serializes_plaintext_and_expiry_only() {
        let token = Token {
            plaintext: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
            fingerprint: vec![1, 2, 3],
            user_id: 7,
            scope: TokenScope::Authentication,
            expiry: Utc::now(),
        };
        let value = serde_json::to_value(&token).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(value["token"], "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
    }
}
