use serde::Serialize;
use sqlx::FromRow;

use crate::validator::Validator;

pub const ADMIN: &str = "Admin";
pub const CEO: &str = "CEO";
pub const DEC: &str = "DEC";
pub const TSC: &str = "TSC";
pub const SECRETARY: &str = "Secretary";

/// Named permission tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Role {
    #[serde(rename = "id")]
    #[sqlx(rename = "role_id")]
    pub id: i32,
    pub role_name: String,
}

pub fn validate_role_name(v: &mut Validator, name: &str) {
    v.check(!name.is_empty(), "role_name", "must be provided");
    v.check(name.len() <= 50, "role_name", "must not be more than 50 bytes long");
}
