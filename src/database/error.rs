use thiserror::Error;

/// Errors surfaced by every repository implementation
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("duplicate role name")]
    DuplicateRoleName,

    #[error("edit conflict")]
    EditConflict,

    /// A user's role_id names no role, or a role still has users
    #[error("role reference violated")]
    RoleReference,

    #[error("query exceeded its deadline")]
    Timeout,

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(db) => match db.constraint() {
                Some("users_email_key") => DatabaseError::DuplicateEmail,
                Some("roles_role_name_key") => DatabaseError::DuplicateRoleName,
                Some("users_role_id_fkey") => DatabaseError::RoleReference,
                _ => DatabaseError::Sqlx(err),
            },
            _ => DatabaseError::Sqlx(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            DatabaseError::from(sqlx::Error::RowNotFound),
            DatabaseError::NotFound
        ));
    }

    #[test]
    fn other_sqlx_errors_pass_through() {
        assert!(matches!(
            DatabaseError::from(sqlx::Error::PoolTimedOut),
            DatabaseError::Sqlx(_)
        ));
    }
}
