use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::error::DatabaseError;
use super::models::{Role, Token, TokenScope, User};
use super::store::{RoleRepository, TokenRepository, UserRepository};

/// In-process store with the same observable behavior as PostgreSQL:
/// unique emails and role names, roles in use cannot be deleted, inner-join
/// semantics on token lookup. A user's role_id is not checked on write;
/// handlers confirm the role exists first.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    roles: BTreeMap<i32, Role>,
    tokens: Vec<Token>,
    next_user_id: i64,
    next_role_id: i32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored token records for a user and scope.
    pub async fn token_count(&self, user_id: i64, scope: TokenScope) -> usize {
        let state = self.state.read().await;
        state
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.scope == scope)
            .count()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, mut user: User) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::DuplicateEmail);
        }

        state.next_user_id += 1;
        let now = Utc::now();
        user.id = state.next_user_id;
        user.role_name = None;
        user.created_at = now;
        user.updated_at = now;
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i64) -> Result<User, DatabaseError> {
        let state = self.state.read().await;
        state.users.get(&id).cloned().ok_or(DatabaseError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        let state = self.state.read().await;
        state
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }

    async fn list(&self, email: Option<&str>) -> Result<Vec<User>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| email.map_or(true, |e| u.email == e))
            .cloned()
            .collect())
    }

    async fn update(&self, user: &User) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user.id) {
            return Err(DatabaseError::EditConflict);
        }
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(DatabaseError::DuplicateEmail);
        }

        let mut stored = user.clone();
        stored.role_name = None;
        stored.updated_at = Utc::now();
        state.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_activation(&self, id: i64, is_active: bool) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.users.remove(&id).ok_or(DatabaseError::NotFound)?;
        // tokens.user_id cascades
        state.tokens.retain(|t| t.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn get(&self, id: i32) -> Result<Role, DatabaseError> {
        let state = self.state.read().await;
        state.roles.get(&id).cloned().ok_or(DatabaseError::NotFound)
    }

    async fn get_by_name(&self, name: &str) -> Result<Role, DatabaseError> {
        let state = self.state.read().await;
        state
            .roles
            .values()
            .find(|r| r.role_name == name)
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Role>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.roles.values().cloned().collect())
    }

    async fn insert(&self, name: &str) -> Result<Role, DatabaseError> {
        let mut state = self.state.write().await;
        if state.roles.values().any(|r| r.role_name == name) {
            return Err(DatabaseError::DuplicateRoleName);
        }

        state.next_role_id += 1;
        let role = Role {
            id: state.next_role_id,
            role_name: name.to_string(),
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update(&self, role: &Role) -> Result<Role, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role.id) {
            return Err(DatabaseError::EditConflict);
        }
        if state
            .roles
            .values()
            .any(|r| r.id != role.id && r.role_name == role.role_name)
        {
            return Err(DatabaseError::DuplicateRoleName);
        }

        state.roles.insert(role.id, role.clone());
        Ok(role.clone())
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&id) {
            return Err(DatabaseError::NotFound);
        }
        // users.role_id has no ON DELETE action
        if state.users.values().any(|u| u.role_id == id) {
            return Err(DatabaseError::RoleReference);
        }
        state.roles.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let mut record = token.clone();
        record.plaintext = String::new();
        state.tokens.push(record);
        Ok(())
    }

    async fn find_valid(
        &self,
        fingerprint: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError> {
        let state = self.state.read().await;
        let token = state
            .tokens
            .iter()
            .find(|t| t.fingerprint == fingerprint && t.scope == scope && t.expiry > now)
            .ok_or(DatabaseError::NotFound)?;

        let mut user = state
            .users
            .get(&token.user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound)?;
        let role = state.roles.get(&user.role_id).ok_or(DatabaseError::NotFound)?;
        user.role_name = Some(role.role_name.clone());
        Ok(user)
    }

    async fn delete_all_for_user(&self, user_id: i64, scope: TokenScope) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state
            .tokens
            .retain(|t| !(t.user_id == user_id && t.scope == scope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::Password;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new(
            "someone".to_string(),
            email.to_string(),
            Password::from_hash(b"hash".to_vec()),
            1,
        )
    }

    fn token(user_id: i64, scope: TokenScope, expiry: DateTime<Utc>) -> Token {
        Token {
            plaintext: "PLAIN".to_string(),
            fingerprint: vec![user_id as u8, 0xAB],
            user_id,
            scope,
            expiry,
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_rejects_duplicate_email() {
        let store = MemoryStore::new();
        let first = UserRepository::insert(&store, user("a@example.com")).await.unwrap();
        let second = UserRepository::insert(&store, user("b@example.com")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let err = UserRepository::insert(&store, user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateEmail));
    }

    #[tokio::test]
    async fn update_of_deleted_user_is_edit_conflict() {
        let store = MemoryStore::new();
        let stored = UserRepository::insert(&store, user("a@example.com")).await.unwrap();
        UserRepository::delete(&store, stored.id).await.unwrap();

        let err = UserRepository::update(&store, &stored).await.unwrap_err();
        assert!(matches!(err, DatabaseError::EditConflict));
    }

    #[tokio::test]
    async fn find_valid_requires_scope_expiry_and_role() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let stored = UserRepository::insert(&store, user("a@example.com")).await.unwrap();
        let t = token(stored.id, TokenScope::Authentication, now + Duration::hours(1));
        TokenRepository::insert(&store, &t).await.unwrap();

        // No role with id 1 yet: inner join drops the row
        let err = store
            .find_valid(&t.fingerprint, TokenScope::Authentication, now)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));

        RoleRepository::insert(&store, "Admin").await.unwrap();
        let found = store
            .find_valid(&t.fingerprint, TokenScope::Authentication, now)
            .await
            .unwrap();
        assert_eq!(found.id, stored.id);
        assert_eq!(found.role_name.as_deref(), Some("Admin"));

        assert!(store
            .find_valid(&t.fingerprint, TokenScope::Activation, now)
            .await
            .is_err());
        assert!(store
            .find_valid(&t.fingerprint, TokenScope::Authentication, t.expiry)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn role_in_use_cannot_be_deleted() {
        let store = MemoryStore::new();
        let admin = RoleRepository::insert(&store, "Admin").await.unwrap();
        let spare = RoleRepository::insert(&store, "Spare").await.unwrap();
        UserRepository::insert(&store, user("a@example.com")).await.unwrap();

        let err = RoleRepository::delete(&store, admin.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::RoleReference));
        RoleRepository::delete(&store, spare.id).await.unwrap();
        assert!(matches!(
            RoleRepository::delete(&store, spare.id).await.unwrap_err(),
            DatabaseError::NotFound
        ));
    }

    #[tokio::test]
    async fn delete_all_for_user_is_scoped() {
        let store = MemoryStore::new();
        let expiry = Utc::now() + Duration::hours(1);
        TokenRepository::insert(&store, &token(1, TokenScope::Authentication, expiry)).await.unwrap();
        TokenRepository::insert(&store, &token(1, TokenScope::Activation, expiry)).await.unwrap();
        TokenRepository::insert(&store, &token(2, TokenScope::Authentication, expiry)).await.unwrap();

        store.delete_all_for_user(1, TokenScope::Authentication).await.unwrap();
        store.delete_all_for_user(1, TokenScope::Authentication).await.unwrap();

        assert_eq!(store.token_count(1, TokenScope::Authentication).await, 0);
        assert_eq!(store.token_count(1, TokenScope::Activation).await, 1);
        assert_eq!(store.token_count(2, TokenScope::Authentication).await, 1);
    }
}
