use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::infrastructure::auth::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<UserRole>,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<UserRole>,
}

#[derive(Error, Debug, PartialEq)]
pub enum UserRepositoryError {
    #[error("User not found: {0}")]
    NotFound(String),
    #[error("Username '{0}' already exists")]
    UsernameExists(String),
}

/// Users keyed by username.
#[derive(Debug, Default)]
pub struct UserRepository {
    users: DashMap<String, User>,
}

impl UserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, new_user: &NewUser) -> Result<User, UserRepositoryError> {
        match self.users.entry(new_user.username.clone()) {
            Entry::Occupied(_) => Err(UserRepositoryError::UsernameExists(
                new_user.username.clone(),
            )),
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    username: new_user.username.clone(),
                    password_hash: new_user.password_hash.clone(),
                    roles: new_user.roles.clone(),
                    is_active: true,
                    registered_at: Utc::now(),
                    last_login_at: None,
                    failed_login_attempts: 0,
                    locked_until: None,
                };
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    pub fn find_by_username(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|u| u.value().clone())
    }

    /// Records a successful login and clears any lockout state.
    pub fn update_login_info(
        &self,
        username: &str,
        last_login_at: DateTime<Utc>,
    ) -> Result<(), UserRepositoryError> {
        let mut user = self.get_mut(username)?;
        user.last_login_at = Some(last_login_at);
        user.failed_login_attempts = 0;
        user.locked_until = None;
        Ok(())
    }

    /// Returns the new number of consecutive failures.
    pub fn increment_failed_attempts(&self, username: &str) -> Result<i32, UserRepositoryError> {
        let mut user = self.get_mut(username)?;
        user.failed_login_attempts += 1;
        Ok(user.failed_login_attempts)
    }

    pub fn update_lockout(
        &self,
        username: &str,
        locked_until: Option<DateTime<Utc>>,
        failed_login_attempts: i32,
    ) -> Result<(), UserRepositoryError> {
        let mut user = self.get_mut(username)?;
        user.locked_until = locked_until;
        user.failed_login_attempts = failed_login_attempts;
        Ok(())
    }

    fn get_mut(
        &self,
        username: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, User>, UserRepositoryError> {
        self.users
            .get_mut(username)
            .ok_or_else(|| UserRepositoryError::NotFound(username.to_string()))
    }
}
