//! Credential store: user identity records and the persistence seam.
//!
//! Handlers and the auth core only talk to [`CredentialStore`]. Postgres backs
//! the running service; the in-memory store has the same uniqueness and
//! credential rules and is used by tests and embedders.

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive, str::FromStr, time::SystemTime};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(StoreError::Corrupt(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Unverified,
    Banned,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unverified => "unverified",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "unverified" => Ok(Self::Unverified),
            "banned" => Ok(Self::Banned),
            other => Err(StoreError::Corrupt(format!("unknown status: {other}"))),
        }
    }
}

/// Allowed username length in characters, after trimming.
pub const USERNAME_LENGTH: RangeInclusive<usize> = 3..=24;

/// Stored identity record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Absent when a provider is the only way to log in.
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub provider: Option<String>,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
}

impl User {
    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }
}

/// Fields required to create a user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub provider: Option<String>,
}

impl NewUser {
    /// Local registration: password login, pending verification.
    #[must_use]
    pub fn local(username: String, email: &str, password_hash: String) -> Self {
        Self {
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash: Some(password_hash),
            role: Role::User,
            status: UserStatus::Unverified,
            provider: None,
        }
    }

    /// First login through a provider: no password, active right away.
    #[must_use]
    pub fn federated(username: String, email: &str, provider: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash: None,
            role: Role::User,
            status: UserStatus::Active,
            provider: Some(provider.to_string()),
        }
    }

    fn check_credential(&self) -> Result<(), StoreError> {
        if self.password_hash.is_none() && self.provider.is_none() {
            return Err(StoreError::MissingCredential);
        }
        Ok(())
    }
}

/// Partial update; `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique column (`username` or `email`) is already in use.
    #[error("{0} is already taken")]
    Conflict(&'static str),
    #[error("user record needs a password hash or a linked provider")]
    MissingCredential,
    #[error("invalid stored value: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence operations over [`User`] records.
///
/// Implementations enforce username (case-insensitive) and email uniqueness
/// atomically and report violations as [`StoreError::Conflict`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Page of users, newest first, plus the total count.
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError>;

    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Returns `Ok(None)` when the user does not exist.
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, StoreError>;

    /// Returns `Ok(false)` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
