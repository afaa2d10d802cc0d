use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{password::PasswordHasher, token::Identity};
use crate::store::{CredentialStore, StoreError, User};

/// Plaintext behind the decoy hash verified for accounts without a password.
const DECOY_PASSWORD: &str = "truthordare-decoy-password";

/// Which column the login identifier is matched against.
#[derive(Clone, Copy, Debug)]
pub enum CredentialIdentifier<'a> {
    Email(&'a str),
    Username(&'a str),
}

/// Local login: identifier lookup plus password check.
#[derive(Clone)]
pub struct CredentialValidator {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    decoy_hash: Arc<OnceCell<String>>,
}

impl CredentialValidator {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Resolve an identity from a login attempt.
    ///
    /// Unknown identifier, provider-only account, wrong password and banned
    /// account all yield `Ok(None)` so callers cannot tell them apart. Every
    /// path runs one bcrypt verification at the configured cost.
    ///
    /// # Errors
    /// Only store failures are returned as errors.
    pub async fn validate(
        &self,
        identifier: CredentialIdentifier<'_>,
        plaintext: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let user = match identifier {
            CredentialIdentifier::Email(email) => self.store.find_by_email(email).await?,
            CredentialIdentifier::Username(username) => {
                self.store.find_by_username(username).await?
            }
        };

        let Some(user) = user else {
            debug!("login rejected: unknown identifier");
            self.verify_decoy(plaintext).await;
            return Ok(None);
        };
        Ok(self.check(&user, plaintext).await.then(|| Identity::from(&user)))
    }

    async fn check(&self, user: &User, plaintext: &str) -> bool {
        let Some(hash) = user.password_hash.as_deref() else {
            debug!(user_id = %user.id, "login rejected: account has no password");
            self.verify_decoy(plaintext).await;
            return false;
        };
        if !self.hasher.verify(plaintext, hash).await {
            debug!(user_id = %user.id, "login rejected: password mismatch");
            return false;
        }
        if user.is_banned() {
            debug!(user_id = %user.id, "login rejected: account banned");
            return false;
        }
        true
    }

    /// One bcrypt verification at the configured cost against a fixed hash,
    /// built on first use.
    async fn verify_decoy(&self, plaintext: &str) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hasher.hash(DECOY_PASSWORD))
            .await;
        match decoy {
            Ok(hash) => {
                let _ = self.hasher.verify(plaintext, hash).await;
            }
            Err(err) => warn!("failed to build decoy password hash: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCredentialStore, NewUser, Role, UserStatus, UserUpdate};
    use anyhow::Result;

    async fn fixture() -> Result<(CredentialValidator, Arc<MemoryCredentialStore>, User)> {
        let store = Arc::new(MemoryCredentialStore::new());
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("12345678").await?;
        let user = store
            .create(NewUser::local("Zoe".to_string(), "zoe@gmail.com", hash))
            .await?;
        let validator = CredentialValidator::new(store.clone(), hasher);
        Ok((validator, store, user))
    }

    #[tokio::test]
    async fn valid_credentials_resolve_identity() -> Result<()> {
        let (validator, _, user) = fixture().await?;

        let by_email = validator
            .validate(CredentialIdentifier::Email("Zoe@Gmail.com"), "12345678")
            .await?;
        assert_eq!(
            by_email,
            Some(Identity {
                id: user.id,
                username: "Zoe".to_string(),
                role: Role::User,
            })
        );

        let by_username = validator
            .validate(CredentialIdentifier::Username("zoe"), "12345678")
            .await?;
        assert_eq!(by_username.map(|identity| identity.id), Some(user.id));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_identifier_is_none() -> Result<()> {
        let (validator, _, _) = fixture().await?;
        let result = validator
            .validate(CredentialIdentifier::Email("nobody@gmail.com"), "12345678")
            .await?;
        assert!(result.is_none());
        let decoy = validator.decoy_hash.get().map(String::as_str);
        assert!(decoy.is_some_and(|hash| hash.starts_with("$2b$04$")));
        Ok(())
    }

    #[tokio::test]
    async fn decoy_hash_is_built_once_and_shared() -> Result<()> {
        let (validator, _, _) = fixture().await?;
        let clone = validator.clone();
        validator
            .validate(CredentialIdentifier::Username("ghost"), "12345678")
            .await?;
        let first = clone.decoy_hash.get().cloned();
        assert!(first.is_some());
        clone
            .validate(CredentialIdentifier::Username("ghost"), "87654321")
            .await?;
        assert_eq!(validator.decoy_hash.get().cloned(), first);
        Ok(())
    }

    #[tokio::test]
    async fn real_password_check_does_not_build_decoy() -> Result<()> {
        let (validator, _, _) = fixture().await?;
        validator
            .validate(CredentialIdentifier::Email("zoe@gmail.com"), "87654321")
            .await?;
        assert!(validator.decoy_hash.get().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_none() -> Result<()> {
        let (validator, _, _) = fixture().await?;
        let result = validator
            .validate(CredentialIdentifier::Email("zoe@gmail.com"), "87654321")
            .await?;
        assert!(result.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn provider_only_account_is_none() -> Result<()> {
        let (validator, store, _) = fixture().await?;
        store
            .create(NewUser::federated(
                "Max".to_string(),
                "max@gmail.com",
                "google",
            ))
            .await?;
        let result = validator
            .validate(CredentialIdentifier::Email("max@gmail.com"), "12345678")
            .await?;
        assert!(result.is_none());
        assert!(validator.decoy_hash.get().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn banned_user_with_correct_password_is_none() -> Result<()> {
        let (validator, store, user) = fixture().await?;
        store
            .update(
                user.id,
                UserUpdate {
                    status: Some(UserStatus::Banned),
                    ..UserUpdate::default()
                },
            )
            .await?;
        let result = validator
            .validate(CredentialIdentifier::Email("zoe@gmail.com"), "12345678")
            .await?;
        assert!(result.is_none());
        Ok(())
    }
}
