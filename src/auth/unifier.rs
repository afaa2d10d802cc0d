use std::sync::Arc;
use tracing::{debug, info};

use super::provider::NormalizedProfile;
use crate::store::{CredentialStore, NewUser, StoreError, User};

/// Terminal success state of a provider login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnifiedLogin {
    /// Returning user already linked to this provider.
    Existing(User),
    /// First login: an account was created for the provider profile.
    Created(User),
}

impl UnifiedLogin {
    #[must_use]
    pub fn user(&self) -> &User {
        match self {
            Self::Existing(user) | Self::Created(user) => user,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnifyError {
    #[error("{0}")]
    Conflict(String),
    #[error("account is banned")]
    Banned,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maps a normalized provider profile onto a local account.
///
/// Email is the join key. A user owns at most one provider link, so a match
/// on email with any other binding (local password or another provider) is a
/// conflict rather than an implicit account merge.
#[derive(Clone)]
pub struct ProviderLoginUnifier {
    store: Arc<dyn CredentialStore>,
}

impl ProviderLoginUnifier {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `Conflict` when the email or username belongs to an incompatible
    /// account, `Banned` for a banned returning user, `Store` on store failure.
    pub async fn unify(&self, profile: &NormalizedProfile) -> Result<UnifiedLogin, UnifyError> {
        let provider = profile.provider.as_str();

        if let Some(user) = self.store.find_by_email(&profile.email).await? {
            if user.provider.as_deref() != Some(provider) {
                debug!(user_id = %user.id, provider, "provider login conflicts with existing account");
                return Err(UnifyError::Conflict(format!(
                    "email {} is already registered with another login method",
                    profile.email
                )));
            }
            if user.is_banned() {
                return Err(UnifyError::Banned);
            }
            debug!(user_id = %user.id, provider, "returning provider login");
            return Ok(UnifiedLogin::Existing(user));
        }

        let new_user = NewUser::federated(profile.username.clone(), &profile.email, provider);
        match self.store.create(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, provider, "created account from provider login");
                Ok(UnifiedLogin::Created(user))
            }
            Err(StoreError::Conflict(field)) => Err(UnifyError::Conflict(format!(
                "{field} {} is already taken",
                if field == "email" {
                    &profile.email
                } else {
                    &profile.username
                }
            ))),
            Err(err) => Err(err.into()),
        }
    }
}
