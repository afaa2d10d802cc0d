//! Auth state and configuration.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;

use super::{
    password::{PasswordHasher, DEFAULT_BCRYPT_COST},
    token::{TokenIssuer, DEFAULT_PROVIDER_LOGIN_TTL_SECONDS, DEFAULT_TOKEN_TTL_SECONDS},
    unifier::ProviderLoginUnifier,
    validator::CredentialValidator,
};
use crate::{api::mail::Mailer, oauth::OAuthHandshake, store::CredentialStore};

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_base_url: String,
    frontend_base_url: String,
    token_ttl_seconds: i64,
    provider_login_ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            provider_login_ttl_seconds: DEFAULT_PROVIDER_LOGIN_TTL_SECONDS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_provider_login_ttl_seconds(mut self, seconds: i64) -> Self {
        self.provider_login_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn provider_login_ttl_seconds(&self) -> i64 {
        self.provider_login_ttl_seconds
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

/// Everything request handlers need, shared behind an `Arc`.
pub struct AuthState {
    config: AuthConfig,
    issuer: TokenIssuer,
    hasher: PasswordHasher,
    validator: CredentialValidator,
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    oauth: Arc<dyn OAuthHandshake>,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the token issuer cannot be built from `jwt_secret`.
    pub fn new(
        config: AuthConfig,
        jwt_secret: &SecretString,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        oauth: Arc<dyn OAuthHandshake>,
    ) -> Result<Self> {
        let issuer = TokenIssuer::new(
            jwt_secret,
            config.token_ttl_seconds(),
            config.provider_login_ttl_seconds(),
        )?;
        let hasher = PasswordHasher::new(config.bcrypt_cost());
        Ok(Self {
            validator: CredentialValidator::new(Arc::clone(&store), hasher),
            hasher,
            issuer,
            config,
            store,
            mailer,
            oauth,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn oauth(&self) -> &dyn OAuthHandshake {
        self.oauth.as_ref()
    }

    /// Shared across requests so the decoy hash is built once.
    #[must_use]
    pub fn validator(&self) -> &CredentialValidator {
        &self.validator
    }

    #[must_use]
    pub fn unifier(&self) -> ProviderLoginUnifier {
        ProviderLoginUnifier::new(Arc::clone(&self.store))
    }
}
