//! OAuth2 authorization code handshake with the supported identity providers.
//!
//! Flow Overview: `GET /auth/{provider}` redirects to the provider's consent
//! page with a signed `state`. The provider sends the browser back to
//! `/auth/{provider}/redirect?code=..&state=..`; the code is exchanged for a
//! provider access token, which fetches the raw profile. Normalizing that
//! profile is the job of [`crate::auth::provider`].

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, fmt};
use tracing::{debug, instrument};
use url::Url;

use crate::auth::provider::ProviderKind;

/// Fixed per-provider endpoints and scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: &'static str,
    pub token_url: &'static str,
    pub profile_url: &'static str,
    pub scopes: &'static str,
}

impl ProviderEndpoints {
    #[must_use]
    pub const fn for_provider(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::Google => Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
                token_url: "https://oauth2.googleapis.com/token",
                profile_url: "https://openidconnect.googleapis.com/v1/userinfo",
                scopes: "openid email profile",
            },
            ProviderKind::Facebook => Self {
                authorize_url: "https://www.facebook.com/v18.0/dialog/oauth",
                token_url: "https://graph.facebook.com/v18.0/oauth/access_token",
                profile_url: "https://graph.facebook.com/me?fields=id,first_name,last_name,email",
                scopes: "email public_profile",
            },
            ProviderKind::Discord => Self {
                authorize_url: "https://discord.com/oauth2/authorize",
                token_url: "https://discord.com/api/oauth2/token",
                profile_url: "https://discord.com/api/users/@me",
                scopes: "identify email",
            },
        }
    }
}

/// Client registration at a provider.
#[derive(Clone)]
pub struct ProviderCredentials {
    client_id: String,
    client_secret: SecretString,
}

impl ProviderCredentials {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0} login is not configured")]
    NotConfigured(ProviderKind),
    #[error("invalid OAuth URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("OAuth request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} rejected the {step} request with status {status}")]
    Rejected {
        provider: ProviderKind,
        step: &'static str,
        status: u16,
    },
}

/// Provider side of the handshake.
#[async_trait]
pub trait OAuthHandshake: Send + Sync {
    /// Providers with credentials configured.
    fn enabled(&self) -> Vec<ProviderKind>;

    /// Consent page URL carrying `state`.
    ///
    /// # Errors
    /// `NotConfigured` when the provider has no credentials.
    fn authorize_url(&self, provider: ProviderKind, state: &str) -> Result<Url, OAuthError>;

    /// Exchange an authorization code and return the raw provider profile.
    ///
    /// # Errors
    /// Transport failures or non-success responses from the provider.
    async fn fetch_profile(&self, provider: ProviderKind, code: &str) -> Result<Value, OAuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// reqwest-backed handshake against the real provider endpoints.
#[derive(Clone, Debug)]
pub struct HttpOAuthClient {
    client: Client,
    public_base_url: String,
    providers: HashMap<ProviderKind, ProviderCredentials>,
}

impl HttpOAuthClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(public_base_url: &str) -> Result<Self, OAuthError> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            providers: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_provider(mut self, provider: ProviderKind, credentials: ProviderCredentials) -> Self {
        self.providers.insert(provider, credentials);
        self
    }

    /// Callback registered with the provider.
    #[must_use]
    pub fn callback_url(&self, provider: ProviderKind) -> String {
        format!("{}/auth/{provider}/redirect", self.public_base_url)
    }

    fn credentials(&self, provider: ProviderKind) -> Result<&ProviderCredentials, OAuthError> {
        self.providers
            .get(&provider)
            .ok_or(OAuthError::NotConfigured(provider))
    }

    async fn exchange_code(
        &self,
        provider: ProviderKind,
        credentials: &ProviderCredentials,
        code: &str,
    ) -> Result<String, OAuthError> {
        let endpoints = ProviderEndpoints::for_provider(provider);
        let redirect_uri = self.callback_url(provider);
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose_secret()),
        ];

        let response = self
            .client
            .post(endpoints.token_url)
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::Rejected {
                provider,
                step: "token",
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<TokenResponse>().await?.access_token)
    }
}

#[async_trait]
impl OAuthHandshake for HttpOAuthClient {
    fn enabled(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|provider| self.providers.contains_key(provider))
            .collect()
    }

    fn authorize_url(&self, provider: ProviderKind, state: &str) -> Result<Url, OAuthError> {
        let credentials = self.credentials(provider)?;
        let endpoints = ProviderEndpoints::for_provider(provider);
        let mut url = Url::parse(endpoints.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &self.callback_url(provider))
            .append_pair("scope", endpoints.scopes)
            .append_pair("state", state);
        Ok(url)
    }

    #[instrument(skip(self, code))]
    async fn fetch_profile(&self, provider: ProviderKind, code: &str) -> Result<Value, OAuthError> {
        let credentials = self.credentials(provider)?;
        let access_token = self.exchange_code(provider, credentials, code).await?;
        debug!("exchanged authorization code");

        let endpoints = ProviderEndpoints::for_provider(provider);
        let response = self
            .client
            .get(endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::Rejected {
                provider,
                step: "profile",
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn client() -> Result<HttpOAuthClient> {
        Ok(HttpOAuthClient::new("https://api.truthordare.dev/")?.with_provider(
            ProviderKind::Discord,
            ProviderCredentials::new(
                "discord-client".to_string(),
                SecretString::from("discord-secret".to_string()),
            ),
        ))
    }

    #[test]
    fn callback_url_uses_public_base() -> Result<()> {
        assert_eq!(
            client()?.callback_url(ProviderKind::Google),
            "https://api.truthordare.dev/auth/google/redirect"
        );
        Ok(())
    }

    #[test]
    fn authorize_url_carries_client_scope_and_state() -> Result<()> {
        let url = client()?.authorize_url(ProviderKind::Discord, "signed-state")?;
        assert_eq!(url.host_str(), Some("discord.com"));
        assert_eq!(url.path(), "/oauth2/authorize");

        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("discord-client"));
        assert_eq!(pairs.get("scope").map(String::as_str), Some("identify email"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("signed-state"));
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("https://api.truthordare.dev/auth/discord/redirect")
        );
        Ok(())
    }

    #[test]
    fn unconfigured_provider_is_reported() -> Result<()> {
        let client = client()?;
        assert_eq!(client.enabled(), vec![ProviderKind::Discord]);
        assert!(matches!(
            client.authorize_url(ProviderKind::Google, "state"),
            Err(OAuthError::NotConfigured(ProviderKind::Google))
        ));
        Ok(())
    }

    #[test]
    fn debug_output_hides_client_secret() {
        let credentials = ProviderCredentials::new(
            "id".to_string(),
            SecretString::from("super-secret".to_string()),
        );
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn every_provider_has_https_endpoints() -> Result<()> {
        for provider in ProviderKind::ALL {
            let endpoints = ProviderEndpoints::for_provider(provider);
            for raw in [endpoints.authorize_url, endpoints.token_url, endpoints.profile_url] {
                assert_eq!(Url::parse(raw)?.scheme(), "https");
            }
        }
        Ok(())
    }
}
