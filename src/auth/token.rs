//! Bearer token issuance and verification (HS256 JWT).
//!
//! Tokens are stateless: nothing is persisted and the only way a token stops
//! working is its `exp` claim. Verification uses zero leeway.

use anyhow::{anyhow, Result};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use uuid::Uuid;

use crate::store::{Role, User};

pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
pub const DEFAULT_PROVIDER_LOGIN_TTL_SECONDS: i64 = 10 * 60;

/// Claim set carried by every token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Only set on provider-login tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Claims {
    /// Resolve access-token claims into a request identity.
    ///
    /// # Errors
    /// Provider-login tokens and non-UUID subjects are rejected.
    pub fn into_identity(self) -> Result<Identity, TokenError> {
        if self.provider.is_some() {
            return Err(TokenError::Malformed(
                "provider-login token used as access token".to_string(),
            ));
        }
        let id = Uuid::parse_str(&self.sub)
            .map_err(|_| TokenError::Malformed("subject is not a user id".to_string()))?;
        Ok(Identity {
            id,
            username: self.username,
            role: self.role,
        })
    }
}

/// Resolved request identity: who the bearer is, without credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
    provider_login_ttl_seconds: i64,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &"***")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("provider_login_ttl_seconds", &self.provider_login_ttl_seconds)
            .finish()
    }
}

impl TokenIssuer {
    /// Build an issuer from the shared signing secret.
    ///
    /// # Errors
    /// An empty secret is a configuration error.
    pub fn new(
        secret: &SecretString,
        ttl_seconds: i64,
        provider_login_ttl_seconds: i64,
    ) -> Result<Self> {
        let secret = secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(anyhow!("token signing secret must not be empty"));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_seconds,
            provider_login_ttl_seconds,
        })
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue an access token for a local account.
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if the claims cannot be signed.
    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        let now = now_unix_seconds();
        self.sign(&Claims {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            role: identity.role,
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
            provider: None,
        })
    }

    /// Issue a short-lived token for a principal known only to a provider.
    ///
    /// The subject is the provider-side identifier (or a handshake nonce), so
    /// these tokens never resolve to a request identity.
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if the claims cannot be signed.
    pub fn issue_provider_login(
        &self,
        provider_id: &str,
        provider: &str,
    ) -> Result<String, TokenError> {
        let now = now_unix_seconds();
        self.sign(&Claims {
            sub: provider_id.to_string(),
            username: provider.to_string(),
            role: Role::User,
            iat: now,
            exp: now.saturating_add(self.provider_login_ttl_seconds),
            provider: Some(provider.to_string()),
        })
    }

    /// Verify signature and expiry, then return the claims.
    ///
    /// # Errors
    /// `Expired`, `InvalidSignature` or `Malformed` depending on the failure.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = false;

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(err.to_string()),
            })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(ttl: i64) -> Result<TokenIssuer> {
        TokenIssuer::new(&SecretString::from("test-secret".to_string()), ttl, 60)
    }

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "Zoe".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn issued_claims_decode_to_same_identity() -> Result<()> {
        let issuer = issuer(3600)?;
        let identity = identity();
        let token = issuer.issue(&identity)?;

        let claims = issuer.decode(&token)?;
        assert_eq!(claims.sub, identity.id.to_string());
        assert_eq!(claims.username, "Zoe");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.into_identity()?, identity);
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<()> {
        let issuer = issuer(-10)?;
        let token = issuer.issue(&identity())?;
        assert!(matches!(issuer.decode(&token), Err(TokenError::Expired)));
        Ok(())
    }

    #[test]
    fn token_from_other_secret_is_rejected() -> Result<()> {
        let token = issuer(3600)?.issue(&identity())?;
        let other = TokenIssuer::new(&SecretString::from("other-secret".to_string()), 3600, 60)?;
        assert!(matches!(
            other.decode(&token),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() -> Result<()> {
        assert!(matches!(
            issuer(3600)?.decode("not.a.jwt"),
            Err(TokenError::Malformed(_))
        ));
        Ok(())
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenIssuer::new(&SecretString::from("".to_string()), 3600, 60).is_err());
    }

    #[test]
    fn provider_login_token_carries_provider() -> Result<()> {
        let issuer = issuer(3600)?;
        let token = issuer.issue_provider_login("1234567890", "discord")?;
        let claims = issuer.decode(&token)?;
        assert_eq!(claims.sub, "1234567890");
        assert_eq!(claims.provider.as_deref(), Some("discord"));
        assert_eq!(claims.exp - claims.iat, 60);
        assert!(claims.into_identity().is_err());
        Ok(())
    }

    #[test]
    fn debug_output_hides_keys() -> Result<()> {
        let rendered = format!("{:?}", issuer(3600)?);
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("test-secret"));
        Ok(())
    }
}
