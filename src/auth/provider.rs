//! Provider profile normalization.
//!
//! Each identity provider returns its own profile shape. A
//! [`ProviderProfileNormalizer`] per provider maps that raw JSON into a
//! [`NormalizedProfile`]; the provider is picked by its [`ProviderKind`] tag.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::store::USERNAME_LENGTH;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Google,
    Facebook,
    Discord,
}

impl ProviderKind {
    pub const ALL: [Self; 3] = [Self::Google, Self::Facebook, Self::Discord];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Discord => "discord",
        }
    }

    /// Normalizer for this provider's profile shape.
    #[must_use]
    pub fn normalizer(self) -> &'static dyn ProviderProfileNormalizer {
        match self {
            Self::Google => &GoogleProfileNormalizer,
            Self::Facebook => &FacebookProfileNormalizer,
            Self::Discord => &DiscordProfileNormalizer,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            "discord" => Ok(Self::Discord),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Provider-independent identity assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedProfile {
    /// Identifier of the principal at the provider.
    pub provider_id: String,
    pub username: String,
    /// First verified email on the profile.
    pub email: String,
    pub provider: ProviderKind,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid {provider} profile: {reason}")]
    Invalid {
        provider: ProviderKind,
        reason: String,
    },
    #[error("{0} profile has no verified email address")]
    MissingVerifiedEmail(ProviderKind),
    #[error("{0} profile has no usable display name")]
    MissingUsername(ProviderKind),
}

pub trait ProviderProfileNormalizer: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Map a raw provider profile into the common shape.
    ///
    /// # Errors
    /// Fails when the profile cannot be parsed, has no verified email or no name.
    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ProfileError>;
}

fn parse_profile<T: DeserializeOwned>(provider: ProviderKind, raw: &Value) -> Result<T, ProfileError> {
    T::deserialize(raw).map_err(|err| ProfileError::Invalid {
        provider,
        reason: err.to_string(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Providers send numeric ids as numbers or strings depending on the API.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Cut display names down to the longest username local accounts may have.
fn clamp_username(name: &str) -> String {
    name.chars()
        .take(*USERNAME_LENGTH.end())
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn build_profile(
    provider: ProviderKind,
    id: &Value,
    username: Option<String>,
    email: Option<String>,
) -> Result<NormalizedProfile, ProfileError> {
    let provider_id = id_string(id).ok_or_else(|| ProfileError::Invalid {
        provider,
        reason: "missing id".to_string(),
    })?;
    let email = non_empty(email).ok_or(ProfileError::MissingVerifiedEmail(provider))?;
    let username = non_empty(username)
        .map(|name| clamp_username(&name))
        .filter(|name| USERNAME_LENGTH.contains(&name.chars().count()))
        .ok_or(ProfileError::MissingUsername(provider))?;
    Ok(NormalizedProfile {
        provider_id,
        username,
        email: email.to_lowercase(),
        provider,
    })
}

/// Google OpenID Connect `userinfo`.
#[derive(Debug)]
pub struct GoogleProfileNormalizer;

#[derive(Deserialize)]
struct GoogleProfile {
    sub: Value,
    name: Option<String>,
    given_name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

impl ProviderProfileNormalizer for GoogleProfileNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ProfileError> {
        let profile: GoogleProfile = parse_profile(self.provider(), raw)?;
        let email = profile.email.filter(|_| profile.email_verified);
        let username = non_empty(profile.name).or(profile.given_name);
        build_profile(self.provider(), &profile.sub, username, email)
    }
}

/// Facebook Graph `/me?fields=id,first_name,last_name,email`.
#[derive(Debug)]
pub struct FacebookProfileNormalizer;

#[derive(Deserialize)]
struct FacebookProfile {
    id: Value,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
}

impl ProviderProfileNormalizer for FacebookProfileNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Facebook
    }

    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ProfileError> {
        let profile: FacebookProfile = parse_profile(self.provider(), raw)?;
        // Graph only exposes confirmed addresses.
        let username = format!(
            "{}{}",
            profile.first_name.unwrap_or_default().trim(),
            profile.last_name.unwrap_or_default().trim()
        );
        build_profile(self.provider(), &profile.id, Some(username), profile.email)
    }
}

/// Discord `/users/@me`.
#[derive(Debug)]
pub struct DiscordProfileNormalizer;

#[derive(Deserialize)]
struct DiscordProfile {
    id: Value,
    username: Option<String>,
    email: Option<String>,
    #[serde(default)]
    verified: bool,
}

impl ProviderProfileNormalizer for DiscordProfileNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Discord
    }

    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ProfileError> {
        let profile: DiscordProfile = parse_profile(self.provider(), raw)?;
        let email = profile.email.filter(|_| profile.verified);
        build_profile(self.provider(), &profile.id, profile.username, email)
    }
}
