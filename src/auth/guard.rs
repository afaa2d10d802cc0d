//! Per-route access and role guards.
//!
//! Flow Overview: a route declares a [`GuardChain`] when it is registered.
//! On each request the chain runs its guards in order; every guard either
//! denies the request or updates the [`RequestContext`]. When the chain
//! allows, the resolved identity is attached to the request extensions as
//! [`RequestIdentity`] (and as [`Identity`] when present) for the handler.

use anyhow::anyhow;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::{
    token::{Identity, TokenIssuer},
    AuthState,
};
use crate::{api::error::ApiError, store::Role};

/// Whether a missing bearer token is acceptable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Required,
    Optional,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    /// Verify the bearer token and resolve the identity.
    Authenticate(AccessMode),
    /// Any-of role check against the resolved identity.
    Roles(Vec<Role>),
}

/// Request-scoped state guards read and update.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
}

/// Identity resolved by the guard chain; `None` on optional routes without a token.
#[derive(Clone, Debug, Default)]
pub struct RequestIdentity(pub Option<Identity>);

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GuardRejection {
    #[error("missing or invalid bearer token")]
    Unauthenticated,
    #[error("insufficient role")]
    Forbidden,
}

impl From<GuardRejection> for ApiError {
    fn from(rejection: GuardRejection) -> Self {
        match rejection {
            GuardRejection::Unauthenticated => Self::Unauthenticated,
            GuardRejection::Forbidden => Self::Forbidden("insufficient role".to_string()),
        }
    }
}

/// Ordered guard list attached to a route.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardChain {
    guards: Vec<Guard>,
}

impl GuardChain {
    /// Chain that requires a valid bearer token.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            guards: vec![Guard::Authenticate(AccessMode::Required)],
        }
    }

    /// Chain that resolves a bearer token when one is sent.
    #[must_use]
    pub fn optional() -> Self {
        Self {
            guards: vec![Guard::Authenticate(AccessMode::Optional)],
        }
    }

    /// Authenticated chain restricted to the given roles.
    #[must_use]
    pub fn roles(roles: &[Role]) -> Self {
        Self::authenticated().then(Guard::Roles(roles.to_vec()))
    }

    #[must_use]
    pub fn then(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    #[must_use]
    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    /// Run every guard in declaration order, stopping at the first denial.
    ///
    /// # Errors
    /// The rejection of the first guard that denies.
    pub fn evaluate(
        &self,
        issuer: &TokenIssuer,
        headers: &HeaderMap,
    ) -> Result<RequestContext, GuardRejection> {
        let mut context = RequestContext::default();
        for guard in &self.guards {
            match guard {
                Guard::Authenticate(mode) => {
                    context.identity = authenticate(issuer, headers, *mode)?;
                }
                Guard::Roles(required) => authorize_roles(context.identity.as_ref(), required)?,
            }
        }
        Ok(context)
    }
}

/// Access guard.
///
/// A header that is present but unusable is rejected even in optional mode.
///
/// # Errors
/// `Unauthenticated` for a missing (required mode), malformed, expired or
/// foreign token, and for provider-login tokens.
pub fn authenticate(
    issuer: &TokenIssuer,
    headers: &HeaderMap,
    mode: AccessMode,
) -> Result<Option<Identity>, GuardRejection> {
    if !headers.contains_key(AUTHORIZATION) {
        return match mode {
            AccessMode::Required => Err(GuardRejection::Unauthenticated),
            AccessMode::Optional => Ok(None),
        };
    }

    let token = extract_bearer_token(headers).ok_or(GuardRejection::Unauthenticated)?;
    let identity = issuer
        .decode(&token)
        .and_then(|claims| claims.into_identity())
        .map_err(|err| {
            debug!("bearer token rejected: {err}");
            GuardRejection::Unauthenticated
        })?;
    Ok(Some(identity))
}

/// Role guard with any-of semantics.
///
/// # Errors
/// `Unauthenticated` when roles are required and nothing was resolved,
/// `Forbidden` when the identity's role is not listed.
pub fn authorize_roles(identity: Option<&Identity>, required: &[Role]) -> Result<(), GuardRejection> {
    if required.is_empty() {
        return Ok(());
    }
    let identity = identity.ok_or(GuardRejection::Unauthenticated)?;
    if required.contains(&identity.role) {
        Ok(())
    } else {
        debug!(user_id = %identity.id, role = %identity.role, "role guard denied");
        Err(GuardRejection::Forbidden)
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    // Auth scheme names are case-insensitive.
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Axum middleware running a [`GuardChain`] before the handler.
///
/// The token issuer comes from the `Arc<AuthState>` extension installed on
/// the outer router, so route registration does not need live state.
pub async fn enforce(State(chain): State<GuardChain>, mut request: Request, next: Next) -> Response {
    let Some(state) = request.extensions().get::<Arc<AuthState>>().cloned() else {
        return ApiError::Internal(anyhow!("auth state missing from request extensions"))
            .into_response();
    };

    match chain.evaluate(state.issuer(), request.headers()) {
        Ok(context) => {
            if let Some(identity) = context.identity.clone() {
                request.extensions_mut().insert(identity);
            }
            request
                .extensions_mut()
                .insert(RequestIdentity(context.identity));
            next.run(request).await
        }
        Err(rejection) => ApiError::from(rejection).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use uuid::Uuid;

    fn issuer(ttl: i64) -> Result<TokenIssuer> {
        TokenIssuer::new(&SecretString::from("guard-secret".to_string()), ttl, 60)
    }

    fn identity(role: Role) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "zoe".to_string(),
            role,
        }
    }

    fn bearer(token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        Ok(headers)
    }

    #[test]
    fn extract_bearer_token_ignores_scheme_case() -> Result<()> {
        assert_eq!(extract_bearer_token(&bearer("abc")?).as_deref(), Some("abc"));
        let mut headers = HeaderMap::new();
        for (value, expected) in [
            ("bearer  xyz ", Some("xyz")),
            ("BEARER xyz", Some("xyz")),
            ("BeArEr xyz", Some("xyz")),
            ("Basic Zm9vOmJhcg==", None),
            ("Bearerxyz", None),
            ("Bearer ", None),
        ] {
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(extract_bearer_token(&headers).as_deref(), expected, "{value:?}");
        }
        Ok(())
    }

    #[test]
    fn uppercase_scheme_authenticates() -> Result<()> {
        let issuer = issuer(3600)?;
        let expected = identity(Role::User);
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("BEARER {}", issuer.issue(&expected)?))?,
        );
        assert_eq!(
            authenticate(&issuer, &headers, AccessMode::Required),
            Ok(Some(expected))
        );
        Ok(())
    }

    #[test]
    fn missing_header_depends_on_mode() -> Result<()> {
        let issuer = issuer(3600)?;
        let headers = HeaderMap::new();
        assert_eq!(
            authenticate(&issuer, &headers, AccessMode::Required),
            Err(GuardRejection::Unauthenticated)
        );
        assert_eq!(authenticate(&issuer, &headers, AccessMode::Optional), Ok(None));
        Ok(())
    }

    #[test]
    fn valid_token_resolves_identity() -> Result<()> {
        let issuer = issuer(3600)?;
        let expected = identity(Role::User);
        let headers = bearer(&issuer.issue(&expected)?)?;
        assert_eq!(
            authenticate(&issuer, &headers, AccessMode::Required),
            Ok(Some(expected))
        );
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected_in_both_modes() -> Result<()> {
        let issuer = issuer(-5)?;
        let headers = bearer(&issuer.issue(&identity(Role::Admin))?)?;
        for mode in [AccessMode::Required, AccessMode::Optional] {
            assert_eq!(
                authenticate(&issuer, &headers, mode),
                Err(GuardRejection::Unauthenticated)
            );
        }
        Ok(())
    }

    #[test]
    fn malformed_header_is_rejected_in_optional_mode() -> Result<()> {
        let issuer = issuer(3600)?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert_eq!(
            authenticate(&issuer, &headers, AccessMode::Optional),
            Err(GuardRejection::Unauthenticated)
        );
        assert_eq!(
            authenticate(&issuer, &bearer("not-a-jwt")?, AccessMode::Optional),
            Err(GuardRejection::Unauthenticated)
        );
        Ok(())
    }

    #[test]
    fn provider_login_token_is_not_an_access_token() -> Result<()> {
        let issuer = issuer(3600)?;
        let headers = bearer(&issuer.issue_provider_login("nonce", "google")?)?;
        assert_eq!(
            authenticate(&issuer, &headers, AccessMode::Required),
            Err(GuardRejection::Unauthenticated)
        );
        Ok(())
    }

    #[test]
    fn role_guard_matrix() {
        let user = identity(Role::User);
        let admin = identity(Role::Admin);

        assert_eq!(
            authorize_roles(Some(&user), &[Role::Admin]),
            Err(GuardRejection::Forbidden)
        );
        assert_eq!(authorize_roles(Some(&admin), &[Role::Admin]), Ok(()));
        assert_eq!(authorize_roles(Some(&user), &[Role::User, Role::Admin]), Ok(()));
        assert_eq!(authorize_roles(Some(&user), &[]), Ok(()));
        assert_eq!(authorize_roles(None, &[]), Ok(()));
        assert_eq!(
            authorize_roles(None, &[Role::Admin]),
            Err(GuardRejection::Unauthenticated)
        );
    }

    #[test]
    fn chain_runs_guards_in_order() -> Result<()> {
        let issuer = issuer(3600)?;
        let chain = GuardChain::roles(&[Role::Admin]);
        assert_eq!(
            chain.guards(),
            &[
                Guard::Authenticate(AccessMode::Required),
                Guard::Roles(vec![Role::Admin])
            ]
        );

        assert_eq!(
            chain.evaluate(&issuer, &HeaderMap::new()).err(),
            Some(GuardRejection::Unauthenticated)
        );
        let user_headers = bearer(&issuer.issue(&identity(Role::User))?)?;
        assert_eq!(
            chain.evaluate(&issuer, &user_headers).err(),
            Some(GuardRejection::Forbidden)
        );
        let admin = identity(Role::Admin);
        let context = chain.evaluate(&issuer, &bearer(&issuer.issue(&admin)?)?)?;
        assert_eq!(context.identity, Some(admin));
        Ok(())
    }

    #[test]
    fn empty_chain_allows_anonymous() -> Result<()> {
        let context = GuardChain::default().evaluate(&issuer(3600)?, &HeaderMap::new())?;
        assert!(context.identity.is_none());
        Ok(())
    }
}
