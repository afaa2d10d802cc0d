//! Local and provider login endpoints.
//!
//! Flow Overview:
//! 1) `POST /auth/register` creates an unverified local account.
//! 2) `POST /auth/login` checks email/username + password and returns a bearer token.
//! 3) `GET /auth/{provider}` redirects to the provider consent page with a signed `state`.
//! 4) `GET /auth/{provider}/redirect` verifies `state`, fetches and normalizes the
//!    provider profile, unifies it with local accounts and returns a bearer token.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use ulid::Ulid;
use utoipa::{IntoParams, ToSchema};

use super::{users::UserView, valid_email, valid_password, valid_username};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        mail::{send_best_effort, MailMessage, TEMPLATE_WELCOME},
    },
    auth::{AuthState, CredentialIdentifier, Identity, ProviderKind, UnifiedLogin},
    store::{NewUser, User},
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

/// Login by `email` or `username`; email wins when both are sent.
#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    username: Option<String>,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessToken {
    pub access_token: String,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct ProviderCallback {
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the user declined consent.
    error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserView),
        (status = 400, description = "Invalid username, email or password", body = ErrorBody),
        (status = 409, description = "Username or email already taken", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    if !valid_username(&request.username) {
        return Err(ApiError::BadRequest(
            "Username must be 3 to 24 characters".to_string(),
        ));
    }
    if !valid_email(&request.email) {
        return Err(ApiError::BadRequest("Invalid email".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::BadRequest(
            "Password must be 8 to 124 characters".to_string(),
        ));
    }

    let password_hash = state.hasher().hash(&request.password).await?;
    let user = state
        .store()
        .create(NewUser::local(request.username, &request.email, password_hash))
        .await?;
    info!(user_id = %user.id, "registered local account");

    send_welcome(&state, &user).await;

    Ok((StatusCode::CREATED, Json(UserView::full(&user))))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Access token issued", body = AccessToken),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let identifier = match (request.email.as_deref(), request.username.as_deref()) {
        (Some(email), _) => CredentialIdentifier::Email(email),
        (None, Some(username)) => CredentialIdentifier::Username(username),
        (None, None) => return Err(ApiError::Unauthenticated),
    };

    let identity = state
        .validator()
        .validate(identifier, &request.password)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let access_token = state.issuer().issue(&identity)?;
    debug!(user_id = %identity.id, "issued access token");
    Ok((StatusCode::CREATED, Json(AccessToken { access_token })))
}

fn parse_provider(provider: &str) -> Result<ProviderKind, ApiError> {
    provider
        .parse::<ProviderKind>()
        .map_err(|err| ApiError::NotFound(err.to_string()))
}

#[utoipa::path(
    get,
    path = "/auth/{provider}",
    params(
        ("provider" = String, Path, description = "google, facebook or discord")
    ),
    responses(
        (status = 307, description = "Redirect to the provider consent page"),
        (status = 404, description = "Unknown or unconfigured provider", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state))]
pub async fn provider_login(
    Path(provider): Path<String>,
    state: Extension<Arc<AuthState>>,
) -> Result<Redirect, ApiError> {
    let provider = parse_provider(&provider)?;
    let nonce = Ulid::new().to_string();
    let handshake_state = state
        .issuer()
        .issue_provider_login(&nonce, provider.as_str())?;
    let url = state.oauth().authorize_url(provider, &handshake_state)?;
    Ok(Redirect::temporary(url.as_str()))
}

#[utoipa::path(
    get,
    path = "/auth/{provider}/redirect",
    params(
        ("provider" = String, Path, description = "google, facebook or discord"),
        ProviderCallback
    ),
    responses(
        (status = 200, description = "Access token issued", body = AccessToken),
        (status = 401, description = "Handshake failed or profile has no verified email", body = ErrorBody),
        (status = 404, description = "Unknown or unconfigured provider", body = ErrorBody),
        (status = 409, description = "Email already owned by another login method", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, callback))]
pub async fn provider_callback(
    Path(provider): Path<String>,
    Query(callback): Query<ProviderCallback>,
    state: Extension<Arc<AuthState>>,
) -> Result<Json<AccessToken>, ApiError> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = callback.error.as_deref() {
        debug!(%provider, error, "provider reported an error");
        return Err(ApiError::Unauthenticated);
    }
    let (Some(code), Some(handshake_state)) = (callback.code, callback.state) else {
        return Err(ApiError::Unauthenticated);
    };

    let claims = state.issuer().decode(&handshake_state)?;
    if claims.provider.as_deref() != Some(provider.as_str()) {
        debug!(%provider, "handshake state was issued for another provider");
        return Err(ApiError::Unauthenticated);
    }

    let raw = state.oauth().fetch_profile(provider, &code).await?;
    let profile = provider.normalizer().normalize(&raw).map_err(|err| {
        debug!("provider profile rejected: {err}");
        ApiError::Unauthenticated
    })?;

    let outcome = state.unifier().unify(&profile).await?;
    if let UnifiedLogin::Created(user) = &outcome {
        send_welcome(&state, user).await;
    }

    let access_token = state.issuer().issue(&Identity::from(outcome.user()))?;
    Ok(Json(AccessToken { access_token }))
}

async fn send_welcome(state: &AuthState, user: &User) {
    let message = MailMessage {
        recipient: user.email.clone(),
        template: TEMPLATE_WELCOME,
        data: json!({ "username": user.username }),
        subject: "Welcome to Truth or Dare".to_string(),
    };
    send_best_effort(state.mailer(), message).await;
}
