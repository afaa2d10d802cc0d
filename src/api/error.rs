//! HTTP error taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::{
    auth::{TokenError, UnifyError},
    oauth::OAuthError,
    store::StoreError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// Deliberately carries no detail: callers must not learn why.
    Unauthenticated,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Conflict(message) => message,
            Self::Unauthenticated => "Unauthorized".to_string(),
            Self::Internal(err) => {
                error!("Failed to handle request: {err:#}");
                "Internal server error".to_string()
            }
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => Self::Conflict(format!("{field} is already taken")),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => Self::Internal(err.into()),
            TokenError::Expired | TokenError::InvalidSignature | TokenError::Malformed(_) => {
                Self::Unauthenticated
            }
        }
    }
}

impl From<UnifyError> for ApiError {
    fn from(err: UnifyError) -> Self {
        match err {
            UnifyError::Conflict(message) => Self::Conflict(message),
            UnifyError::Banned => Self::Unauthenticated,
            UnifyError::Store(err) => err.into(),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::NotConfigured(provider) => {
                Self::NotFound(format!("{provider} login is not available"))
            }
            OAuthError::Rejected { .. } => {
                tracing::debug!("provider handshake rejected: {err}");
                Self::Unauthenticated
            }
            OAuthError::Url(_) | OAuthError::Http(_) => Self::Internal(err.into()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}
