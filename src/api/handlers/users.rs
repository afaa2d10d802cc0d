//! User management endpoints.
//!
//! Flow Overview:
//! 1) The route's guard chain authenticates the request (and checks the role
//!    for admin routes) before the handler runs.
//! 2) Handlers read the resolved identity from the request extensions.
//! 3) Self-or-admin checks that depend on the path id happen here.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::valid_username;
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        mail::{send_best_effort, MailMessage, TEMPLATE_BANNED},
    },
    auth::{AuthState, Identity, RequestIdentity},
    store::{Role, User, UserStatus, UserUpdate},
};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// User as returned by the API; never carries the password hash.
///
/// `email` and `status` are only present for the user themself or an admin.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
}

impl UserView {
    #[must_use]
    pub fn full(user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            status: Some(user.status),
            ..Self::public(user)
        }
    }

    #[must_use]
    pub fn public(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            email: None,
            status: None,
            provider: user.provider.clone(),
            created_at_unix: user.created_at_unix,
            updated_at_unix: user.updated_at_unix,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserPage {
    pub items: Vec<UserView>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number.
    page: Option<u32>,
    /// Page size, capped at 100.
    per_page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateMeRequest {
    pub username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct StatusRequest {
    pub status: UserStatus,
}

fn parse_user_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::BadRequest("Invalid user id".to_string()))
}

fn can_see_private(viewer: Option<&Identity>, user_id: Uuid) -> bool {
    viewer.is_some_and(|viewer| viewer.id == user_id || viewer.role == Role::Admin)
}

async fn load_user(state: &AuthState, id: Uuid) -> Result<User, ApiError> {
    state
        .store()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user.", body = UserView),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 404, description = "Account no longer exists.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_me(
    Extension(identity): Extension<Identity>,
    state: Extension<Arc<AuthState>>,
) -> Result<Json<UserView>, ApiError> {
    let user = load_user(&state, identity.id).await?;
    Ok(Json(UserView::full(&user)))
}

#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Username updated.", body = UserView),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 409, description = "Username already taken.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn patch_me(
    Extension(identity): Extension<Identity>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateMeRequest>>,
) -> Result<Json<UserView>, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::BadRequest("Missing or invalid payload".to_string()));
    };
    if !valid_username(&payload.username) {
        return Err(ApiError::BadRequest(
            "Username must be 3 to 24 characters".to_string(),
        ));
    }

    let update = UserUpdate {
        username: Some(payload.username.trim().to_string()),
        ..UserUpdate::default()
    };
    let user = state
        .store()
        .update(identity.id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(UserView::full(&user)))
}

#[utoipa::path(
    get,
    path = "/users",
    params(ListParams),
    responses(
        (status = 200, description = "Page of users, newest first.", body = UserPage),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Admin role required.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    Query(params): Query<ListParams>,
    state: Extension<Arc<AuthState>>,
) -> Result<Json<UserPage>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let offset = i64::from(page - 1) * i64::from(per_page);

    let (users, total) = state.store().list(offset, i64::from(per_page)).await?;
    Ok(Json(UserPage {
        items: users.iter().map(UserView::full).collect(),
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User profile; email and status only for self or admin.", body = UserView),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Invalid bearer token.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    Extension(RequestIdentity(viewer)): Extension<RequestIdentity>,
    state: Extension<Arc<AuthState>>,
) -> Result<Json<UserView>, ApiError> {
    let user = load_user(&state, parse_user_id(&id)?).await?;
    if can_see_private(viewer.as_ref(), user.id) {
        Ok(Json(UserView::full(&user)))
    } else {
        Ok(Json(UserView::public(&user)))
    }
}

#[utoipa::path(
    put,
    path = "/users/{id}/role",
    params(
        ("id" = String, Path, description = "User id")
    ),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role updated.", body = UserView),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Admin role required.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn set_role(
    Path(id): Path<String>,
    Extension(admin): Extension<Identity>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RoleRequest>>,
) -> Result<Json<UserView>, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::BadRequest("Missing or invalid payload".to_string()));
    };
    let user_id = parse_user_id(&id)?;
    let update = UserUpdate {
        role: Some(payload.role),
        ..UserUpdate::default()
    };
    let user = state
        .store()
        .update(user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    info!(admin_id = %admin.id, user_id = %user.id, role = %user.role, "role changed");
    Ok(Json(UserView::full(&user)))
}

#[utoipa::path(
    put,
    path = "/users/{id}/status",
    params(
        ("id" = String, Path, description = "User id")
    ),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status updated.", body = UserView),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Admin role required.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn set_status(
    Path(id): Path<String>,
    Extension(admin): Extension<Identity>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<StatusRequest>>,
) -> Result<Json<UserView>, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::BadRequest("Missing or invalid payload".to_string()));
    };
    let user_id = parse_user_id(&id)?;
    let update = UserUpdate {
        status: Some(payload.status),
        ..UserUpdate::default()
    };
    let user = state
        .store()
        .update(user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    info!(admin_id = %admin.id, user_id = %user.id, status = %user.status, "status changed");

    if user.is_banned() {
        let message = MailMessage {
            recipient: user.email.clone(),
            template: TEMPLATE_BANNED,
            data: json!({ "username": user.username }),
            subject: "Your account has been suspended".to_string(),
        };
        send_best_effort(state.mailer(), message).await;
    }

    Ok(Json(UserView::full(&user)))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "Account deleted."),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Only the account owner or an admin may delete.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    Extension(identity): Extension<Identity>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&id)?;
    if !can_see_private(Some(&identity), user_id) {
        return Err(ApiError::Forbidden(
            "Only the account owner or an admin may delete it".to_string(),
        ));
    }
    if !state.store().delete(user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    info!(caller_id = %identity.id, %user_id, "deleted account");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewUser;

    fn user() -> User {
        let new = NewUser::local("Zoe".to_string(), "zoe@gmail.com", "hash".to_string());
        User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            status: new.status,
            provider: new.provider,
            created_at_unix: 1,
            updated_at_unix: 2,
        }
    }

    #[test]
    fn public_view_hides_email_and_status() -> anyhow::Result<()> {
        let value = serde_json::to_value(UserView::public(&user()))?;
        assert!(value.get("email").is_none());
        assert!(value.get("status").is_none());
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["username"], "Zoe");
        Ok(())
    }

    #[test]
    fn full_view_includes_email_and_status() -> anyhow::Result<()> {
        let value = serde_json::to_value(UserView::full(&user()))?;
        assert_eq!(value["email"], "zoe@gmail.com");
        assert_eq!(value["status"], "unverified");
        assert!(value.get("password_hash").is_none());
        Ok(())
    }

    #[test]
    fn private_fields_for_self_or_admin_only() {
        let owner = Uuid::new_v4();
        let me = Identity {
            id: owner,
            username: "zoe".to_string(),
            role: Role::User,
        };
        let other = Identity {
            id: Uuid::new_v4(),
            ..me.clone()
        };
        let admin = Identity {
            role: Role::Admin,
            ..other.clone()
        };
        assert!(can_see_private(Some(&me), owner));
        assert!(can_see_private(Some(&admin), owner));
        assert!(!can_see_private(Some(&other), owner));
        assert!(!can_see_private(None, owner));
    }

    #[test]
    fn parse_user_id_rejects_garbage() {
        assert!(parse_user_id("not-a-uuid").is_err());
        assert!(parse_user_id(&format!(" {} ", Uuid::new_v4())).is_ok());
    }
}
