//! Admin-gated user management endpoints.
//!
//! These are thin projections over [`UserDirectory`]; the admin boundary
//! guard has already authenticated and authorized the caller by the time a
//! handler runs. Hash and salt fields never leave the directory: responses
//! carry only the summary projection, plus the one-time API key on creation
//! or rotation.

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::directory::User;
use crate::auth::state::AuthState;
use crate::auth::{AuthError, Role};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedUserResponse {
    pub user: UserSummary,
    /// Shown exactly once; only a salted hash is stored.
    pub api_key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    /// Shown exactly once; the previous key is already invalid.
    pub api_key: String,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "All directory users", body = [UserSummary]),
        (status = 401, description = "No identity"),
        (status = 403, description = "Insufficient role")
    ),
    tag = "users"
)]
pub async fn list_users(Extension(state): Extension<Arc<AuthState>>) -> impl IntoResponse {
    let users = state.directory().list_users().await;
    let summaries: Vec<UserSummary> = users.iter().map(UserSummary::from).collect();
    (StatusCode::OK, Json(summaries))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created; API key shown once", body = CreatedUserResponse),
        (status = 400, description = "Invalid username, password or role"),
        (status = 409, description = "Username already exists")
    ),
    tag = "users"
)]
pub async fn create_user(
    Extension(state): Extension<Arc<AuthState>>,
    Json(payload): Json<CreateUserRequest>,
) -> impl IntoResponse {
    match state
        .directory()
        .create_user(&payload.username, &payload.password, payload.role)
        .await
    {
        Ok((user, api_key)) => {
            let body = CreatedUserResponse {
                user: UserSummary::from(&user),
                api_key,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/users/{username}/role",
    params(("username" = String, Path, description = "Directory username")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserSummary),
        (status = 404, description = "Unknown user")
    ),
    tag = "users"
)]
pub async fn set_user_role(
    Path(username): Path<String>,
    Extension(state): Extension<Arc<AuthState>>,
    Json(payload): Json<UpdateRoleRequest>,
) -> impl IntoResponse {
    match state.directory().update_user(&username, payload.role).await {
        Ok(Some(user)) => (StatusCode::OK, Json(UserSummary::from(&user))).into_response(),
        Ok(None) => AuthError::NotFound.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{username}",
    params(("username" = String, Path, description = "Directory username")),
    responses(
        (status = 204, description = "User deleted and sessions revoked"),
        (status = 404, description = "Unknown user")
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(username): Path<String>,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Capture the id before the record disappears so the cascade can run.
    let user_id = state.directory().get_user(&username).await.map(|user| user.id);

    match state.directory().delete_user(&username).await {
        Ok(true) => {
            if let Some(user_id) = user_id {
                let revoked = state.sessions().delete_all_user_sessions(&user_id).await;
                info!(username, revoked, "user deleted, sessions revoked");
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => AuthError::NotFound.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/users/{username}/api-key",
    params(("username" = String, Path, description = "Directory username")),
    responses(
        (status = 200, description = "New API key; the old one is invalid", body = ApiKeyResponse),
        (status = 404, description = "Unknown user")
    ),
    tag = "users"
)]
pub async fn regenerate_api_key(
    Path(username): Path<String>,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match state.directory().regenerate_api_key(&username).await {
        Ok(Some(api_key)) => (StatusCode::OK, Json(ApiKeyResponse { api_key })).into_response(),
        Ok(None) => AuthError::NotFound.into_response(),
        Err(err) => err.into_response(),
    }
}
