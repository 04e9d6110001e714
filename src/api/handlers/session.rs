//! Session endpoints: login, logout, and the current-identity probe.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::state::AuthState;
use crate::auth::{REMEMBER_ME_TTL_HOURS, Role, Tier, resolver};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session cookie set", body = IdentityResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let client_ip = resolver::client_ip(&headers);
    let Some(identity) = resolver::verify_credentials(
        &state,
        Tier::General,
        &payload.username,
        &payload.password,
        &client_ip,
    )
    .await
    else {
        return resolver::unauthenticated_response(state.config(), &headers);
    };

    let ttl_hours = if payload.remember_me {
        REMEMBER_ME_TTL_HOURS
    } else {
        state
            .config()
            .session_ttl_hours()
            .clamp(1, REMEMBER_ME_TTL_HOURS)
    };

    // Flat-file users have no directory id; key their sessions by username.
    let user_id = identity
        .user_id
        .clone()
        .unwrap_or_else(|| format!("htpasswd:{}", identity.username));

    let session = match state
        .sessions()
        .create_session(&user_id, &identity.username, identity.role, ttl_hours)
        .await
    {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    match resolver::session_cookie(state.config(), &session.token, ttl_hours) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }

    let body = IdentityResponse {
        username: identity.username,
        role: identity.role,
        user_id: identity.user_id,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = IdentityResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // A missing cookie is just "no session"; nothing to clear.
    let Some(token) = resolver::extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match state.sessions().validate_session(&token).await {
        Some(session) => {
            let body = IdentityResponse {
                username: session.username,
                role: session.role,
                user_id: Some(session.user_id),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        None => {
            // The token no longer validates; tell the browser to drop it.
            let mut response_headers = HeaderMap::new();
            if let Ok(cookie) = resolver::clear_session_cookie(state.config()) {
                response_headers.insert(SET_COOKIE, cookie);
            }
            (StatusCode::NO_CONTENT, response_headers).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = resolver::extract_session_token(&headers) {
        state.sessions().delete_session(&token).await;
    }

    // Always clear the cookie, even if the session record was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = resolver::clear_session_cookie(state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
