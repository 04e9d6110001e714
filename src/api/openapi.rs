//! OpenAPI document for the served routes.

use axum::Json;
use utoipa::OpenApi;

use super::handlers::{health, index, session, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        index::service_index,
        session::login,
        session::logout,
        session::session,
        users::list_users,
        users::create_user,
        users::set_user_role,
        users::delete_user,
        users::regenerate_api_key,
    ),
    components(schemas(
        health::Health,
        index::ServiceIndex,
        index::ServiceResource,
        session::LoginRequest,
        session::IdentityResponse,
        users::UserSummary,
        users::CreateUserRequest,
        users::CreatedUserResponse,
        users::UpdateRoleRequest,
        users::ApiKeyResponse,
        crate::auth::Role,
    )),
    tags(
        (name = "auth", description = "Login, logout and session inspection"),
        (name = "users", description = "Admin-gated user administration"),
        (name = "registry", description = "Service index"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

/// Serve the raw document; no bundled UI.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
