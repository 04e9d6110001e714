//! Service index: the registry's mount point for protocol clients.
//!
//! The package protocol surfaces (metadata, content, search, publish) are
//! served by their own layers; this document only advertises where they and
//! the auth endpoints live. It sits behind the general boundary, so it is the
//! first place an anonymous client hits a challenge.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceIndex {
    pub version: String,
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceResource {
    pub id: String,
    pub kind: String,
}

#[utoipa::path(
    get,
    path = "/v1/index.json",
    responses(
        (status = 200, description = "Service index", body = ServiceIndex),
        (status = 401, description = "No identity"),
        (status = 403, description = "Insufficient role")
    ),
    tag = "registry"
)]
pub async fn service_index() -> impl IntoResponse {
    let index = ServiceIndex {
        version: env!("CARGO_PKG_VERSION").to_string(),
        resources: vec![
            ServiceResource {
                id: "/v1/auth/session".to_string(),
                kind: "AuthSession".to_string(),
            },
            ServiceResource {
                id: "/v1/auth/login".to_string(),
                kind: "AuthLogin".to_string(),
            },
            ServiceResource {
                id: "/v1/users".to_string(),
                kind: "UserAdministration".to_string(),
            },
        ],
    };
    (StatusCode::OK, Json(index))
}
