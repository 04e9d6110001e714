//! Router assembly and the HTTP server loop.

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;

use crate::auth::gate::Boundary;
use crate::auth::resolver;
use crate::auth::state::AuthState;

pub(crate) mod handlers;
mod openapi;

pub use openapi::ApiDoc;

use handlers::{health, index, session, users};

/// Build the full application router.
///
/// The auth endpoints authenticate themselves and stay public; the service
/// index sits behind the general boundary and user administration behind the
/// admin boundary. The publish boundary is exported for the package upload
/// layers that mount on top of this core.
#[must_use]
pub fn router(state: Arc<AuthState>) -> Router {
    let general = Router::new()
        .route("/v1/index.json", get(index::service_index))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), Boundary::General),
            resolver::guard,
        ));

    let admin = Router::new()
        .route("/v1/users", get(users::list_users).post(users::create_user))
        .route("/v1/users/:username", delete(users::delete_user))
        .route("/v1/users/:username/role", put(users::set_user_role))
        .route(
            "/v1/users/:username/api-key",
            post(users::regenerate_api_key),
        )
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), Boundary::Admin),
            resolver::guard,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/login", post(session::login))
        .route("/v1/auth/logout", post(session::logout))
        .route("/v1/auth/session", get(session::session))
        .merge(general)
        .merge(admin)
        .layer(Extension(state))
}

/// Start the server.
/// # Errors
/// Return error if failed to bind or serve.
pub async fn serve(port: u16, state: Arc<AuthState>) -> Result<()> {
    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
