//! Hybrid authentication: session cookie or embedded Basic credentials.
//!
//! Precedence per request: a valid session token wins outright; an invalid
//! token is flagged for cookie clearing and the request falls through to
//! embedded credentials; failed credentials are counted and throttled before
//! the request concludes unauthenticated.
//!
//! Unknown-username and wrong-password attempts are deliberately
//! indistinguishable: same response shape, same failure accounting, same
//! delay, and one cause-free log line.

use axum::extract::{Request, State};
use axum::http::header::{
    ACCEPT, AUTHORIZATION, COOKIE, InvalidHeaderValue, LOCATION, SET_COOKIE, WWW_AUTHENTICATE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use std::sync::Arc;
use tracing::debug;

use super::credfile::Tier;
use super::gate::{self, Boundary, Role};
use super::state::{AuthConfig, AuthState};

pub const SESSION_COOKIE_NAME: &str = "wharf_session";

/// Who a request turned out to be.
#[derive(Clone, Debug)]
pub struct Identity {
    /// Directory record id; flat-file users have none.
    pub user_id: Option<String>,
    pub username: String,
    pub role: Role,
    pub source: IdentitySource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentitySource {
    Session,
    Directory,
    CredentialFile,
}

/// Outcome of resolution. `stale_cookie` asks the caller to clear a session
/// cookie that no longer validates, whatever the final outcome was.
#[derive(Debug)]
pub struct Resolution {
    pub identity: Option<Identity>,
    pub stale_cookie: bool,
}

/// Run the resolution state machine for one request.
pub async fn resolve(state: &AuthState, tier: Tier, headers: &HeaderMap) -> Resolution {
    let mut stale_cookie = false;

    if let Some(token) = extract_session_token(headers) {
        if let Some(session) = state.sessions().validate_session(&token).await {
            return Resolution {
                identity: Some(Identity {
                    user_id: Some(session.user_id),
                    username: session.username,
                    role: session.role,
                    source: IdentitySource::Session,
                }),
                stale_cookie: false,
            };
        }
        stale_cookie = true;
    }

    if let Some((username, password)) = extract_basic_credentials(headers) {
        let client_ip = client_ip(headers);
        let identity =
            verify_credentials(state, tier, &username, &password, &client_ip).await;
        return Resolution {
            identity,
            stale_cookie,
        };
    }

    Resolution {
        identity: None,
        stale_cookie,
    }
}

/// Verify embedded credentials, in precedence order: directory password,
/// directory API key, then the flat-file combined view for `tier`.
///
/// Success clears the failure counters for this IP/username pair; failure
/// records one attempt and serves its progressive delay before returning.
pub async fn verify_credentials(
    state: &AuthState,
    tier: Tier,
    username: &str,
    password: &str,
    client_ip: &str,
) -> Option<Identity> {
    let identity = if let Some(user) = state.directory().verify_password(username, password).await
    {
        Some(Identity {
            user_id: Some(user.id),
            username: user.username,
            role: user.role,
            source: IdentitySource::Directory,
        })
    } else if let Some(user) = state.directory().verify_api_key(username, password).await {
        Some(Identity {
            user_id: Some(user.id),
            username: user.username,
            role: user.role,
            source: IdentitySource::Directory,
        })
    } else {
        state
            .credentials()
            .verify(tier, username, password)
            .await
            .map(|role| Identity {
                user_id: None,
                username: username.to_string(),
                role,
                source: IdentitySource::CredentialFile,
            })
    };

    match identity {
        Some(identity) => {
            state
                .failures()
                .clear_failures(client_ip, Some(username))
                .await;
            Some(identity)
        }
        None => {
            // One uniform event for every cause; never says which.
            debug!(client_ip, "authentication failed");
            state
                .failures()
                .record_failure(client_ip, Some(username))
                .await;
            state.failures().apply_delay(client_ip, Some(username)).await;
            None
        }
    }
}

/// Boundary-scoped middleware: resolves the caller, enforces the boundary's
/// role, and stores the [`Identity`] in request extensions for handlers.
///
/// Boundaries the operator opted out of skip every check and run the handler
/// with no identity attached.
pub async fn guard(
    State((state, boundary)): State<(Arc<AuthState>, Boundary)>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.config().auth_skipped(boundary) {
        return next.run(request).await;
    }

    let resolution = resolve(&state, boundary_tier(boundary), request.headers()).await;
    let stale_cookie = resolution.stale_cookie;

    let mut response = match resolution.identity {
        Some(identity) => match gate::check(Some(&identity), &[boundary.required_role()]) {
            Ok(()) => {
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            Err(denied) => denied.into_response(),
        },
        None => unauthenticated_response(state.config(), request.headers()),
    };

    if stale_cookie {
        if let Ok(cookie) = clear_session_cookie(state.config()) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    response
}

/// Failure presentation: browsers get a redirect to the login page,
/// programmatic callers get a Basic challenge naming the realm.
pub fn unauthenticated_response(config: &AuthConfig, headers: &HeaderMap) -> Response {
    if prefers_html(headers) {
        match HeaderValue::from_str(config.login_path()) {
            Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
            Err(_) => StatusCode::UNAUTHORIZED.into_response(),
        }
    } else {
        let challenge = format!("Basic realm=\"{}\", charset=\"UTF-8\"", config.realm());
        match HeaderValue::from_str(&challenge) {
            Ok(challenge) => {
                (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, challenge)]).into_response()
            }
            Err(_) => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

/// An interactive browser accepts HTML and does not ask for JSON.
#[must_use]
pub fn prefers_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(ACCEPT).and_then(|value| value.to_str().ok()) else {
        return false;
    };
    accept.contains("text/html") && !accept.contains("application/json")
}

/// Build the session cookie: HttpOnly, strict same-site, whole-application
/// path, max-age matching the session TTL.
pub fn session_cookie(
    config: &AuthConfig,
    token: &str,
    ttl_hours: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = ttl_hours * 3600;
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Clear the session cookie with the same attributes it was set with.
pub fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the session token out of the cookie header, if present.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

/// Decode `Authorization: Basic` into a username/password pair.
#[must_use]
pub fn extract_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.trim().strip_prefix("Basic ")?.trim();
    let decoded = BASE64_STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}

/// Client IP for throttling, taken from common proxy headers.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| "unknown".to_string(), str::to_string)
}

const fn boundary_tier(boundary: Boundary) -> Tier {
    match boundary {
        Boundary::General => Tier::General,
        Boundary::Publish => Tier::Publish,
        Boundary::Admin => Tier::Admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credfile::{CredentialFileStore, WatchConfig};
    use crate::auth::directory::UserDirectory;
    use crate::auth::session::SessionStore;
    use crate::auth::throttle::{FailureTracker, ThrottleConfig};
    use std::time::Duration;

    async fn test_state(tmp: &tempfile::TempDir) -> AuthState {
        let htpasswd = tmp.path().join("htpasswd-publish");
        std::fs::write(&htpasswd, "ci-bot:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=\n").expect("write");
        let credentials =
            CredentialFileStore::new(None, Some(htpasswd), None, WatchConfig::default());
        credentials.load_all().await;

        let directory = UserDirectory::load(tmp.path().join("users.json"), 4)
            .await
            .expect("load directory");
        directory
            .create_user("alice", "secret123", Role::Publish)
            .await
            .expect("create user");

        // Zero-length delays keep the failure paths fast in tests.
        let failures = FailureTracker::new(
            ThrottleConfig::default().with_schedule(vec![Duration::ZERO]),
        );

        AuthState::new(
            AuthConfig::new(),
            SessionStore::new(),
            directory,
            credentials,
            failures,
        )
    }

    fn basic(username: &str, password: &str) -> HeaderValue {
        let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).expect("header")
    }

    #[tokio::test]
    async fn valid_session_wins_over_bad_credentials() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = test_state(&tmp).await;
        let session = state
            .sessions()
            .create_session("id-1", "alice", Role::Admin, 1)
            .await
            .expect("session");

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={}", session.token))
                .expect("cookie"),
        );
        headers.insert(AUTHORIZATION, basic("alice", "wrong-password"));

        let resolution = resolve(&state, Tier::General, &headers).await;
        let identity = resolution.identity.expect("authenticated");
        assert_eq!(identity.source, IdentitySource::Session);
        assert_eq!(identity.role, Role::Admin);
        assert!(!resolution.stale_cookie);
        // The session short-circuited; no failure was charged.
        assert_eq!(state.failures().failure_count("unknown", Some("alice")).await, 0);
    }

    #[tokio::test]
    async fn stale_cookie_falls_through_to_credentials() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = test_state(&tmp).await;

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("wharf_session=expired-or-forged"),
        );
        headers.insert(AUTHORIZATION, basic("alice", "secret123"));

        let resolution = resolve(&state, Tier::General, &headers).await;
        let identity = resolution.identity.expect("authenticated");
        assert_eq!(identity.source, IdentitySource::Directory);
        assert!(resolution.stale_cookie);
    }

    #[tokio::test]
    async fn directory_api_key_authenticates() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = test_state(&tmp).await;
        let key = state
            .directory()
            .regenerate_api_key("alice")
            .await
            .expect("rotate")
            .expect("present");

        let identity =
            verify_credentials(&state, Tier::General, "alice", &key, "10.0.0.1").await;
        assert!(identity.is_some());
    }

    #[tokio::test]
    async fn flat_file_users_resolve_with_tier_role() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = test_state(&tmp).await;

        let identity =
            verify_credentials(&state, Tier::General, "ci-bot", "password", "10.0.0.1")
                .await
                .expect("authenticated");
        assert_eq!(identity.source, IdentitySource::CredentialFile);
        assert_eq!(identity.role, Role::Publish);
        assert!(identity.user_id.is_none());
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = test_state(&tmp).await;

        let unknown =
            verify_credentials(&state, Tier::General, "ghost", "whatever", "10.0.0.1").await;
        let wrong =
            verify_credentials(&state, Tier::General, "alice", "not-it", "10.0.0.2").await;
        assert!(unknown.is_none());
        assert!(wrong.is_none());
        // Both causes are charged identically.
        assert_eq!(state.failures().failure_count("10.0.0.1", Some("ghost")).await, 1);
        assert_eq!(state.failures().failure_count("10.0.0.2", Some("alice")).await, 1);
    }

    #[tokio::test]
    async fn success_clears_failure_counters() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = test_state(&tmp).await;

        verify_credentials(&state, Tier::General, "alice", "bad", "10.0.0.1").await;
        verify_credentials(&state, Tier::General, "alice", "bad", "10.0.0.1").await;
        assert_eq!(state.failures().failure_count("10.0.0.1", Some("alice")).await, 2);

        let identity =
            verify_credentials(&state, Tier::General, "alice", "secret123", "10.0.0.1").await;
        assert!(identity.is_some());
        assert_eq!(state.failures().failure_count("10.0.0.1", Some("alice")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_wrong_passwords_earn_growing_delays_until_success() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let directory = UserDirectory::load(tmp.path().join("users.json"), 4)
            .await
            .expect("load directory");
        directory
            .create_user("alice", "secret123", Role::Publish)
            .await
            .expect("create user");
        let state = AuthState::new(
            AuthConfig::new(),
            SessionStore::new(),
            directory,
            CredentialFileStore::new(None, None, None, WatchConfig::default()),
            FailureTracker::new(ThrottleConfig::default()),
        );

        let mut previous = Duration::ZERO;
        let mut last = Duration::ZERO;
        for _ in 0..5 {
            let before = tokio::time::Instant::now();
            let outcome =
                verify_credentials(&state, Tier::General, "alice", "wrong", "10.1.1.1").await;
            assert!(outcome.is_none());
            last = before.elapsed();
            assert!(last >= previous);
            previous = last;
        }
        assert!(last > Duration::from_secs(5));

        // The right password gets through immediately and resets the slate.
        let before = tokio::time::Instant::now();
        let outcome =
            verify_credentials(&state, Tier::General, "alice", "secret123", "10.1.1.1").await;
        assert!(outcome.is_some());
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(state.failures().failure_count("10.1.1.1", Some("alice")).await, 0);
    }

    #[test]
    fn prefers_html_requires_html_without_json() {
        let mut headers = HeaderMap::new();
        assert!(!prefers_html(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        assert!(prefers_html(&headers));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json"),
        );
        assert!(!prefers_html(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!prefers_html(&headers));
    }

    #[test]
    fn basic_credentials_parse_and_reject_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, basic("alice", "p:ss:word"));
        // Only the first colon splits; passwords may contain colons.
        assert_eq!(
            extract_basic_credentials(&headers),
            Some(("alice".to_string(), "p:ss:word".to_string()))
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        assert!(extract_basic_credentials(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic ???"));
        assert!(extract_basic_credentials(&headers).is_none());
    }

    #[test]
    fn cookie_attributes_follow_the_contract() {
        let config = AuthConfig::new().with_cookie_secure(true);
        let cookie = session_cookie(&config, "tok", 24).expect("cookie");
        let value = cookie.to_str().expect("str");
        assert!(value.contains("wharf_session=tok"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("Max-Age=86400"));
        assert!(value.contains("Secure"));

        let clear = clear_session_cookie(&config).expect("clear");
        let value = clear.to_str().expect("str");
        assert!(value.contains("wharf_session=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(value.contains("Secure"));
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_ip(&headers), "1.2.3.4");

        headers.remove("x-forwarded-for");
        assert_eq!(client_ip(&headers), "9.9.9.9");

        headers.remove("x-real-ip");
        assert_eq!(client_ip(&headers), "unknown");
    }
}
