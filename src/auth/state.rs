//! Auth configuration and the state aggregate handed to handlers.

use super::credfile::CredentialFileStore;
use super::directory::UserDirectory;
use super::gate::Boundary;
use super::session::{DEFAULT_SESSION_TTL_HOURS, SessionStore};
use super::throttle::FailureTracker;

pub const REMEMBER_ME_TTL_HOURS: i64 = 7 * 24;

const DEFAULT_REALM: &str = "wharf";
const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    realm: String,
    login_path: String,
    session_ttl_hours: i64,
    cookie_secure: bool,
    skip_general: bool,
    skip_publish: bool,
    skip_admin: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            cookie_secure: false,
            skip_general: false,
            skip_publish: false,
            skip_admin: false,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_realm(mut self, realm: String) -> Self {
        self.realm = realm;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, login_path: String) -> Self {
        self.login_path = login_path;
        self
    }

    #[must_use]
    pub fn with_session_ttl_hours(mut self, hours: i64) -> Self {
        self.session_ttl_hours = hours;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_skip_auth(mut self, boundary: Boundary, skip: bool) -> Self {
        match boundary {
            Boundary::General => self.skip_general = skip,
            Boundary::Publish => self.skip_publish = skip,
            Boundary::Admin => self.skip_admin = skip,
        }
        self
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn session_ttl_hours(&self) -> i64 {
        self.session_ttl_hours
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// Operator opt-out: when set, the boundary performs no session or
    /// credential checks and treats every caller as anonymous-but-permitted.
    #[must_use]
    pub fn auth_skipped(&self, boundary: Boundary) -> bool {
        match boundary {
            Boundary::General => self.skip_general,
            Boundary::Publish => self.skip_publish,
            Boundary::Admin => self.skip_admin,
        }
    }
}

/// Everything the auth subsystem owns, injected at startup. Each store is
/// owned here exactly once; handlers receive this aggregate by `Extension`.
pub struct AuthState {
    config: AuthConfig,
    sessions: SessionStore,
    directory: UserDirectory,
    credentials: CredentialFileStore,
    failures: FailureTracker,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        sessions: SessionStore,
        directory: UserDirectory,
        credentials: CredentialFileStore,
        failures: FailureTracker,
    ) -> Self {
        Self {
            config,
            sessions,
            directory,
            credentials,
            failures,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialFileStore {
        &self.credentials
    }

    #[must_use]
    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(config.realm(), "wharf");
        assert_eq!(config.login_path(), "/login");
        assert_eq!(config.session_ttl_hours(), DEFAULT_SESSION_TTL_HOURS);
        assert!(!config.cookie_secure());
        assert!(!config.auth_skipped(Boundary::General));

        let config = config
            .with_realm("registry".to_string())
            .with_login_path("/ui/login".to_string())
            .with_session_ttl_hours(2)
            .with_cookie_secure(true)
            .with_skip_auth(Boundary::Publish, true);
        assert_eq!(config.realm(), "registry");
        assert_eq!(config.login_path(), "/ui/login");
        assert_eq!(config.session_ttl_hours(), 2);
        assert!(config.cookie_secure());
        assert!(config.auth_skipped(Boundary::Publish));
        assert!(!config.auth_skipped(Boundary::Admin));
    }
}
