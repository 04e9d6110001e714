//! Server action: build every store, start background maintenance, serve.

use crate::{
    api,
    auth::{
        AuthConfig, AuthState, Boundary, CredentialFileStore, FailureTracker, SessionStore,
        ThrottleConfig, UserDirectory, WatchConfig,
    },
};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub users_file: PathBuf,
    pub htpasswd_general: Option<PathBuf>,
    pub htpasswd_publish: Option<PathBuf>,
    pub htpasswd_admin: Option<PathBuf>,
    pub session_ttl_hours: i64,
    pub session_sweep_seconds: u64,
    pub min_password_length: usize,
    pub delay_schedule_seconds: Vec<u64>,
    pub max_delay_seconds: u64,
    pub failure_reset_seconds: u64,
    pub failure_cleanup_seconds: u64,
    pub skip_auth: Vec<Boundary>,
    pub cookie_secure: bool,
    pub realm: String,
    pub login_path: String,
    pub watch_poll_millis: u64,
    pub watch_debounce_millis: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the user directory cannot be loaded or the server
/// fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let directory = UserDirectory::load(args.users_file, args.min_password_length).await?;

    let watch = WatchConfig::default()
        .with_poll_interval(Duration::from_millis(args.watch_poll_millis))
        .with_debounce(Duration::from_millis(args.watch_debounce_millis));
    let credentials = CredentialFileStore::new(
        args.htpasswd_general,
        args.htpasswd_publish,
        args.htpasswd_admin,
        watch,
    );
    credentials.load_all().await;
    let mut background = credentials.spawn_watchers();

    let sessions = SessionStore::new();
    background.push(sessions.spawn_sweeper(Duration::from_secs(args.session_sweep_seconds)));

    let throttle = ThrottleConfig::default()
        .with_schedule(
            args.delay_schedule_seconds
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        )
        .with_max_delay(Duration::from_secs(args.max_delay_seconds))
        .with_reset_window(Duration::from_secs(args.failure_reset_seconds));
    let failures = FailureTracker::new(throttle);
    background.push(failures.spawn_cleanup(Duration::from_secs(args.failure_cleanup_seconds)));

    let mut config = AuthConfig::new()
        .with_realm(args.realm)
        .with_login_path(args.login_path)
        .with_session_ttl_hours(args.session_ttl_hours)
        .with_cookie_secure(args.cookie_secure);
    for boundary in args.skip_auth {
        config = config.with_skip_auth(boundary, true);
    }

    let state = Arc::new(AuthState::new(
        config,
        sessions.clone(),
        directory,
        credentials,
        failures,
    ));

    let result = api::serve(args.port, state).await;

    // Stop background maintenance and drop the volatile sessions.
    for handle in background {
        handle.abort();
    }
    sessions.clear().await;

    result
}
