//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action, such
//! as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{
    ARG_HTPASSWD_ADMIN, ARG_HTPASSWD_GENERAL, ARG_HTPASSWD_PUBLISH, ARG_PORT, ARG_USERS_FILE,
    auth,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let users_file = matches
        .get_one::<PathBuf>(ARG_USERS_FILE)
        .cloned()
        .context("missing required argument: --users-file")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        users_file,
        htpasswd_general: matches.get_one::<PathBuf>(ARG_HTPASSWD_GENERAL).cloned(),
        htpasswd_publish: matches.get_one::<PathBuf>(ARG_HTPASSWD_PUBLISH).cloned(),
        htpasswd_admin: matches.get_one::<PathBuf>(ARG_HTPASSWD_ADMIN).cloned(),
        session_ttl_hours: auth_opts.session_ttl_hours,
        session_sweep_seconds: auth_opts.session_sweep_seconds,
        min_password_length: auth_opts.min_password_length,
        delay_schedule_seconds: auth_opts.delay_schedule_seconds,
        max_delay_seconds: auth_opts.max_delay_seconds,
        failure_reset_seconds: auth_opts.failure_reset_seconds,
        failure_cleanup_seconds: auth_opts.failure_cleanup_seconds,
        skip_auth: auth_opts.skip_auth,
        cookie_secure: auth_opts.cookie_secure,
        realm: auth_opts.realm,
        login_path: auth_opts.login_path,
        watch_poll_millis: auth_opts.watch_poll_millis,
        watch_debounce_millis: auth_opts.watch_debounce_millis,
    }))
}
