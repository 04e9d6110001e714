//! Auth tuning arguments: sessions, throttling, boundaries and cookies.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command, builder::ValueParser};

use crate::auth::gate::Boundary;

pub const ARG_SESSION_TTL_HOURS: &str = "session-ttl-hours";
pub const ARG_SESSION_SWEEP_SECONDS: &str = "session-sweep-seconds";
pub const ARG_MIN_PASSWORD_LENGTH: &str = "min-password-length";
pub const ARG_DELAY_SCHEDULE: &str = "delay-schedule";
pub const ARG_MAX_DELAY_SECONDS: &str = "max-delay-seconds";
pub const ARG_FAILURE_RESET_SECONDS: &str = "failure-reset-seconds";
pub const ARG_FAILURE_CLEANUP_SECONDS: &str = "failure-cleanup-seconds";
pub const ARG_SKIP_AUTH: &str = "skip-auth";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_REALM: &str = "realm";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_WATCH_POLL_MILLIS: &str = "credfile-poll-millis";
pub const ARG_WATCH_DEBOUNCE_MILLIS: &str = "credfile-debounce-millis";

/// Validate a comma-separated list of whole seconds.
#[must_use]
pub fn validator_delay_schedule() -> ValueParser {
    ValueParser::from(
        move |schedule: &str| -> std::result::Result<String, String> {
            if schedule.trim().is_empty() {
                return Err("delay schedule must not be empty".to_string());
            }
            for step in schedule.split(',') {
                step.trim()
                    .parse::<u64>()
                    .map_err(|_| format!("invalid delay step: {step}"))?;
            }
            Ok(schedule.to_string())
        },
    )
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_HOURS)
                .long(ARG_SESSION_TTL_HOURS)
                .help("Session TTL in hours (remember-me logins get 168)")
                .env("WHARF_SESSION_TTL_HOURS")
                .default_value("24")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_SWEEP_SECONDS)
                .long(ARG_SESSION_SWEEP_SECONDS)
                .help("Interval between expired-session sweeps in seconds")
                .env("WHARF_SESSION_SWEEP_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MIN_PASSWORD_LENGTH)
                .long(ARG_MIN_PASSWORD_LENGTH)
                .help("Minimum password length for directory users")
                .env("WHARF_MIN_PASSWORD_LENGTH")
                .default_value("4")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_DELAY_SCHEDULE)
                .long(ARG_DELAY_SCHEDULE)
                .help("Comma-separated failure delay schedule in seconds")
                .env("WHARF_DELAY_SCHEDULE")
                .default_value("1,2,3,5,10")
                .value_parser(validator_delay_schedule()),
        )
        .arg(
            Arg::new(ARG_MAX_DELAY_SECONDS)
                .long(ARG_MAX_DELAY_SECONDS)
                .help("Cap for any single failure delay in seconds")
                .env("WHARF_MAX_DELAY_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FAILURE_RESET_SECONDS)
                .long(ARG_FAILURE_RESET_SECONDS)
                .help("Window after which failure counters are forgotten")
                .env("WHARF_FAILURE_RESET_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FAILURE_CLEANUP_SECONDS)
                .long(ARG_FAILURE_CLEANUP_SECONDS)
                .help("Interval between stale failure-counter purges")
                .env("WHARF_FAILURE_CLEANUP_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SKIP_AUTH)
                .long(ARG_SKIP_AUTH)
                .help("Disable authentication for a boundary (repeatable)")
                .env("WHARF_SKIP_AUTH")
                .action(ArgAction::Append)
                .value_parser(["general", "publish", "admin"]),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (HTTPS-only)")
                .env("WHARF_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_REALM)
                .long(ARG_REALM)
                .help("Realm advertised in Basic challenges")
                .env("WHARF_REALM")
                .default_value("wharf"),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Interactive login entry point for browser redirects")
                .env("WHARF_LOGIN_PATH")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_WATCH_POLL_MILLIS)
                .long(ARG_WATCH_POLL_MILLIS)
                .help("Credential file change-poll interval in milliseconds")
                .env("WHARF_CREDFILE_POLL_MILLIS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_WATCH_DEBOUNCE_MILLIS)
                .long(ARG_WATCH_DEBOUNCE_MILLIS)
                .help("Window for coalescing rapid credential file writes")
                .env("WHARF_CREDFILE_DEBOUNCE_MILLIS")
                .default_value("500")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
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

impl Options {
    /// Collect the auth options out of parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or malformed.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let schedule = matches
            .get_one::<String>(ARG_DELAY_SCHEDULE)
            .context("missing delay schedule")?;
        let delay_schedule_seconds = schedule
            .split(',')
            .map(|step| {
                step.trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid delay step: {step}"))
            })
            .collect::<Result<Vec<u64>>>()?;

        let skip_auth = matches
            .get_many::<String>(ARG_SKIP_AUTH)
            .unwrap_or_default()
            .map(|value| match value.as_str() {
                "general" => Ok(Boundary::General),
                "publish" => Ok(Boundary::Publish),
                "admin" => Ok(Boundary::Admin),
                other => Err(anyhow::anyhow!("unknown boundary: {other}")),
            })
            .collect::<Result<Vec<Boundary>>>()?;

        Ok(Self {
            session_ttl_hours: matches
                .get_one::<i64>(ARG_SESSION_TTL_HOURS)
                .copied()
                .context("missing session TTL")?,
            session_sweep_seconds: matches
                .get_one::<u64>(ARG_SESSION_SWEEP_SECONDS)
                .copied()
                .context("missing sweep interval")?,
            min_password_length: matches
                .get_one::<usize>(ARG_MIN_PASSWORD_LENGTH)
                .copied()
                .context("missing minimum password length")?,
            delay_schedule_seconds,
            max_delay_seconds: matches
                .get_one::<u64>(ARG_MAX_DELAY_SECONDS)
                .copied()
                .context("missing max delay")?,
            failure_reset_seconds: matches
                .get_one::<u64>(ARG_FAILURE_RESET_SECONDS)
                .copied()
                .context("missing failure reset window")?,
            failure_cleanup_seconds: matches
                .get_one::<u64>(ARG_FAILURE_CLEANUP_SECONDS)
                .copied()
                .context("missing failure cleanup interval")?,
            skip_auth,
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            realm: matches
                .get_one::<String>(ARG_REALM)
                .cloned()
                .context("missing realm")?,
            login_path: matches
                .get_one::<String>(ARG_LOGIN_PATH)
                .cloned()
                .context("missing login path")?,
            watch_poll_millis: matches
                .get_one::<u64>(ARG_WATCH_POLL_MILLIS)
                .copied()
                .context("missing credential poll interval")?,
            watch_debounce_millis: matches
                .get_one::<u64>(ARG_WATCH_DEBOUNCE_MILLIS)
                .copied()
                .context("missing credential debounce window")?,
        })
    }
}
