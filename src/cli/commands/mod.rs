pub mod auth;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

pub const ARG_PORT: &str = "port";
pub const ARG_USERS_FILE: &str = "users-file";
pub const ARG_HTPASSWD_GENERAL: &str = "htpasswd-general";
pub const ARG_HTPASSWD_PUBLISH: &str = "htpasswd-publish";
pub const ARG_HTPASSWD_ADMIN: &str = "htpasswd-admin";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("wharf")
        .about("Package registry with hybrid authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("WHARF_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_USERS_FILE)
                .short('u')
                .long(ARG_USERS_FILE)
                .help("Path of the JSON user directory")
                .env("WHARF_USERS_FILE")
                .default_value("users.json")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_HTPASSWD_GENERAL)
                .long(ARG_HTPASSWD_GENERAL)
                .help("htpasswd file for the general (read) tier")
                .env("WHARF_HTPASSWD_GENERAL")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_HTPASSWD_PUBLISH)
                .long(ARG_HTPASSWD_PUBLISH)
                .help("htpasswd file for the publish tier")
                .env("WHARF_HTPASSWD_PUBLISH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_HTPASSWD_ADMIN)
                .long(ARG_HTPASSWD_ADMIN)
                .help("htpasswd file for the admin tier")
                .env("WHARF_HTPASSWD_ADMIN")
                .value_parser(clap::value_parser!(PathBuf)),
        );

    let command = auth::with_args(command);
    logging::with_args(command)
}
