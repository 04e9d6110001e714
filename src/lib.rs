//! # Wharf (Package Registry Auth Core)
//!
//! `wharf` is the authentication and session core of a package registry. It
//! decides who every inbound request is and what that caller may do, while
//! the package protocol surfaces (metadata, content, search, publish) mount
//! on top of it as separate layers.
//!
//! ## Credential Sources
//!
//! Two sources are consulted, in order:
//!
//! - **User directory:** a JSON file of administrative records, each with a
//!   salted password hash and an independently salted API-key hash.
//! - **htpasswd tiers:** three flat files (`general`, `publish`, `admin`)
//!   supporting Apache `$apr1$`, `{SHA}`, bcrypt and plaintext entries,
//!   hot-reloaded when they change on disk. A user in a higher tier is
//!   implicitly valid in every lower one.
//!
//! ## Hybrid Authentication
//!
//! Endpoints accept either a session cookie or embedded Basic credentials on
//! the same request; a valid session always wins. Failed attempts are
//! throttled with a progressive delay keyed by client IP and username, and
//! unknown-user versus wrong-password outcomes are deliberately
//! indistinguishable to block account enumeration.
//!
//! ## Authorization
//!
//! Roles form the hierarchy `admin > publish > read`. Each route group sits
//! behind one of three boundaries that an operator can individually opt out
//! of authenticating.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
