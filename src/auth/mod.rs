//! Authentication & session subsystem.
//!
//! Every store here is owned exactly once and injected through [`AuthState`];
//! requests cross one of three boundaries (`general`, `publish`, `admin`)
//! guarded by [`resolver::guard`], which accepts either a session cookie or
//! embedded Basic credentials and enforces the role hierarchy
//! `admin > publish > read`.
//!
//! Durability: the three htpasswd tier files and the users JSON file are the
//! source of truth; everything in memory rebuilds from them except sessions,
//! which are intentionally volatile.

pub mod credfile;
pub mod directory;
pub mod error;
pub mod gate;
pub mod hash;
pub mod resolver;
pub mod session;
pub mod state;
pub mod throttle;

pub use credfile::{CredentialFileStore, Tier, WatchConfig};
pub use directory::{DEFAULT_MIN_PASSWORD_LEN, UserDirectory};
pub use error::AuthError;
pub use gate::{Boundary, Role};
pub use resolver::{Identity, SESSION_COOKIE_NAME};
pub use session::{DEFAULT_SESSION_TTL_HOURS, DEFAULT_SWEEP_INTERVAL, SessionStore};
pub use state::{AuthConfig, AuthState, REMEMBER_ME_TTL_HOURS};
pub use throttle::{DEFAULT_CLEANUP_INTERVAL, FailureTracker, ThrottleConfig};
