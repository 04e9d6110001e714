//! Role model and authorization gate.
//!
//! Roles form a strict hierarchy (`admin > publish > read`); a caller's role
//! satisfies a requirement if it equals or dominates it. The gate also
//! distinguishes "nobody authenticated" (401) from "authenticated but
//! insufficient" (403).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::error::AuthError;
use super::resolver::Identity;

/// Privilege level of a user. Declaration order drives the hierarchy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Read,
    Publish,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Publish => "publish",
            Self::Admin => "admin",
        }
    }

    /// True when this role equals or dominates `required`.
    #[must_use]
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "publish" => Ok(Self::Publish),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::validation(format!(
                "unknown role '{other}', expected read, publish or admin"
            ))),
        }
    }
}

/// Logical endpoint class. Each boundary requires one role and can be
/// configured by the operator to skip authentication entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    General,
    Publish,
    Admin,
}

impl Boundary {
    #[must_use]
    pub fn required_role(self) -> Role {
        match self {
            Self::General => Role::Read,
            Self::Publish => Role::Publish,
            Self::Admin => Role::Admin,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Publish => "publish",
            Self::Admin => "admin",
        }
    }
}

/// Decide whether `identity` may cross a boundary requiring any of `required`.
///
/// # Errors
/// `Unauthenticated` when no identity is present, `Forbidden` when the
/// identity's role dominates none of the required roles.
pub fn check(identity: Option<&Identity>, required: &[Role]) -> Result<(), AuthError> {
    let Some(identity) = identity else {
        return Err(AuthError::Unauthenticated);
    };
    if required.iter().any(|role| identity.role.satisfies(*role)) {
        return Ok(());
    }
    let lowest = required.iter().min().copied().unwrap_or(Role::Admin);
    Err(AuthError::Forbidden {
        required: lowest.as_str(),
    })
}
