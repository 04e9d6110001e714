//! In-memory session store.
//!
//! Sessions are intentionally volatile: tokens are minted with at least 128
//! bits of entropy, validated with lazy eviction on access, and swept by a
//! periodic background task. The store exclusively owns every record; other
//! components only see clones.

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{RngCore, rngs::OsRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::error::AuthError;
use super::gate::Role;

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
pub const MAX_SESSION_TTL_HOURS: i64 = 7 * 24;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Token-keyed session table behind one reader-writer lock.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a session for `ttl_hours`. The raw token is returned inside the
    /// record so the caller can set the cookie; only the store keeps it
    /// afterwards.
    ///
    /// # Errors
    /// Fails when the system RNG fails or a unique token cannot be minted.
    pub async fn create_session(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
        ttl_hours: i64,
    ) -> Result<Session, AuthError> {
        let mut guard = self.inner.write().await;
        for _ in 0..3 {
            let token = generate_session_token()?;
            if guard.contains_key(&token) {
                continue;
            }
            let now = Utc::now();
            let session = Session {
                token: token.clone(),
                user_id: user_id.to_string(),
                username: username.to_string(),
                role,
                created_at: now,
                expires_at: now + ChronoDuration::hours(ttl_hours),
            };
            guard.insert(token, session.clone());
            debug!(username, ttl_hours, "session created");
            return Ok(session);
        }
        Err(AuthError::Storage(anyhow::anyhow!(
            "failed to mint a unique session token"
        )))
    }

    /// Peek at a session without any expiry side effect. Expired records are
    /// logically absent even before the sweep removes them.
    pub async fn get_session(&self, token: &str) -> Option<Session> {
        let guard = self.inner.read().await;
        let session = guard.get(token)?;
        if session.is_expired(Utc::now()) {
            return None;
        }
        Some(session.clone())
    }

    /// Validate a token, evicting it when expired so expiry is observed
    /// immediately rather than at the next sweep.
    pub async fn validate_session(&self, token: &str) -> Option<Session> {
        let mut guard = self.inner.write().await;
        let session = guard.get(token)?;
        if session.is_expired(Utc::now()) {
            guard.remove(token);
            return None;
        }
        Some(session.clone())
    }

    /// Delete a session. Returns whether a record was removed.
    pub async fn delete_session(&self, token: &str) -> bool {
        self.inner.write().await.remove(token).is_some()
    }

    /// Remove every session belonging to `user_id`, returning the count.
    pub async fn delete_all_user_sessions(&self, user_id: &str) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, session| session.user_id != user_id);
        before - guard.len()
    }

    /// Snapshot of all unexpired sessions.
    pub async fn list_active_sessions(&self) -> Vec<Session> {
        let now = Utc::now();
        self.inner
            .read()
            .await
            .values()
            .filter(|session| !session.is_expired(now))
            .cloned()
            .collect()
    }

    /// Drop every expired record, returning how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired(now));
        let removed = before - guard.len();
        if removed > 0 {
            info!(removed, "expired sessions swept");
        }
        removed
    }

    /// Drop all state. Sessions do not survive a restart.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Start the periodic sweep task. Abort the handle on shutdown.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh store is
            // not swept at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        })
    }
}

/// 32 random bytes, URL-safe base64. The raw value only ever travels to the
/// client cookie.
fn generate_session_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
