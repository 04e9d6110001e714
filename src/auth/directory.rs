//! JSON-persisted user directory with independent password and API-key
//! verification paths.
//!
//! The whole record set lives in one pretty-printed JSON array so operators
//! can read and back it up directly. Every mutation runs under one exclusive
//! lock spanning validation, the in-memory update and the write-back;
//! mutations are applied to a scratch copy and only committed to memory after
//! the write succeeds, so a failed save leaves memory consistent with the
//! last durable state.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::error::AuthError;
use super::gate::Role;

pub const DEFAULT_MIN_PASSWORD_LEN: usize = 4;

/// A directory record. Hash and salt fields are persisted but never exposed
/// through API responses; handlers project records into summary types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    password_hash: String,
    password_salt: String,
    api_key_hash: String,
    api_key_salt: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User store backed by a single JSON file.
#[derive(Clone)]
pub struct UserDirectory {
    inner: Arc<Mutex<BTreeMap<String, User>>>,
    path: PathBuf,
    min_password_len: usize,
}

impl UserDirectory {
    /// Load the directory from `path`, starting empty when the file does not
    /// exist yet.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn load(path: PathBuf, min_password_len: usize) -> Result<Self> {
        let users: Vec<User> = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("invalid users file {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read users file {}", path.display()));
            }
        };
        info!(users = users.len(), path = %path.display(), "user directory loaded");
        let map = users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        Ok(Self {
            inner: Arc::new(Mutex::new(map)),
            path,
            min_password_len,
        })
    }

    /// Create a user and return the record plus the one-time plaintext API
    /// key. The key is never stored and cannot be recovered later.
    ///
    /// # Errors
    /// Validation failures, a duplicate username, or a failed write-back.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(User, String), AuthError> {
        validate_username(username)?;
        if password.len() < self.min_password_len {
            return Err(AuthError::validation(format!(
                "password must be at least {} characters",
                self.min_password_len
            )));
        }

        let mut guard = self.inner.lock().await;
        if guard.contains_key(username) {
            return Err(AuthError::Conflict);
        }

        let api_key = generate_api_key()?;
        let password_salt = generate_salt()?;
        let api_key_salt = generate_salt()?;
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: salted_digest(&password_salt, password),
            password_salt,
            api_key_hash: salted_digest(&api_key_salt, &api_key),
            api_key_salt,
            role,
            created_at: now,
            updated_at: now,
        };

        let mut scratch = guard.clone();
        scratch.insert(username.to_string(), user.clone());
        self.persist(&scratch).await?;
        *guard = scratch;
        info!(username, role = %role, "user created");
        Ok((user, api_key))
    }

    pub async fn get_user(&self, username: &str) -> Option<User> {
        self.inner.lock().await.get(username).cloned()
    }

    /// All records, ordered by username.
    pub async fn list_users(&self) -> Vec<User> {
        self.inner.lock().await.values().cloned().collect()
    }

    /// Change a user's role. Returns the updated record, or `None` for an
    /// unknown username.
    ///
    /// # Errors
    /// Fails only when the write-back fails.
    pub async fn update_user(
        &self,
        username: &str,
        role: Role,
    ) -> Result<Option<User>, AuthError> {
        let mut guard = self.inner.lock().await;
        if !guard.contains_key(username) {
            return Ok(None);
        }
        let mut scratch = guard.clone();
        let user = scratch
            .get_mut(username)
            .ok_or_else(|| AuthError::Storage(anyhow!("user vanished during update")))?;
        user.role = role;
        user.updated_at = Utc::now();
        let updated = user.clone();
        self.persist(&scratch).await?;
        *guard = scratch;
        info!(username, role = %role, "user role updated");
        Ok(Some(updated))
    }

    /// Remove a user. Returns whether a record was deleted. Session cleanup
    /// for the deleted id is the caller's job.
    ///
    /// # Errors
    /// Fails only when the write-back fails.
    pub async fn delete_user(&self, username: &str) -> Result<bool, AuthError> {
        let mut guard = self.inner.lock().await;
        if !guard.contains_key(username) {
            return Ok(false);
        }
        let mut scratch = guard.clone();
        scratch.remove(username);
        self.persist(&scratch).await?;
        *guard = scratch;
        info!(username, "user deleted");
        Ok(true)
    }

    /// Rotate a user's API key, immediately invalidating the previous one.
    /// Returns the new one-time plaintext key, or `None` for an unknown
    /// username.
    ///
    /// # Errors
    /// Fails only when the write-back fails.
    pub async fn regenerate_api_key(&self, username: &str) -> Result<Option<String>, AuthError> {
        let mut guard = self.inner.lock().await;
        if !guard.contains_key(username) {
            return Ok(None);
        }
        let api_key = generate_api_key()?;
        let api_key_salt = generate_salt()?;
        let mut scratch = guard.clone();
        let user = scratch
            .get_mut(username)
            .ok_or_else(|| AuthError::Storage(anyhow!("user vanished during key rotation")))?;
        user.api_key_hash = salted_digest(&api_key_salt, &api_key);
        user.api_key_salt = api_key_salt;
        user.updated_at = Utc::now();
        self.persist(&scratch).await?;
        *guard = scratch;
        info!(username, "api key regenerated");
        Ok(Some(api_key))
    }

    /// Interactive login path: verify a password.
    pub async fn verify_password(&self, username: &str, password: &str) -> Option<User> {
        let guard = self.inner.lock().await;
        let user = guard.get(username)?;
        if salted_digest(&user.password_salt, password) == user.password_hash {
            Some(user.clone())
        } else {
            None
        }
    }

    /// Programmatic path: verify an API key.
    pub async fn verify_api_key(&self, username: &str, api_key: &str) -> Option<User> {
        let guard = self.inner.lock().await;
        let user = guard.get(username)?;
        if salted_digest(&user.api_key_salt, api_key) == user.api_key_hash {
            Some(user.clone())
        } else {
            None
        }
    }

    async fn persist(&self, users: &BTreeMap<String, User>) -> Result<(), AuthError> {
        let records: Vec<&User> = users.values().collect();
        let json = serde_json::to_string_pretty(&records)
            .context("failed to serialize user directory")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write users file {}", self.path.display()))?;
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let valid = Regex::new(r"^[A-Za-z0-9._-]{1,50}$")
        .is_ok_and(|regex| regex.is_match(username));
    if valid {
        Ok(())
    } else {
        Err(AuthError::validation(
            "username must be 1-50 characters of letters, digits, '.', '_' or '-'",
        ))
    }
}

/// SHA-256 over `salt || secret`, base64-encoded. Password and API key each
/// carry their own salt so rotating one reveals nothing about the other.
fn salted_digest(salt_b64: &str, secret: &str) -> String {
    let salt = BASE64_STANDARD.decode(salt_b64).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&salt);
    hasher.update(secret.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

fn generate_salt() -> Result<String, AuthError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate salt")?;
    Ok(BASE64_STANDARD.encode(bytes))
}

fn generate_api_key() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate api key")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
