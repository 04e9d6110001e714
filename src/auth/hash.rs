//! Stored-hash parsing and verification for flat-file credentials.
//!
//! Each htpasswd line carries a self-describing hash. The format is decided
//! once at load time and kept as a [`StoredHash`] variant, so verification is
//! a single `match` instead of re-inspecting string prefixes per attempt.
//!
//! Supported families:
//! - `$apr1$salt$digest` — Apache MD5-crypt (the real 1000-round algorithm)
//! - `{SHA}b64digest` — base64-encoded SHA-1 of the password
//! - `$2a$`/`$2b$`/`$2y$` — bcrypt
//! - anything else — plaintext comparison

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use md5::{Digest as _, Md5};
use sha1::Sha1;
use tracing::warn;

const APR1_PREFIX: &str = "$apr1$";
const SHA_PREFIX: &str = "{SHA}";

/// A credential-file hash, parsed into its family at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredHash {
    /// Apache `$apr1$` MD5-crypt: salt plus the 22-character crypt64 digest.
    Apr1 { salt: String, digest: String },
    /// `{SHA}` scheme: base64 of the raw SHA-1 digest.
    Sha1Digest(String),
    /// bcrypt in PHC string form, verified by the `bcrypt` crate.
    Bcrypt(String),
    /// No recognized prefix; compared verbatim.
    Plain(String),
}

impl StoredHash {
    /// Classify a raw hash string by its prefix.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix(APR1_PREFIX) {
            let mut parts = rest.splitn(2, '$');
            let salt = parts.next().unwrap_or_default().to_string();
            let digest = parts.next().unwrap_or_default().to_string();
            return Self::Apr1 { salt, digest };
        }
        if let Some(digest) = raw.strip_prefix(SHA_PREFIX) {
            return Self::Sha1Digest(digest.to_string());
        }
        if is_bcrypt(raw) {
            return Self::Bcrypt(raw.to_string());
        }
        Self::Plain(raw.to_string())
    }

    /// Verify a plaintext password against this stored hash.
    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        match self {
            Self::Apr1 { salt, digest } => {
                !digest.is_empty() && apr1_digest(password.as_bytes(), salt) == *digest
            }
            Self::Sha1Digest(digest) => {
                let computed = BASE64_STANDARD.encode(Sha1::digest(password.as_bytes()));
                computed == *digest
            }
            Self::Bcrypt(hash) => match bcrypt::verify(password, hash) {
                Ok(matched) => matched,
                Err(err) => {
                    warn!("bcrypt verification error: {err}");
                    false
                }
            },
            Self::Plain(stored) => stored == password,
        }
    }

    /// Family name, for logs and diagnostics only.
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Apr1 { .. } => "apr1",
            Self::Sha1Digest(_) => "sha1",
            Self::Bcrypt(_) => "bcrypt",
            Self::Plain(_) => "plain",
        }
    }
}

fn is_bcrypt(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() > 4
        && bytes[0] == b'$'
        && bytes[1] == b'2'
        && matches!(bytes[2], b'a' | b'b' | b'y')
        && bytes[3] == b'$'
}

/// Compute the Apache MD5-crypt digest for `password` under `salt`.
///
/// This is the genuine algorithm from `apr_md5_encode`: an initial context
/// keyed on password/magic/salt, an alternate sum folded in by password
/// length, then 1000 mixing rounds and a crypt64 transposition of the final
/// 16 bytes. Salts longer than 8 characters are truncated like httpd does.
#[must_use]
pub fn apr1_digest(password: &[u8], salt: &str) -> String {
    let salt = &salt.as_bytes()[..salt.len().min(8)];

    let mut ctx = Md5::new();
    ctx.update(password);
    ctx.update(APR1_PREFIX.as_bytes());
    ctx.update(salt);

    let mut alt = Md5::new();
    alt.update(password);
    alt.update(salt);
    alt.update(password);
    let alt_sum = alt.finalize();

    let mut remaining = password.len();
    while remaining > 0 {
        let take = remaining.min(16);
        ctx.update(&alt_sum[..take]);
        remaining -= take;
    }

    let mut bits = password.len();
    while bits > 0 {
        if bits & 1 != 0 {
            ctx.update([0u8]);
        } else {
            ctx.update(&password[..1]);
        }
        bits >>= 1;
    }

    let mut current = ctx.finalize();

    for round in 0..1000 {
        let mut c = Md5::new();
        if round & 1 != 0 {
            c.update(password);
        } else {
            c.update(current);
        }
        if round % 3 != 0 {
            c.update(salt);
        }
        if round % 7 != 0 {
            c.update(password);
        }
        if round & 1 != 0 {
            c.update(current);
        } else {
            c.update(password);
        }
        current = c.finalize();
    }

    let f = current;
    let mut out = String::with_capacity(22);
    crypt64(u32::from(f[0]) << 16 | u32::from(f[6]) << 8 | u32::from(f[12]), 4, &mut out);
    crypt64(u32::from(f[1]) << 16 | u32::from(f[7]) << 8 | u32::from(f[13]), 4, &mut out);
    crypt64(u32::from(f[2]) << 16 | u32::from(f[8]) << 8 | u32::from(f[14]), 4, &mut out);
    crypt64(u32::from(f[3]) << 16 | u32::from(f[9]) << 8 | u32::from(f[15]), 4, &mut out);
    crypt64(u32::from(f[4]) << 16 | u32::from(f[10]) << 8 | u32::from(f[5]), 4, &mut out);
    crypt64(u32::from(f[11]), 2, &mut out);
    out
}

fn crypt64(mut value: u32, chars: usize, out: &mut String) {
    const ITOA64: &[u8; 64] =
        b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    for _ in 0..chars {
        out.push(char::from(ITOA64[(value & 0x3f) as usize]));
        value >>= 6;
    }
}
