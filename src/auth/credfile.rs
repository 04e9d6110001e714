//! Flat-file credential tiers with hot reload and privilege inheritance.
//!
//! Three htpasswd-style files back the `general`, `publish` and `admin`
//! tiers. A missing file simply disables its tier; the watcher keeps probing
//! so creating the file later enables it without a restart. Higher tiers are
//! implicitly valid members of the lower ones, and win username collisions.
//!
//! Watching is a pair of tasks per configured tier: a poller samples file
//! metadata on a fixed interval and pushes a notification per observed
//! change, and a reload task drains the channel, coalescing notifications
//! that arrive within the debounce window into a single reload.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::gate::Role;
use super::hash::StoredHash;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Credential tier, lowest to highest privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    General,
    Publish,
    Admin,
}

pub const TIERS: [Tier; 3] = [Tier::General, Tier::Publish, Tier::Admin];

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Publish => "publish",
            Self::Admin => "admin",
        }
    }

    /// Role granted to users found in this tier's file.
    #[must_use]
    pub fn role(self) -> Role {
        match self {
            Self::General => Role::Read,
            Self::Publish => Role::Publish,
            Self::Admin => Role::Admin,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::General => 0,
            Self::Publish => 1,
            Self::Admin => 2,
        }
    }
}

/// Poll and debounce tuning for the file watchers.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    poll_interval: Duration,
    debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Three-tier credential store backed by htpasswd-style files.
#[derive(Clone)]
pub struct CredentialFileStore {
    inner: std::sync::Arc<Inner>,
}

struct Inner {
    paths: [Option<PathBuf>; 3],
    maps: [RwLock<HashMap<String, StoredHash>>; 3],
    watch: WatchConfig,
}

impl CredentialFileStore {
    #[must_use]
    pub fn new(
        general: Option<PathBuf>,
        publish: Option<PathBuf>,
        admin: Option<PathBuf>,
        watch: WatchConfig,
    ) -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                paths: [general, publish, admin],
                maps: [
                    RwLock::new(HashMap::new()),
                    RwLock::new(HashMap::new()),
                    RwLock::new(HashMap::new()),
                ],
                watch,
            }),
        }
    }

    /// Load every configured tier once. Missing files are not errors.
    pub async fn load_all(&self) {
        for tier in TIERS {
            if let Err(err) = self.reload(tier).await {
                error!(tier = tier.as_str(), "credential file load failed: {err:#}");
            }
        }
    }

    /// Re-read one tier's file and swap the in-memory map.
    ///
    /// A missing file clears the tier and returns `Ok(0)`. Malformed lines
    /// are skipped. An existing-but-unreadable file is an error and leaves
    /// the previous view intact.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read.
    pub async fn reload(&self, tier: Tier) -> Result<usize> {
        let Some(path) = &self.inner.paths[tier.index()] else {
            return Ok(0);
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let entries = parse_credentials(&content);
                let count = entries.len();
                *self.inner.maps[tier.index()].write().await = entries;
                info!(
                    tier = tier.as_str(),
                    users = count,
                    "credential file loaded"
                );
                Ok(count)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.inner.maps[tier.index()].write().await.clear();
                info!(
                    tier = tier.as_str(),
                    "credential file absent, tier disabled"
                );
                Ok(0)
            }
            Err(err) => Err(err).with_context(|| {
                format!("failed to read credential file {}", path.display())
            }),
        }
    }

    /// Find `username` in the combined view for `tier`.
    ///
    /// Tiers are probed highest first, so a user present in several files
    /// resolves to the highest tier's hash and role.
    pub async fn lookup(&self, tier: Tier, username: &str) -> Option<(StoredHash, Role)> {
        for candidate in TIERS.iter().rev() {
            if *candidate < tier {
                break;
            }
            let map = self.inner.maps[candidate.index()].read().await;
            if let Some(hash) = map.get(username) {
                return Some((hash.clone(), candidate.role()));
            }
        }
        None
    }

    /// Verify a password against the combined view for `tier`.
    ///
    /// Returns the effective role on success.
    pub async fn verify(&self, tier: Tier, username: &str, password: &str) -> Option<Role> {
        let (hash, role) = self.lookup(tier, username).await?;
        if hash.verify(password) {
            debug!(
                username,
                family = hash.family(),
                "credential file password accepted"
            );
            Some(role)
        } else {
            None
        }
    }

    /// Materialize the combined map for `tier`: the tier's own entries plus
    /// every higher tier, with higher tiers winning collisions.
    pub async fn combined_view(&self, tier: Tier) -> HashMap<String, StoredHash> {
        let mut combined = HashMap::new();
        for candidate in TIERS {
            if candidate < tier {
                continue;
            }
            let map = self.inner.maps[candidate.index()].read().await;
            for (username, hash) in map.iter() {
                combined.insert(username.clone(), hash.clone());
            }
        }
        combined
    }

    /// Spawn the watcher/reload task pair for every configured tier.
    #[must_use]
    pub fn spawn_watchers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for tier in TIERS {
            let Some(path) = self.inner.paths[tier.index()].clone() else {
                continue;
            };
            let (tx, rx) = mpsc::channel::<()>(8);
            handles.push(tokio::spawn(watch_file(
                path,
                self.inner.watch.poll_interval,
                tx,
            )));
            handles.push(tokio::spawn(reload_on_change(
                self.clone(),
                tier,
                self.inner.watch.debounce,
                rx,
            )));
        }
        handles
    }
}

/// Parse `username:hash` lines, dropping anything malformed.
fn parse_credentials(content: &str) -> HashMap<String, StoredHash> {
    let mut entries = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        let Some((username, hash)) = line.split_once(':') else {
            continue;
        };
        if username.is_empty() || hash.is_empty() {
            continue;
        }
        entries.insert(username.to_string(), StoredHash::parse(hash));
    }
    entries
}

/// Metadata fingerprint used to detect file changes, including appearance
/// and disappearance.
async fn fingerprint(path: &std::path::Path) -> Option<(SystemTime, u64)> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    Some((mtime, meta.len()))
}

async fn watch_file(path: PathBuf, poll_interval: Duration, tx: mpsc::Sender<()>) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last = fingerprint(&path).await;
    loop {
        interval.tick().await;
        let current = fingerprint(&path).await;
        if current != last {
            last = current;
            if tx.send(()).await.is_err() {
                return;
            }
        }
    }
}

async fn reload_on_change(
    store: CredentialFileStore,
    tier: Tier,
    debounce: Duration,
    mut rx: mpsc::Receiver<()>,
) {
    while rx.recv().await.is_some() {
        // Coalesce the burst of notifications a rapid series of writes
        // produces into one reload.
        tokio::time::sleep(debounce).await;
        while rx.try_recv().is_ok() {}
        if let Err(err) = store.reload(tier).await {
            error!(tier = tier.as_str(), "credential reload failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash::apr1_digest;
    use std::time::Instant;

    fn store_with_files(
        general: Option<&std::path::Path>,
        publish: Option<&std::path::Path>,
        admin: Option<&std::path::Path>,
    ) -> CredentialFileStore {
        CredentialFileStore::new(
            general.map(std::path::Path::to_path_buf),
            publish.map(std::path::Path::to_path_buf),
            admin.map(std::path::Path::to_path_buf),
            WatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn load_skips_malformed_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("htpasswd-general");
        std::fs::write(
            &path,
            "alice:secret\nno-colon-line\n:missinguser\nmissinghash:\nbob:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=\n",
        )
        .expect("write");

        let store = store_with_files(Some(&path), None, None);
        let loaded = store.reload(Tier::General).await.expect("reload");
        assert_eq!(loaded, 2);
        assert!(store.verify(Tier::General, "alice", "secret").await.is_some());
        assert!(store.verify(Tier::General, "bob", "password").await.is_some());
    }

    #[tokio::test]
    async fn missing_file_disables_tier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_with_files(Some(&dir.path().join("nope")), None, None);
        assert_eq!(store.reload(Tier::General).await.expect("reload"), 0);
        assert!(store.lookup(Tier::General, "anyone").await.is_none());
    }

    #[tokio::test]
    async fn admin_users_inherit_into_lower_tiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = dir.path().join("htpasswd-admin");
        std::fs::write(&admin, "root:toor\n").expect("write");

        let store = store_with_files(None, None, Some(&admin));
        store.load_all().await;

        for tier in TIERS {
            let view = store.combined_view(tier).await;
            assert!(view.contains_key("root"), "missing in {}", tier.as_str());
        }
        let (_, role) = store.lookup(Tier::General, "root").await.expect("lookup");
        assert_eq!(role, Role::Admin);
    }

    #[tokio::test]
    async fn higher_tier_wins_username_collisions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let general = dir.path().join("htpasswd-general");
        let admin = dir.path().join("htpasswd-admin");
        std::fs::write(&general, "carol:generalpw\n").expect("write");
        std::fs::write(&admin, "carol:adminpw\n").expect("write");

        let store = store_with_files(Some(&general), None, Some(&admin));
        store.load_all().await;

        assert_eq!(
            store.verify(Tier::General, "carol", "adminpw").await,
            Some(Role::Admin)
        );
        assert!(store.verify(Tier::General, "carol", "generalpw").await.is_none());

        let view = store.combined_view(Tier::General).await;
        assert_eq!(view.get("carol"), Some(&StoredHash::Plain("adminpw".into())));
    }

    #[tokio::test]
    async fn publish_view_excludes_general_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let general = dir.path().join("htpasswd-general");
        let publish = dir.path().join("htpasswd-publish");
        std::fs::write(&general, "reader:pw\n").expect("write");
        std::fs::write(&publish, "pusher:pw\n").expect("write");

        let store = store_with_files(Some(&general), Some(&publish), None);
        store.load_all().await;

        let view = store.combined_view(Tier::Publish).await;
        assert!(view.contains_key("pusher"));
        assert!(!view.contains_key("reader"));
    }

    #[tokio::test]
    async fn apr1_entries_verify_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("htpasswd-publish");
        let digest = apr1_digest(b"deploy-me", "saltsalt");
        std::fs::write(&path, format!("ci:$apr1$saltsalt${digest}\n")).expect("write");

        let store = store_with_files(None, Some(&path), None);
        store.load_all().await;
        assert_eq!(
            store.verify(Tier::Publish, "ci", "deploy-me").await,
            Some(Role::Publish)
        );
        assert!(store.verify(Tier::Publish, "ci", "deploy-you").await.is_none());
    }

    #[tokio::test]
    async fn delete_and_recreate_round_trips_without_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("htpasswd-admin");
        std::fs::write(&path, "root:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=\n").expect("write");

        let store = store_with_files(None, None, Some(&path));
        store.load_all().await;
        assert!(!store.combined_view(Tier::Admin).await.is_empty());

        std::fs::remove_file(&path).expect("remove");
        store.reload(Tier::Admin).await.expect("reload after delete");
        assert!(store.combined_view(Tier::Admin).await.is_empty());

        std::fs::write(&path, "root:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=\n").expect("rewrite");
        store.reload(Tier::Admin).await.expect("reload after recreate");
        assert_eq!(
            store.verify(Tier::Admin, "root", "password").await,
            Some(Role::Admin)
        );
    }

    #[tokio::test]
    async fn watcher_picks_up_edits_deletes_and_recreation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("htpasswd-general");
        std::fs::write(&path, "alice:secret\n").expect("write");

        let store = CredentialFileStore::new(
            Some(path.clone()),
            None,
            None,
            WatchConfig::default()
                .with_poll_interval(Duration::from_millis(20))
                .with_debounce(Duration::from_millis(40)),
        );
        store.load_all().await;
        let handles = store.spawn_watchers();

        std::fs::write(&path, "alice:secret\nbob:hunter2-with-longer-line\n").expect("edit");
        wait_until(&store, |view| view.contains_key("bob")).await;

        std::fs::remove_file(&path).expect("remove");
        wait_until(&store, |view| view.is_empty()).await;

        std::fs::write(&path, "carol:pw\n").expect("recreate");
        wait_until(&store, |view| view.contains_key("carol")).await;

        for handle in handles {
            handle.abort();
        }
    }

    async fn wait_until(
        store: &CredentialFileStore,
        predicate: impl Fn(&HashMap<String, StoredHash>) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let view = store.combined_view(Tier::General).await;
            if predicate(&view) {
                return;
            }
            assert!(Instant::now() < deadline, "watcher did not converge");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
