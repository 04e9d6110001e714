//! Progressive-delay throttling for failed authentication attempts.
//!
//! Failures are counted per client IP and per attempted username; the delay
//! applied before responding uses the larger of the two counters, so
//! rotating usernames from one address or rotating addresses against one
//! account is throttled either way. Counters older than the reset window are
//! treated as absent on read and purged by a periodic cleanup, keeping the
//! hot path free of deletions and the table bounded under noise traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const DEFAULT_DELAY_SCHEDULE_SECS: [u64; 5] = [1, 2, 3, 5, 10];
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_RESET_WINDOW: Duration = Duration::from_secs(60 * 60);
const DEFAULT_MAX_ENTRIES: usize = 10_000;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Tuning for the failure tracker.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    schedule: Vec<Duration>,
    max_delay: Duration,
    reset_window: Duration,
    max_entries: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_DELAY_SCHEDULE_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            max_delay: DEFAULT_MAX_DELAY,
            reset_window: DEFAULT_RESET_WINDOW,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl ThrottleConfig {
    #[must_use]
    pub fn with_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_reset_window(mut self, reset_window: Duration) -> Self {
        self.reset_window = reset_window;
        self
    }

    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    first_attempt: Instant,
    last_attempt: Instant,
}

#[derive(Default)]
struct Tables {
    by_ip: HashMap<String, Counter>,
    by_user: HashMap<String, Counter>,
}

/// Failure counters plus the delay schedule derived from them.
#[derive(Clone)]
pub struct FailureTracker {
    tables: Arc<RwLock<Tables>>,
    config: Arc<ThrottleConfig>,
}

impl FailureTracker {
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            config: Arc::new(config),
        }
    }

    /// Record one failed attempt for the IP and, when known, the username.
    pub async fn record_failure(&self, client_ip: &str, username: Option<&str>) {
        let now = Instant::now();
        let mut tables = self.tables.write().await;
        bump(&mut tables.by_ip, client_ip, now, &self.config);
        if let Some(username) = username {
            bump(&mut tables.by_user, username, now, &self.config);
        }
    }

    /// The effective failure count: the maximum of the IP and username
    /// counters, ignoring anything past the reset window.
    pub async fn failure_count(&self, client_ip: &str, username: Option<&str>) -> u32 {
        let now = Instant::now();
        let tables = self.tables.read().await;
        let ip_count = fresh_count(tables.by_ip.get(client_ip), now, self.config.reset_window);
        let user_count = username
            .map(|username| {
                fresh_count(tables.by_user.get(username), now, self.config.reset_window)
            })
            .unwrap_or(0);
        ip_count.max(user_count)
    }

    /// Delay prescribed for the given consecutive-failure count.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 || self.config.schedule.is_empty() {
            return Duration::ZERO;
        }
        let index = ((failures - 1) as usize).min(self.config.schedule.len() - 1);
        self.config.schedule[index].min(self.config.max_delay)
    }

    /// Suspend the caller for the delay earned by past failures, returning
    /// the delay that was applied. The sleep holds no locks, and dropping
    /// the future (request cancellation) costs nothing.
    pub async fn apply_delay(&self, client_ip: &str, username: Option<&str>) -> Duration {
        let delay = self.delay_for(self.failure_count(client_ip, username).await);
        if !delay.is_zero() {
            debug!(client_ip, delay_ms = delay.as_millis() as u64, "throttling response");
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Forget both counters after a successful authentication.
    pub async fn clear_failures(&self, client_ip: &str, username: Option<&str>) {
        let mut tables = self.tables.write().await;
        tables.by_ip.remove(client_ip);
        if let Some(username) = username {
            tables.by_user.remove(username);
        }
    }

    /// Drop counters whose last activity exceeds the reset window.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let window = self.config.reset_window;
        let mut tables = self.tables.write().await;
        let before = tables.by_ip.len() + tables.by_user.len();
        tables
            .by_ip
            .retain(|_, counter| now.saturating_duration_since(counter.last_attempt) <= window);
        tables
            .by_user
            .retain(|_, counter| now.saturating_duration_since(counter.last_attempt) <= window);
        let removed = before - (tables.by_ip.len() + tables.by_user.len());
        if removed > 0 {
            info!(removed, "stale failure counters purged");
        }
        removed
    }

    /// Start the periodic cleanup task. Abort the handle on shutdown.
    #[must_use]
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.cleanup().await;
            }
        })
    }

    #[cfg(test)]
    async fn table_sizes(&self) -> (usize, usize) {
        let tables = self.tables.read().await;
        (tables.by_ip.len(), tables.by_user.len())
    }
}

fn fresh_count(counter: Option<&Counter>, now: Instant, window: Duration) -> u32 {
    match counter {
        Some(counter) if now.saturating_duration_since(counter.last_attempt) <= window => {
            counter.count
        }
        _ => 0,
    }
}

fn bump(map: &mut HashMap<String, Counter>, key: &str, now: Instant, config: &ThrottleConfig) {
    if let Some(counter) = map.get_mut(key) {
        if now.saturating_duration_since(counter.last_attempt) > config.reset_window {
            counter.count = 1;
            counter.first_attempt = now;
        } else {
            counter.count = counter.count.saturating_add(1);
        }
        counter.last_attempt = now;
        return;
    }

    if map.len() >= config.max_entries {
        // Bound the table: drop stale entries first, then the least recent
        // one if noise traffic filled it with fresh counters.
        map.retain(|_, counter| {
            now.saturating_duration_since(counter.last_attempt) <= config.reset_window
        });
        if map.len() >= config.max_entries {
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, counter)| counter.last_attempt)
                .map(|(key, _)| key.clone())
            {
                map.remove(&oldest);
            }
        }
    }

    map.insert(
        key.to_string(),
        Counter {
            count: 1,
            first_attempt: now,
            last_attempt: now,
        },
    );
}
