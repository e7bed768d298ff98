use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use shared::types::server_config::LimiterConfig;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Tunables for `RateLimiter`, normally built from the `[limiter]` config
/// section.
#[derive(Debug, Clone, Copy)]
pub struct LimiterSettings {
    /// When false every request is admitted and nothing is tracked.
    pub enabled: bool,
    /// Tokens added per second.
    pub requests_per_second: f64,
    /// Maximum tokens in a bucket.
    pub burst: u32,
    /// How often the janitor runs.
    pub sweep_interval: Duration,
    /// Clients idle for longer than this are forgotten.
    pub stale_after: Duration,
}

impl From<&LimiterConfig> for LimiterSettings {
    fn from(cfg: &LimiterConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            requests_per_second: cfg.rps,
            burst: cfg.burst,
            sweep_interval: cfg.sweep_interval(),
            stale_after: cfg.stale_after(),
        }
    }
}

/// Token bucket rate limiter keyed by client.
///
/// Every client gets a bucket holding up to `burst` tokens that refills at
/// `requests_per_second`. A background janitor (see [`RateLimiter::start`])
/// drops clients that have gone quiet so the registry cannot grow without
/// bound.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

#[derive(Debug)]
struct RateLimiterInner {
    clients: Mutex<HashMap<String, ClientState>>,
    settings: LimiterSettings,
    shutdown: watch::Sender<bool>,
    janitor: StdMutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone)]
struct ClientState {
    bucket: TokenBucket,
    /// Updated on every decision, admitted or not.
    last_seen: Instant,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn take(&mut self, refill_rate: f64, capacity: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    /// Create a limiter without a janitor. Idle clients are only removed by
    /// explicit `evict_idle` calls.
    pub fn new(settings: LimiterSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(RateLimiterInner {
                clients: Mutex::new(HashMap::new()),
                settings,
                shutdown,
                janitor: StdMutex::new(None),
            }),
        }
    }

    /// Create a limiter and spawn its janitor on the current runtime.
    pub fn start(settings: LimiterSettings) -> Self {
        let limiter = Self::new(settings);
        if settings.enabled {
            limiter.spawn_janitor();
        }
        limiter
    }

    fn spawn_janitor(&self) {
        let period = self.inner.settings.sweep_interval;
        let weak: Weak<RateLimiterInner> = Arc::downgrade(&self.inner);
        let mut stop = self.inner.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // The janitor must not keep the registry alive.
                        let Some(inner) = weak.upgrade() else { break };
                        let evicted = RateLimiter { inner }.evict_idle().await;
                        if evicted > 0 {
                            debug!("Rate limiter janitor evicted {} idle clients", evicted);
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Rate limiter janitor stopped");
        });

        *self
            .inner
            .janitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Decide whether the client identified by `key` may proceed, consuming
    /// one token if so.
    pub async fn admit(&self, key: &str) -> bool {
        let settings = &self.inner.settings;
        if !settings.enabled {
            return true;
        }

        let capacity = f64::from(settings.burst);
        let now = Instant::now();
        let mut clients = self.inner.clients.lock().await;

        match clients.get_mut(key) {
            Some(client) => {
                client.last_seen = now;
                client.bucket.take(settings.requests_per_second, capacity, now)
            }
            None => {
                let mut bucket = TokenBucket::full(capacity, now);
                let admitted = bucket.take(settings.requests_per_second, capacity, now);
                clients.insert(
                    key.to_string(),
                    ClientState {
                        bucket,
                        last_seen: now,
                    },
                );
                admitted
            }
        }
    }

    /// Remove clients not seen for longer than `stale_after`, returning how
    /// many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let stale_after = self.inner.settings.stale_after;
        let now = Instant::now();
        let mut clients = self.inner.clients.lock().await;

        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= stale_after);
        before - clients.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.settings.enabled
    }

    pub async fn len(&self) -> usize {
        self.inner.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get current rate limiter statistics
    pub async fn stats(&self) -> RateLimiterStats {
        let clients = self.inner.clients.lock().await;
        let settings = &self.inner.settings;

        RateLimiterStats {
            enabled: settings.enabled,
            tracked_clients: clients.len(),
            exhausted_clients: clients.values().filter(|c| c.bucket.tokens < 1.0).count(),
            burst: settings.burst,
            requests_per_second: settings.requests_per_second,
        }
    }

    /// Stop the janitor and wait for it to finish. Safe to call more than
    /// once.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let handle = self
            .inner
            .janitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Rate limiter janitor ended abnormally: {}", e);
            } else {
                info!("Rate limiter janitor shut down");
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub tracked_clients: usize,
    pub exhausted_clients: usize,
    pub burst: u32,
    pub requests_per_second: f64,
}
