use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{limiter_period, ConfigError, LimiterConfig};
use crate::error::ApiError;
use crate::state::AppState;

struct Client {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

/// Token bucket per client IP. Buckets unseen for `idle_ttl` are dropped by
/// the sweeper.
pub struct RateLimiter {
    enabled: bool,
    quota: Quota,
    idle_ttl: Duration,
    clients: Mutex<HashMap<IpAddr, Client>>,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Result<Self, ConfigError> {
        let period = limiter_period(config.rps).ok_or(ConfigError::InvalidLimiterRate(config.rps))?;
        let burst = NonZeroU32::new(config.burst).ok_or(ConfigError::InvalidLimiterBurst)?;
        let quota = Quota::with_period(period)
            .ok_or(ConfigError::InvalidLimiterRate(config.rps))?
            .allow_burst(burst);

        Ok(Self {
            enabled: config.enabled,
            quota,
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, Client>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take one cell from the client's bucket. False when it is empty.
    pub fn check(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = self.clients();
        let client = clients.entry(ip).or_insert_with(|| Client {
            limiter: governor::RateLimiter::direct(self.quota),
            last_seen: Instant::now(),
        });
        client.last_seen = Instant::now();
        client.limiter.check().is_ok()
    }

    /// Drop clients idle since before `now - idle_ttl`. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= self.idle_ttl);
        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodic eviction. The task holds only a weak handle and exits once
    /// the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let evicted = limiter.sweep(Instant::now());
                if evicted > 0 {
                    debug!(evicted, remaining = limiter.len(), "Swept idle rate limiter clients");
                }
            }
            debug!("Rate limiter sweeper stopped");
        })
    }
}

/// First layer in the chain. Over-quota clients never reach authentication.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limiter = &state.limiter;
    if !limiter.enabled() {
        return Ok(next.run(request).await);
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or_else(|| ApiError::internal("peer address unavailable for rate limiting"))?;

    if !limiter.check(ip) {
        debug!(%ip, "Rate limit exceeded");
        return Err(ApiError::rate_limit_exceeded());
    }

    Ok(next.run(request).await)
}
