//! Sliding-window rate limiting keyed by client identity.
//!
//! Each identity keeps the instants of its admitted requests inside the
//! trailing window. Every check prunes instants older than the window first,
//! so the quota always covers exactly the last `window` milliseconds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::clock::{duration_millis, now_millis};
use crate::models::{QuotaDecision, RateLimitStatus};


/// Prefix namespacing the stricter quota for upstream-calling routes.
pub const WEATHER_API_PREFIX: &str = "weather_";

/// Identity used when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct RateLimiter {
    window_ms: i64,
    general_limit: u32,
    weather_api_limit: u32,
    windows: Arc<Mutex<HashMap<String, Vec<i64>>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, general_limit: u32, weather_api_limit: u32) -> Self {
        Self {
            window_ms: duration_millis(window),
            general_limit,
            weather_api_limit,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn general_limit(&self) -> u32 {
        self.general_limit
    }

    pub fn weather_api_limit(&self) -> u32 {
        self.weather_api_limit
    }

    /// Prunes the identity's window, then admits and records the request if
    /// it is under `limit`. A rejected request is not recorded.
    pub async fn check_and_record(
        &self,
        identity: &str,
        limit: u32,
        window_ms: i64,
        now: i64,
    ) -> QuotaDecision {
        let mut windows = self.windows.lock().await;
        let timestamps = windows.entry(identity.to_string()).or_default();
        prune(timestamps, now, window_ms);

        if let Some(decision) = rejection(timestamps, limit, window_ms, now) {
            return decision;
        }

        timestamps.push(now);
        QuotaDecision {
            limited: false,
            remaining: remaining(limit, timestamps.len()),
            reset_time: now.saturating_add(window_ms),
        }
    }

    /// Reports what `check_and_record` would decide without recording anything.
    pub async fn peek(&self, identity: &str, limit: u32, window_ms: i64, now: i64) -> QuotaDecision {
        let mut windows = self.windows.lock().await;
        let Some(timestamps) = windows.get_mut(identity) else {
            return QuotaDecision {
                limited: false,
                remaining: limit,
                reset_time: now.saturating_add(window_ms),
            };
        };
        prune(timestamps, now, window_ms);

        rejection(timestamps, limit, window_ms, now).unwrap_or(QuotaDecision {
            limited: false,
            remaining: remaining(limit, timestamps.len()),
            reset_time: now.saturating_add(window_ms),
        })
    }

    pub async fn check_general(&self, client: &str, now: i64) -> QuotaDecision {
        self.check_and_record(client, self.general_limit, self.window_ms, now)
            .await
    }

    pub async fn check_weather_api(&self, client: &str, now: i64) -> QuotaDecision {
        self.check_and_record(
            &weather_identity(client),
            self.weather_api_limit,
            self.window_ms,
            now,
        )
        .await
    }

    pub async fn status(&self, client: &str, now: i64) -> RateLimitStatus {
        let general = self
            .peek(client, self.general_limit, self.window_ms, now)
            .await;
        let weather_api = self
            .peek(
                &weather_identity(client),
                self.weather_api_limit,
                self.window_ms,
                now,
            )
            .await;
        RateLimitStatus {
            general: general.into(),
            weather_api: weather_api.into(),
        }
    }

    /// Prunes every identity and forgets those left empty. Returns how many
    /// identities were removed.
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(now_millis()).await
    }

    pub async fn cleanup_at(&self, now: i64) -> usize {
        let window_ms = self.window_ms;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, timestamps| {
            prune(timestamps, now, window_ms);
            !timestamps.is_empty()
        });
        before - windows.len()
    }

    pub async fn tracked_identities(&self) -> usize {
        self.windows.lock().await.len()
    }
}

pub fn weather_identity(client: &str) -> String {
    format!("{WEATHER_API_PREFIX}{client}")
}

fn prune(timestamps: &mut Vec<i64>, now: i64, window_ms: i64) {
    let window_start = now.saturating_sub(window_ms);
    timestamps.retain(|&t| t > window_start);
}

fn rejection(timestamps: &[i64], limit: u32, window_ms: i64, now: i64) -> Option<QuotaDecision> {
    if timestamps.len() < limit as usize {
        return None;
    }
    // The oldest surviving request is the next one to leave the window.
    let oldest = timestamps.iter().copied().min().unwrap_or(now);
    Some(QuotaDecision {
        limited: true,
        remaining: 0,
        reset_time: oldest.saturating_add(window_ms),
    })
}

fn remaining(limit: u32, used: usize) -> u32 {
    limit.saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
}
