//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_EVENT_BUNDLE_TTL_SECS: u64 = 3600;
const DEFAULT_SESSION_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

/// Cache knobs from the `[cache]` section of `pollcast.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long an event bundle stays valid after it was fetched.
    pub event_bundle_ttl_secs: u64,
    /// How long a confirmed session id is trusted before re-validation.
    pub session_ttl_secs: u64,
    /// Cadence of the background sweep that drops expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_bundle_ttl_secs: DEFAULT_EVENT_BUNDLE_TTL_SECS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn event_bundle_ttl(&self) -> Duration {
        Duration::from_secs(self.event_bundle_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Sweep interval, clamped to at least one second so a zeroed config
    /// cannot spin the sweeper.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
