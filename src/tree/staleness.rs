//! Staleness policy and clocks
//!
//! A folder is stale when it was never listed or its last listing is older
//! than the configured horizon. The horizon is fixed when the engine is
//! built; time comes from an injected `Clock`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default staleness horizon: one week
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Source of the current time in seconds since the epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

/// Decides when a cached listing must be fetched again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    horizon: Duration,
}

impl StalenessPolicy {
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    /// Whether a listing taken at `last_refreshed_at` is stale at `now`
    pub fn is_stale(&self, last_refreshed_at: i64, now: i64) -> bool {
        last_refreshed_at == 0 || now - last_refreshed_at > self.horizon.as_secs() as i64
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON)
    }
}
