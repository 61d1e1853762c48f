//! Injectable time source.
//!
//! TTL expiry, breaker reset windows, failure recency and assessment expiry
//! all read time through [`Clock`] so tests can drive time deterministically.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let delta =
            ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::days(365 * 100));
        if let Ok(mut guard) = self.now.write() {
            *guard += delta;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Default shared clock backed by system time.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Elapsed std duration between two instants, saturating at zero.
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    later
        .signed_duration_since(earlier)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
