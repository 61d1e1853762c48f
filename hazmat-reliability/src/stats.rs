//! Per-operation reliability statistics.
//!
//! Counters are monotone and the mean duration is a running mean, so memory
//! per operation is constant regardless of call volume.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hazmat_core::{elapsed_between, system_clock, FallbackSettings, SharedClock};
use serde::{Deserialize, Serialize};

/// Thresholds for [`ReliabilityStats::is_operation_reliable`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReliabilityConfig {
    /// Minimum success rate to count as reliable.
    pub threshold: f64,
    /// Below this many calls an operation is presumed reliable.
    pub min_calls: u64,
    /// A failure this recent marks the operation unreliable.
    pub recent_failure_window: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            min_calls: 10,
            recent_failure_window: Duration::from_secs(5 * 60),
        }
    }
}

impl From<&FallbackSettings> for ReliabilityConfig {
    fn from(settings: &FallbackSettings) -> Self {
        Self {
            threshold: settings.reliability_threshold,
            min_calls: settings.reliability_min_calls,
            recent_failure_window: settings.recent_failure_window(),
        }
    }
}

/// Outcome counters for one named operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Running mean call duration in milliseconds.
    pub average_duration_ms: f64,
    pub last_failure: Option<DateTime<Utc>>,
}

impl OperationStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }

    pub fn average_duration(&self) -> Duration {
        Duration::from_secs_f64(self.average_duration_ms.max(0.0) / 1000.0)
    }

    fn record(&mut self, success: bool, duration: Duration, now: DateTime<Utc>) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
            self.last_failure = Some(now);
        }
        let sample = duration.as_secs_f64() * 1000.0;
        self.average_duration_ms += (sample - self.average_duration_ms) / self.total_calls as f64;
    }
}

/// Statistics tracker shared by every breaker and fallback chain.
pub struct ReliabilityStats {
    operations: RwLock<HashMap<String, OperationStats>>,
    config: ReliabilityConfig,
    clock: SharedClock,
}

impl ReliabilityStats {
    pub fn new(config: ReliabilityConfig, clock: SharedClock) -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReliabilityConfig::default(), system_clock())
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    pub fn record_success(&self, operation: &str, duration: Duration) {
        self.record(operation, true, duration);
    }

    pub fn record_failure(&self, operation: &str, duration: Duration) {
        self.record(operation, false, duration);
    }

    fn record(&self, operation: &str, success: bool, duration: Duration) {
        let now = self.clock.now();
        let mut operations = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        operations
            .entry(operation.to_string())
            .or_default()
            .record(success, duration, now);
    }

    /// Stats for one operation, created lazily on its first recorded call.
    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .cloned()
    }

    /// Snapshot of every tracked operation.
    pub fn all_stats(&self) -> BTreeMap<String, OperationStats> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect()
    }

    /// Reliability check with the configured threshold.
    pub fn is_operation_reliable(&self, operation: &str) -> bool {
        self.is_operation_reliable_with(operation, self.config.threshold)
    }

    /// An operation with fewer than `min_calls` calls is presumed reliable.
    /// Otherwise it must meet `threshold` and have no failure inside the
    /// recent-failure window.
    pub fn is_operation_reliable_with(&self, operation: &str, threshold: f64) -> bool {
        let Some(stats) = self.operation_stats(operation) else {
            return true;
        };
        if stats.total_calls < self.config.min_calls {
            return true;
        }
        if let Some(last) = stats.last_failure {
            if elapsed_between(last, self.clock.now()) < self.config.recent_failure_window {
                return false;
            }
        }
        stats.success_rate() >= threshold
    }
}

impl std::fmt::Debug for ReliabilityStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliabilityStats")
            .field("operations", &self.all_stats().len())
            .field("config", &self.config)
            .finish()
    }
}
