//! Circuit breakers for hazard sources.
//!
//! A breaker is a pure function of counters and the injected clock; there is
//! no background thread. After `failure_threshold` consecutive failures the
//! circuit opens and every call fails fast without invoking the operation.
//! Once `reset_timeout` has passed since the last failure, the next call
//! becomes a single probe: success closes the circuit, failure reopens it and
//! restarts the window.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hazmat_core::{
    elapsed_between, system_clock, BreakerSettings, CircuitState, HazmatResult, SharedClock,
    SourceError,
};

use crate::stats::ReliabilityStats;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(DEFAULT_RESET_TIMEOUT_SECS),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create CircuitBreakerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `HAZMAT_CIRCUIT_FAILURE_THRESHOLD`: Number of failures before opening (default: 5)
    /// - `HAZMAT_CIRCUIT_RESET_TIMEOUT_SECS`: How long circuit stays open (default: 60)
    pub fn from_env() -> Self {
        let failure_threshold = std::env::var("HAZMAT_CIRCUIT_FAILURE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAILURE_THRESHOLD);

        let reset_timeout = Duration::from_secs(
            std::env::var("HAZMAT_CIRCUIT_RESET_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RESET_TIMEOUT_SECS),
        );

        Self {
            failure_threshold,
            reset_timeout,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            reset_timeout: settings.reset_timeout(),
        }
    }
}

// ============================================================================
// CIRCUIT BREAKER
// ============================================================================

/// Circuit breaker guarding one named operation.
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    failure_count: AtomicU32,
    probe_in_flight: AtomicBool,
    last_failure: RwLock<Option<DateTime<Utc>>>,
    config: CircuitBreakerConfig,
    clock: SharedClock,
}

/// Clears the probe flag when the probe finishes or its future is dropped.
struct ProbeGuard<'a>(&'a AtomicBool);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            probe_in_flight: AtomicBool::new(false),
            last_failure: RwLock::new(None),
            config,
            clock,
        }
    }

    /// Breaker with default config and system time.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default(), system_clock())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        *self
            .last_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reset_window_elapsed(&self) -> bool {
        match self.last_failure() {
            Some(last) => elapsed_between(last, self.clock.now()) > self.config.reset_timeout,
            None => true,
        }
    }

    fn claim_probe(&self) -> bool {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Decide whether a call may proceed. Returns `Some(is_probe)` when allowed.
    fn admit(&self) -> Option<bool> {
        match self.state() {
            CircuitState::Closed => Some(false),
            CircuitState::Open => {
                if self.reset_window_elapsed() && self.claim_probe() {
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.state
                        .store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                    tracing::debug!(operation = %self.name, "Circuit half-open, allowing probe");
                    Some(true)
                } else {
                    None
                }
            }
            // a previous probe was cancelled before it reported back
            CircuitState::HalfOpen => self.claim_probe().then_some(true),
        }
    }

    /// Whether a call right now would be allowed through.
    ///
    /// This does not claim the probe slot.
    pub fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => self.reset_window_elapsed(),
            CircuitState::HalfOpen => !self.probe_in_flight.load(Ordering::SeqCst),
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        let previous = self.state.swap(CircuitState::Closed as u8, Ordering::SeqCst);
        if CircuitState::from(previous) != CircuitState::Closed {
            tracing::info!(operation = %self.name, "Circuit closed");
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut guard) = self.last_failure.write() {
            *guard = Some(self.clock.now());
        }

        match self.state() {
            CircuitState::HalfOpen => {
                self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
                tracing::info!(operation = %self.name, "Probe failed, circuit reopened");
            }
            CircuitState::Open => {}
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
                    tracing::info!(
                        operation = %self.name,
                        failures = count,
                        reset_timeout_secs = self.config.reset_timeout.as_secs(),
                        "Circuit opened"
                    );
                }
            }
        }
    }

    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.probe_in_flight.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_failure.write() {
            *guard = None;
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// When the circuit is open the operation is not invoked and a
    /// [`SourceError::CircuitOpen`] is returned. Any error from the operation
    /// counts as a failure.
    pub async fn call<T, F, Fut>(&self, operation: F) -> HazmatResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HazmatResult<T>>,
    {
        let Some(is_probe) = self.admit() else {
            return Err(SourceError::CircuitOpen {
                operation: self.name.clone(),
            }
            .into());
        };
        let _probe = is_probe.then(|| ProbeGuard(&self.probe_in_flight));

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// One breaker per operation name, shared for the life of the process.
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
    clock: SharedClock,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default(), system_clock())
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `name`, created with the registry config on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Install a breaker for `name` with its own config, replacing any existing one.
    pub fn install(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, config, self.clock.clone()));
        self.breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), breaker.clone());
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Current state of every breaker, keyed by operation name.
    pub fn breaker_states(&self) -> BTreeMap<String, CircuitState> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    pub fn reset_all(&self) {
        for breaker in self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            breaker.reset();
        }
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.breaker_states())
            .finish()
    }
}

// ============================================================================
// GUARDED OPERATION
// ============================================================================

type OperationFn<T> = Arc<dyn Fn() -> BoxFuture<'static, HazmatResult<T>> + Send + Sync>;

/// An operation permanently bound to a breaker, and optionally to statistics.
pub struct GuardedOperation<T> {
    breaker: Arc<CircuitBreaker>,
    stats: Option<Arc<ReliabilityStats>>,
    operation: OperationFn<T>,
}

impl<T> Clone for GuardedOperation<T> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            stats: self.stats.clone(),
            operation: self.operation.clone(),
        }
    }
}

impl<T: Send + 'static> GuardedOperation<T> {
    pub fn new<F, Fut>(breaker: Arc<CircuitBreaker>, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HazmatResult<T>> + Send + 'static,
    {
        Self {
            breaker,
            stats: None,
            operation: Arc::new(move || operation().boxed()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<ReliabilityStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn call(&self) -> HazmatResult<T> {
        let started = Instant::now();
        let result = self.breaker.call(|| (self.operation)()).await;
        if let Some(stats) = &self.stats {
            match &result {
                Err(e) if e.is_circuit_open() => {}
                Ok(_) => stats.record_success(self.breaker.name(), started.elapsed()),
                Err(_) => stats.record_failure(self.breaker.name(), started.elapsed()),
            }
        }
        result
    }
}

// ============================================================================
// TESTS
// ============================================================================
