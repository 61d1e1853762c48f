//! Fallback orchestration across ranked sources.
//!
//! Sources are tried by descending confidence (sequential) or all at once
//! (parallel). Every attempt runs through the source's circuit breaker and is
//! recorded in the statistics tracker. When nothing usable comes back the
//! caller gets the context's conservative safe default, never an error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use hazmat_core::{
    manual_review_warning, FallbackContext, FallbackError, FallbackSettings, HazmatConfig,
    HazmatError, HazmatResult, SafeDefault, SharedClock, SourceError, SAFE_DEFAULT_CONFIDENCE,
};

use crate::breaker::{BreakerRegistry, CircuitBreakerConfig, GuardedOperation};
use crate::stats::{ReliabilityConfig, ReliabilityStats};

pub type OperationFuture<T> = BoxFuture<'static, HazmatResult<T>>;
type OperationFn<T> = Arc<dyn Fn() -> OperationFuture<T> + Send + Sync>;

// ============================================================================
// OPERATIONS AND RESULTS
// ============================================================================

/// A named source with a static trust weight.
pub struct FallbackOperation<T> {
    name: String,
    confidence: f64,
    operation: OperationFn<T>,
    guarded: bool,
}

impl<T> Clone for FallbackOperation<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            confidence: self.confidence,
            operation: self.operation.clone(),
            guarded: self.guarded,
        }
    }
}

impl<T> std::fmt::Debug for FallbackOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOperation")
            .field("name", &self.name)
            .field("confidence", &self.confidence)
            .field("guarded", &self.guarded)
            .finish()
    }
}

impl<T: Send + 'static> FallbackOperation<T> {
    /// `confidence` is clamped to `0.0..=1.0`.
    pub fn new<F, Fut>(name: impl Into<String>, confidence: f64, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HazmatResult<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            confidence: clamp_confidence(confidence),
            operation: Arc::new(move || operation().boxed()),
            guarded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn invoke(&self) -> OperationFuture<T> {
        (self.operation)()
    }

    /// Whether the breaker and stats already sit inside this operation.
    /// The orchestrator runs guarded operations as they are.
    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    pub(crate) fn mark_guarded(mut self) -> Self {
        self.guarded = true;
        self
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub error: HazmatError,
}

/// A successful value tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub source: String,
    pub confidence: f64,
    pub value: T,
}

/// Outcome of a fallback chain.
///
/// When `success` is false, `data` holds a conservative safe default (or an
/// empty set for parallel runs) and `warning` is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResult<T> {
    pub success: bool,
    pub data: T,
    pub source: Option<String>,
    pub confidence: f64,
    pub errors: Vec<SourceFailure>,
    pub warning: Option<String>,
}

impl<T> FallbackResult<T> {
    pub fn into_data(self) -> T {
        self.data
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FallbackResult<U> {
        FallbackResult {
            success: self.success,
            data: f(self.data),
            source: self.source,
            confidence: self.confidence,
            errors: self.errors,
            warning: self.warning,
        }
    }
}

/// Per-call orchestration options.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOptions {
    /// Bound on each individual attempt; a timed-out attempt counts as a failure.
    pub timeout: Option<Duration>,
    /// Fraction of parallel sources that must succeed.
    pub min_success_rate: f64,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            min_success_rate: 0.5,
        }
    }
}

impl FallbackOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = clamp_confidence(rate);
        self
    }
}

impl From<&FallbackSettings> for FallbackOptions {
    fn from(settings: &FallbackSettings) -> Self {
        Self {
            timeout: settings.attempt_timeout(),
            min_success_rate: settings.min_success_rate,
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Runs fallback chains over shared breakers and statistics.
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    stats: Arc<ReliabilityStats>,
    breakers: Arc<BreakerRegistry>,
    options: FallbackOptions,
}

impl FallbackOrchestrator {
    pub fn new(
        stats: Arc<ReliabilityStats>,
        breakers: Arc<BreakerRegistry>,
        options: FallbackOptions,
    ) -> Self {
        Self {
            stats,
            breakers,
            options,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(ReliabilityStats::with_defaults()),
            Arc::new(BreakerRegistry::with_defaults()),
            FallbackOptions::default(),
        )
    }

    /// Build from the breaker and fallback sections of a config.
    pub fn from_config(config: &HazmatConfig, clock: SharedClock) -> Self {
        Self::new(
            Arc::new(ReliabilityStats::new(
                ReliabilityConfig::from(&config.fallback),
                clock.clone(),
            )),
            Arc::new(BreakerRegistry::new(
                CircuitBreakerConfig::from(&config.breaker),
                clock,
            )),
            FallbackOptions::from(&config.fallback),
        )
    }

    pub fn stats(&self) -> &Arc<ReliabilityStats> {
        &self.stats
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Default options used when callers do not pass their own.
    pub fn options(&self) -> &FallbackOptions {
        &self.options
    }

    /// Move the breaker, timeout and stats inside `operation`.
    ///
    /// Wrappers added afterwards (a cache, typically) run in front of the
    /// breaker, so a cache hit neither consults nor moves it.
    pub fn guard<T: Send + 'static>(
        &self,
        operation: FallbackOperation<T>,
        timeout: Option<Duration>,
    ) -> FallbackOperation<T> {
        let breakers = self.breakers.clone();
        let stats = self.stats.clone();
        let name = operation.name.clone();
        let confidence = operation.confidence;

        FallbackOperation::new(name, confidence, move || {
            let breakers = breakers.clone();
            let stats = stats.clone();
            let operation = operation.clone();
            async move { run_guarded(&breakers, &stats, &operation, timeout).await }
        })
        .mark_guarded()
    }

    async fn attempt<T: Send + 'static>(
        &self,
        operation: &FallbackOperation<T>,
        timeout: Option<Duration>,
    ) -> HazmatResult<T> {
        if operation.guarded {
            return operation.invoke().await;
        }
        run_guarded(&self.breakers, &self.stats, operation, timeout).await
    }

    /// Try operations by descending confidence until one succeeds.
    ///
    /// If every operation fails, the result carries `T::safe_default`,
    /// confidence 0.1 and a warning demanding manual review.
    pub async fn execute_with_fallback<T>(
        &self,
        mut operations: Vec<FallbackOperation<T>>,
        context: &FallbackContext,
        opts: &FallbackOptions,
    ) -> FallbackResult<T>
    where
        T: SafeDefault + Send + 'static,
    {
        let mut ranked: Vec<(bool, FallbackOperation<T>)> = operations
            .drain(..)
            .map(|op| (self.stats.is_operation_reliable(&op.name), op))
            .collect();
        // equal confidence: reliable sources first
        ranked.sort_by(|(ra, a), (rb, b)| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| rb.cmp(ra))
        });
        operations.extend(ranked.into_iter().map(|(_, op)| op));
        let mut errors = Vec::new();

        for operation in &operations {
            match self.attempt(operation, opts.timeout).await {
                Ok(data) => {
                    return FallbackResult {
                        success: true,
                        data,
                        source: Some(operation.name.clone()),
                        confidence: operation.confidence,
                        errors,
                        warning: None,
                    };
                }
                Err(error) => {
                    tracing::debug!(
                        operation = %operation.name,
                        context = %context,
                        error = %error,
                        "Fallback attempt failed"
                    );
                    errors.push(SourceFailure {
                        source: operation.name.clone(),
                        error,
                    });
                }
            }
        }

        let exhausted = FallbackError::Exhausted {
            context: context.to_string(),
            attempted: operations.len(),
        };
        tracing::warn!(context = %context, attempted = operations.len(), "All sources failed, using conservative default");

        FallbackResult {
            success: false,
            data: T::safe_default(context),
            source: None,
            confidence: SAFE_DEFAULT_CONFIDENCE,
            errors,
            warning: Some(format!("{}. {}", exhausted, manual_review_warning(&subject(context)))),
        }
    }

    /// Run every operation concurrently.
    ///
    /// Succeeds when the fraction of successful sources reaches
    /// `min_success_rate`; the data is the successful subset, highest
    /// confidence first, and the confidence is their mean. Otherwise the
    /// result is a failure with empty data.
    pub async fn execute_parallel_with_fallback<T>(
        &self,
        operations: Vec<FallbackOperation<T>>,
        context: &FallbackContext,
        opts: &FallbackOptions,
    ) -> FallbackResult<Vec<Sourced<T>>>
    where
        T: Send + 'static,
    {
        let total = operations.len();
        let outcomes = join_all(operations.iter().map(|operation| async move {
            (operation, self.attempt(operation, opts.timeout).await)
        }))
        .await;

        let mut succeeded = Vec::new();
        let mut errors = Vec::new();
        for (operation, outcome) in outcomes {
            match outcome {
                Ok(value) => succeeded.push(Sourced {
                    source: operation.name.clone(),
                    confidence: operation.confidence,
                    value,
                }),
                Err(error) => errors.push(SourceFailure {
                    source: operation.name.clone(),
                    error,
                }),
            }
        }
        succeeded.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let count = succeeded.len();
        let rate = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        };
        let percent = (rate * 100.0).round() as u32;

        if total > 0 && count > 0 && rate >= opts.min_success_rate {
            let confidence = succeeded.iter().map(|s| s.confidence).sum::<f64>() / count as f64;
            let source = succeeded
                .iter()
                .map(|s| s.source.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let warning = (count < total).then(|| {
                format!(
                    "Partial data: {}/{} sources succeeded ({}%)",
                    count, total, percent
                )
            });
            return FallbackResult {
                success: true,
                data: succeeded,
                source: Some(source),
                confidence,
                errors,
                warning,
            };
        }

        let insufficient = FallbackError::InsufficientData {
            succeeded: count,
            total,
            percent,
        };
        tracing::warn!(context = %context, succeeded = count, total, percent, "Insufficient source coverage");

        FallbackResult {
            success: false,
            data: Vec::new(),
            source: None,
            confidence: 0.0,
            errors,
            warning: Some(format!("{}. {}", insufficient, manual_review_warning(&subject(context)))),
        }
    }

    /// Bind an ad-hoc operation to the named breaker and the shared stats.
    ///
    /// With `config` a dedicated breaker is installed under `name`;
    /// otherwise the registry's shared breaker for `name` is used.
    pub fn create_circuit_breaker<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> GuardedOperation<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HazmatResult<T>> + Send + 'static,
    {
        let breaker = match config {
            Some(config) => self.breakers.install(name, config),
            None => self.breakers.get_or_create(name),
        };
        GuardedOperation::new(breaker, operation).with_stats(self.stats.clone())
    }

    /// See [`ReliabilityStats::is_operation_reliable_with`]. Uses the
    /// configured threshold (0.8 by default) when `threshold` is `None`.
    pub fn is_operation_reliable(&self, name: &str, threshold: Option<f64>) -> bool {
        match threshold {
            Some(t) => self.stats.is_operation_reliable_with(name, t),
            None => self.stats.is_operation_reliable(name),
        }
    }
}

/// One attempt through the operation's breaker, bounded by `timeout`.
async fn run_guarded<T: Send + 'static>(
    breakers: &BreakerRegistry,
    stats: &ReliabilityStats,
    operation: &FallbackOperation<T>,
    timeout: Option<Duration>,
) -> HazmatResult<T> {
    let breaker = breakers.get_or_create(&operation.name);
    let started = Instant::now();

    let result = breaker
        .call(|| bounded(operation.invoke(), timeout, &operation.name))
        .await;

    match &result {
        // rejected without invoking the source
        Err(e) if e.is_circuit_open() => {}
        Ok(_) => stats.record_success(&operation.name, started.elapsed()),
        Err(_) => stats.record_failure(&operation.name, started.elapsed()),
    }
    result
}

fn subject(context: &FallbackContext) -> String {
    context
        .ingredient()
        .map(str::to_string)
        .unwrap_or_else(|| context.to_string())
}

/// Apply an optional timeout. The inner future is dropped on expiry.
async fn bounded<T>(
    future: OperationFuture<T>,
    timeout: Option<Duration>,
    source_name: &str,
) -> HazmatResult<T> {
    match timeout {
        None => future.await,
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                source_name: source_name.to_string(),
                timeout: limit,
            }
            .into()),
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hazmat_core::{CircuitState, HazardAssessment, NioshTable, PpeType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Label(String);

    impl SafeDefault for Label {
        fn safe_default(_context: &FallbackContext) -> Self {
            Label("default".to_string())
        }
    }

    fn label(s: &str) -> Label {
        Label(s.to_string())
    }

    fn ok_op(name: &str, confidence: f64, value: &'static str) -> FallbackOperation<Label> {
        FallbackOperation::new(name, confidence, move || async move { Ok(label(value)) })
    }

    fn failing_op<T: Send + 'static>(name: &str, confidence: f64) -> FallbackOperation<T> {
        let source = name.to_string();
        FallbackOperation::new(name, confidence, move || {
            let source = source.clone();
            async move { Err(HazmatError::transient(source, "503")) }
        })
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(ok_op("a", 1.7, "x").confidence(), 1.0);
        assert_eq!(ok_op("a", -0.2, "x").confidence(), 0.0);
        assert_eq!(ok_op("a", f64::NAN, "x").confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_sequential_order_by_confidence() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let ops = vec![
            ok_op("low", 0.3, "from-low"),
            failing_op("high", 0.9),
            ok_op("mid", 0.6, "from-mid"),
        ];
        let result = orchestrator
            .execute_with_fallback(ops, &FallbackContext::custom("test"), &FallbackOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.data, label("from-mid"));
        assert_eq!(result.source.as_deref(), Some("mid"));
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].source, "high");
        assert!(result.warning.is_none());

        let stats = orchestrator.stats();
        assert_eq!(stats.operation_stats("high").unwrap().failed_calls, 1);
        assert_eq!(stats.operation_stats("mid").unwrap().successful_calls, 1);
        assert!(stats.operation_stats("low").is_none());
    }

    #[tokio::test]
    async fn test_all_fail_returns_conservative_default() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let ops: Vec<FallbackOperation<HazardAssessment>> =
            vec![failing_op("pubchem", 0.9), failing_op("niosh", 0.8)];
        let result = orchestrator
            .execute_with_fallback(ops, &FallbackContext::hazard("cyclophosphamide"), &FallbackOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.confidence, SAFE_DEFAULT_CONFIDENCE);
        assert_eq!(result.errors.len(), 2);
        let warning = result.warning.unwrap();
        assert!(warning.contains("Manual review"));
        assert!(warning.contains("cyclophosphamide"));

        let record = result.data;
        assert_eq!(record.ingredient_name, "cyclophosphamide");
        assert_eq!(record.niosh_table(), Some(NioshTable::Table1));
        assert_eq!(record.ppe_recommendations.len(), PpeType::ALL.len());
    }

    #[tokio::test]
    async fn test_empty_operation_list_is_failure() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let result: FallbackResult<Label> = orchestrator
            .execute_with_fallback(Vec::new(), &FallbackContext::custom("nothing"), &FallbackOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.data, label("default"));
        assert!(result.warning.unwrap().contains("All 0 sources failed"));
    }

    #[tokio::test]
    async fn test_parallel_three_of_five_succeeds() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let ops = vec![
            ok_op("a", 0.9, "a"),
            ok_op("b", 0.6, "b"),
            ok_op("c", 0.3, "c"),
            failing_op("d", 0.8),
            failing_op("e", 0.7),
        ];
        let result = orchestrator
            .execute_parallel_with_fallback(ops, &FallbackContext::custom("p"), &FallbackOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.data.len(), 3);
        assert_eq!(result.data[0].source, "a");
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert!(result.warning.unwrap().contains("60%"));
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_one_of_five_fails_with_percentage() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let ops = vec![
            ok_op("a", 0.9, "a"),
            failing_op("b", 0.8),
            failing_op("c", 0.7),
            failing_op("d", 0.6),
            failing_op("e", 0.5),
        ];
        let result = orchestrator
            .execute_parallel_with_fallback(ops, &FallbackContext::custom("p"), &FallbackOptions::default())
            .await;

        assert!(!result.success);
        assert!(result.data.is_empty());
        assert!(result.warning.unwrap().contains("20%"));
    }

    #[tokio::test]
    async fn test_parallel_all_succeed_has_no_warning() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let ops = vec![ok_op("a", 0.8, "a"), ok_op("b", 0.4, "b")];
        let result = orchestrator
            .execute_parallel_with_fallback(ops, &FallbackContext::custom("p"), &FallbackOptions::default())
            .await;
        assert!(result.success);
        assert!(result.warning.is_none());
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let slow = FallbackOperation::new("slow", 0.9, || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(label("late"))
        });
        let ops = vec![slow, ok_op("fast", 0.5, "fast")];
        let opts = FallbackOptions::default().with_timeout(Duration::from_millis(100));

        let result = orchestrator
            .execute_with_fallback(ops, &FallbackContext::custom("t"), &opts)
            .await;

        assert_eq!(result.data, label("fast"));
        assert!(matches!(
            result.errors[0].error,
            HazmatError::Source(SourceError::Timeout { .. })
        ));
        assert_eq!(orchestrator.stats().operation_stats("slow").unwrap().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_source() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = calls.clone();
            FallbackOperation::new("pubchem", 0.9, move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<Label, _>(HazmatError::transient("pubchem", "503")) }
            })
        };

        for _ in 0..6 {
            let _ = orchestrator
                .execute_with_fallback(
                    vec![counted.clone(), ok_op("backup", 0.5, "ok")],
                    &FallbackContext::custom("b"),
                    &FallbackOptions::default(),
                )
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            orchestrator.breakers().breaker_states()["pubchem"],
            CircuitState::Open
        );
        // fast-fails are not recorded as calls
        assert_eq!(orchestrator.stats().operation_stats("pubchem").unwrap().total_calls, 5);
    }

    #[tokio::test]
    async fn test_unreliable_source_ranked_after_reliable_at_equal_confidence() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        for _ in 0..10 {
            orchestrator.stats().record_failure("flaky", Duration::ZERO);
        }
        assert!(!orchestrator.is_operation_reliable("flaky", None));

        let ops = vec![ok_op("flaky", 0.7, "flaky"), ok_op("steady", 0.7, "steady")];
        let result = orchestrator
            .execute_with_fallback(ops, &FallbackContext::custom("r"), &FallbackOptions::default())
            .await;
        assert_eq!(result.source.as_deref(), Some("steady"));

        // confidence still outranks reliability
        let ops = vec![ok_op("flaky", 0.8, "flaky"), ok_op("steady", 0.7, "steady")];
        let result = orchestrator
            .execute_with_fallback(ops, &FallbackContext::custom("r"), &FallbackOptions::default())
            .await;
        assert_eq!(result.source.as_deref(), Some("flaky"));
    }

    #[tokio::test]
    async fn test_guarded_operation_is_not_wrapped_twice() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let guarded = orchestrator.guard(failing_op::<Label>("pubchem", 0.9), None);
        assert!(guarded.is_guarded());

        let result = orchestrator
            .execute_with_fallback(vec![guarded], &FallbackContext::custom("g"), &FallbackOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(orchestrator.stats().operation_stats("pubchem").unwrap().total_calls, 1);
        assert_eq!(orchestrator.breakers().get("pubchem").unwrap().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_create_circuit_breaker() {
        let orchestrator = FallbackOrchestrator::with_defaults();
        let guarded = orchestrator.create_circuit_breaker(
            "adhoc",
            || async { Err::<u32, _>(HazmatError::transient("adhoc", "down")) },
            Some(CircuitBreakerConfig {
                failure_threshold: 2,
                reset_timeout: Duration::from_secs(60),
            }),
        );
        let _ = guarded.call().await;
        let _ = guarded.call().await;
        assert!(guarded.call().await.unwrap_err().is_circuit_open());
        assert_eq!(guarded.breaker().state(), CircuitState::Open);
        assert!(orchestrator.is_operation_reliable("adhoc", None));
    }
}
