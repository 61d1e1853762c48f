//! Higher-order wrapping for fallback operations.
//!
//! `with_cache` puts a read-through cache in front of an operation;
//! `with_fallback` binds a set of operations to an orchestrator and a context
//! so the chain can be run repeatedly.

use std::sync::Arc;

use hazmat_core::{FallbackContext, SafeDefault};
use hazmat_storage::{CacheType, FetchOptions, TtlCache};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::fallback::{FallbackOperation, FallbackOptions, FallbackOrchestrator, FallbackResult, Sourced};

/// Serve `operation` through `cache` under `cache_type:key`.
///
/// The wrapped operation keeps its name and confidence. Fetch failures fall
/// back to a stale entry when one exists. Wrap an operation returned by
/// [`FallbackOrchestrator::guard`] to read the cache before its breaker.
pub fn with_cache<T>(
    cache: Arc<TtlCache>,
    cache_type: CacheType,
    key: impl Into<String>,
    operation: FallbackOperation<T>,
) -> FallbackOperation<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    with_cache_options(cache, cache_type, key, FetchOptions::new(), operation)
}

/// [`with_cache`] with explicit fetch options. The operation name is
/// recorded as the entry source unless `opts` already names one.
pub fn with_cache_options<T>(
    cache: Arc<TtlCache>,
    cache_type: CacheType,
    key: impl Into<String>,
    opts: FetchOptions,
    operation: FallbackOperation<T>,
) -> FallbackOperation<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let key = key.into();
    let opts = match opts.source {
        Some(_) => opts,
        None => opts.with_source(operation.name()),
    };
    let name = operation.name().to_string();
    let confidence = operation.confidence();
    let guarded = operation.is_guarded();

    let cached = FallbackOperation::new(name, confidence, move || {
        let cache = cache.clone();
        let key = key.clone();
        let opts = opts.clone();
        let operation = operation.clone();
        async move {
            cache
                .get_or_fetch(&key, cache_type, opts, || operation.invoke())
                .await
        }
    });
    if guarded {
        cached.mark_guarded()
    } else {
        cached
    }
}

/// A fallback chain bound to its orchestrator and context.
#[derive(Debug, Clone)]
pub struct FallbackChain<T> {
    orchestrator: Arc<FallbackOrchestrator>,
    context: FallbackContext,
    operations: Vec<FallbackOperation<T>>,
}

/// Bind `operations` to `orchestrator` for `context`.
pub fn with_fallback<T>(
    orchestrator: Arc<FallbackOrchestrator>,
    context: FallbackContext,
    operations: Vec<FallbackOperation<T>>,
) -> FallbackChain<T> {
    FallbackChain {
        orchestrator,
        context,
        operations,
    }
}

impl<T: Send + 'static> FallbackChain<T> {
    pub fn context(&self) -> &FallbackContext {
        &self.context
    }

    pub fn operations(&self) -> &[FallbackOperation<T>] {
        &self.operations
    }

    /// Run the operations concurrently with the orchestrator's default options.
    pub async fn run_parallel(&self) -> FallbackResult<Vec<Sourced<T>>> {
        let opts = self.orchestrator.options().clone();
        self.run_parallel_with(&opts).await
    }

    pub async fn run_parallel_with(&self, opts: &FallbackOptions) -> FallbackResult<Vec<Sourced<T>>> {
        self.orchestrator
            .execute_parallel_with_fallback(self.operations.clone(), &self.context, opts)
            .await
    }
}

impl<T: SafeDefault + Send + 'static> FallbackChain<T> {
    /// Try the operations by descending confidence with the orchestrator's
    /// default options.
    pub async fn run(&self) -> FallbackResult<T> {
        let opts = self.orchestrator.options().clone();
        self.run_with(&opts).await
    }

    pub async fn run_with(&self, opts: &FallbackOptions) -> FallbackResult<T> {
        self.orchestrator
            .execute_with_fallback(self.operations.clone(), &self.context, opts)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazmat_core::{HazmatError, ManualClock};
    use hazmat_storage::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_op(
        name: &str,
        calls: Arc<AtomicUsize>,
        fail_after: usize,
    ) -> FallbackOperation<Vec<String>> {
        let source = name.to_string();
        FallbackOperation::new(name, 0.9, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let source = source.clone();
            async move {
                if n >= fail_after {
                    Err(HazmatError::transient(source, "down"))
                } else {
                    Ok(vec![format!("call-{}", n)])
                }
            }
        })
    }

    #[tokio::test]
    async fn test_with_cache_serves_repeat_calls_from_cache() {
        let clock = ManualClock::starting_now();
        let cache = Arc::new(TtlCache::new(CacheConfig::default(), Arc::new(clock.clone())));
        let calls = Arc::new(AtomicUsize::new(0));

        let op = with_cache(
            cache.clone(),
            CacheType::Rxnorm,
            "Warfarin",
            counting_op("rxnorm", calls.clone(), usize::MAX),
        );
        assert_eq!(op.name(), "rxnorm");

        let first = op.invoke().await.unwrap();
        let second = op.invoke().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("warfarin", CacheType::Rxnorm));
    }

    #[tokio::test]
    async fn test_with_cache_serves_stale_on_failure() {
        let clock = ManualClock::starting_now();
        let cache = Arc::new(TtlCache::new(CacheConfig::default(), Arc::new(clock.clone())));
        let calls = Arc::new(AtomicUsize::new(0));

        let op = with_cache(
            cache.clone(),
            CacheType::Dailymed,
            "label",
            counting_op("dailymed", calls.clone(), 1),
        );
        let fresh = op.invoke().await.unwrap();

        clock.advance(Duration::from_secs(25 * 3600));
        let stale = op.invoke().await.unwrap();
        assert_eq!(fresh, stale);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn guarded_setup(
        clock: &ManualClock,
        fail_after: usize,
    ) -> (Arc<FallbackOrchestrator>, FallbackOperation<Vec<String>>, Arc<AtomicUsize>) {
        let shared: hazmat_core::SharedClock = Arc::new(clock.clone());
        let cache = Arc::new(TtlCache::new(CacheConfig::default(), shared.clone()));
        let orchestrator = Arc::new(FallbackOrchestrator::from_config(
            &hazmat_core::HazmatConfig::default(),
            shared,
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = counting_op("pubchem", calls.clone(), fail_after);
        let op = with_cache(
            cache,
            CacheType::Pubchem,
            "glycerin",
            orchestrator.guard(inner, None),
        );
        (orchestrator, op, calls)
    }

    #[tokio::test]
    async fn test_fresh_cache_entry_served_while_circuit_open() {
        let clock = ManualClock::starting_now();
        let (orchestrator, op, calls) = guarded_setup(&clock, usize::MAX);
        assert!(op.is_guarded());
        let first = op.invoke().await.unwrap();

        let breaker = orchestrator.breakers().get_or_create("pubchem");
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), hazmat_core::CircuitState::Open);

        assert_eq!(op.invoke().await.unwrap(), first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // only the real fetch is a recorded call
        assert_eq!(orchestrator.stats().operation_stats("pubchem").unwrap().total_calls, 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_still_trips_breaker() {
        let clock = ManualClock::starting_now();
        let (orchestrator, op, calls) = guarded_setup(&clock, 1);
        let fresh = op.invoke().await.unwrap();

        clock.advance(Duration::from_secs(8 * 24 * 3600));
        for _ in 0..5 {
            assert_eq!(op.invoke().await.unwrap(), fresh);
        }
        assert_eq!(
            orchestrator.breakers().breaker_states()["pubchem"],
            hazmat_core::CircuitState::Open
        );
        assert_eq!(orchestrator.stats().operation_stats("pubchem").unwrap().failed_calls, 5);

        // open circuit: the source is skipped and the stale entry still served
        assert_eq!(op.invoke().await.unwrap(), fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_with_fallback_chain_runs_repeatedly() {
        let orchestrator = Arc::new(FallbackOrchestrator::with_defaults());
        let ops: Vec<FallbackOperation<Vec<hazmat_core::PpeRequirement>>> = vec![
            FallbackOperation::new("broken", 0.9, || async {
                Err(HazmatError::transient("broken", "timeout"))
            }),
        ];
        let chain = with_fallback(
            orchestrator.clone(),
            FallbackContext::PpeRecommendation {
                ingredient: "methotrexate".to_string(),
            },
            ops,
        );

        for _ in 0..2 {
            let result = chain.run().await;
            assert!(!result.success);
            assert_eq!(result.data.len(), hazmat_core::PpeType::ALL.len());
        }
        assert_eq!(
            orchestrator.stats().operation_stats("broken").unwrap().failed_calls,
            2
        );
        assert_eq!(chain.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_with_fallback_parallel() {
        let orchestrator = Arc::new(FallbackOrchestrator::with_defaults());
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = with_fallback(
            orchestrator,
            FallbackContext::custom("labels"),
            vec![counting_op("a", calls.clone(), usize::MAX)],
        );
        let result = chain.run_parallel().await;
        assert!(result.success);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].source, "a");
    }
}
