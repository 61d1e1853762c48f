//! End-to-end behavior of the hazard data service over scripted sources.

use std::sync::Arc;
use std::time::Duration;

use hazmat_core::{CircuitState, HazmatConfig, ManualClock, NioshTable, SharedClock};
use hazmat_reliability::{FallbackOrchestrator, HazardDataService, HazardLookup, LookupMode};
use hazmat_storage::{CacheConfig, CacheType, MemorySnapshotStore, SnapshotStore, TtlCache};
use hazmat_test_utils::assertions::{assert_conservative, assert_fallback_failed};
use hazmat_test_utils::{fixtures, HazmatError, Ingredient, MockHazardSource};

fn orchestrator(clock: &ManualClock) -> Arc<FallbackOrchestrator> {
    Arc::new(FallbackOrchestrator::from_config(
        &HazmatConfig::default(),
        Arc::new(clock.clone()),
    ))
}

fn memory_cache(clock: &ManualClock) -> Arc<TtlCache> {
    Arc::new(TtlCache::new(CacheConfig::default(), Arc::new(clock.clone())))
}

#[tokio::test]
async fn breaker_fails_fast_then_recovers_after_reset_timeout() {
    let clock = ManualClock::starting_now();
    let mut source = MockHazardSource::new("pubchem", 0.9);
    for _ in 0..5 {
        source = source.then_err(HazmatError::transient("pubchem", "503"));
    }
    let source = Arc::new(source.repeating(fixtures::clean_excipient("Glycerin")));
    let orchestrator = orchestrator(&clock);
    let service = HazardDataService::new(memory_cache(&clock), orchestrator.clone())
        .with_source(source.clone());
    let glycerin = Ingredient::new("Glycerin", 10.0);

    for _ in 0..5 {
        let result = service.resolve(&glycerin).await;
        assert_fallback_failed(&result);
        assert_conservative(&result.data);
    }
    assert_eq!(
        orchestrator.breakers().breaker_states()["pubchem"],
        CircuitState::Open
    );

    // sixth call is rejected without reaching the source
    let rejected = service.resolve(&glycerin).await;
    assert!(!rejected.success);
    assert!(rejected.errors[0].error.is_circuit_open());
    assert_eq!(source.call_count(), 5);

    clock.advance(Duration::from_secs(61));
    let recovered = service.resolve(&glycerin).await;
    assert!(recovered.success);
    assert_eq!(source.call_count(), 6);
    assert_eq!(
        orchestrator.breakers().breaker_states()["pubchem"],
        CircuitState::Closed
    );
}

#[tokio::test]
async fn merged_assessments_survive_restart() {
    let clock = ManualClock::starting_now();
    let shared_clock: SharedClock = Arc::new(clock.clone());
    let store = Arc::new(MemorySnapshotStore::new());

    let first = HazardDataService::new(
        Arc::new(TtlCache::with_persistence(
            CacheConfig::default(),
            shared_clock.clone(),
            store.clone(),
        )),
        orchestrator(&clock),
    )
    .with_source(Arc::new(MockHazardSource::always(
        "niosh",
        0.95,
        fixtures::methotrexate(),
    )));
    let ingredient = Ingredient::new("Methotrexate", 2.5).with_cas("59-05-2");
    assert!(first.resolve(&ingredient).await.success);
    assert!(store.load("hazmat_cache").unwrap().is_some());

    // a fresh process whose only source is down
    let restarted = HazardDataService::new(
        Arc::new(TtlCache::with_persistence(
            CacheConfig::default(),
            shared_clock,
            store,
        )),
        orchestrator(&clock),
    )
    .with_source(Arc::new(MockHazardSource::failing("niosh", 0.95)));

    let result = restarted.resolve(&ingredient).await;
    assert!(result.success);
    assert_eq!(result.source.as_deref(), Some(CacheType::Assessment.as_str()));
    assert_eq!(result.data.niosh_table(), Some(NioshTable::Table1));
}

#[tokio::test]
async fn stale_source_record_is_served_when_source_fails() {
    let clock = ManualClock::starting_now();
    let source = Arc::new(
        MockHazardSource::new("pubchem", 0.9).then_ok(fixtures::irritant("Menthol")),
    );
    let service = HazardDataService::new(memory_cache(&clock), orchestrator(&clock))
        .with_source(source.clone());
    let menthol = Ingredient::new("Menthol", 1.0);

    assert!(service.resolve(&menthol).await.success);

    // assessment entry expired, pubchem entry still fresh
    clock.advance(Duration::from_secs(2 * 3600));
    assert!(service.resolve(&menthol).await.success);
    assert_eq!(source.call_count(), 1);

    // both expired; the source now fails and the stale record is served
    clock.advance(Duration::from_secs(8 * 24 * 3600));
    let result = service.resolve(&menthol).await;
    assert!(result.success);
    assert_eq!(result.data.ingredient_name, "Menthol");
    assert_eq!(source.call_count(), 2);
}

#[tokio::test]
async fn open_breaker_still_serves_fresh_source_record() {
    let clock = ManualClock::starting_now();
    let source = Arc::new(
        MockHazardSource::new("pubchem", 0.9).then_ok(fixtures::clean_excipient("Glycerin")),
    );
    let orchestrator = orchestrator(&clock);
    let service = HazardDataService::new(memory_cache(&clock), orchestrator.clone())
        .with_source(source.clone());
    let glycerin = Ingredient::new("Glycerin", 10.0);

    assert!(service.resolve(&glycerin).await.success);

    let breaker = orchestrator.breakers().get_or_create("pubchem");
    for _ in 0..5 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // assessment entry expired, pubchem entry still fresh
    clock.advance(Duration::from_secs(2 * 3600));
    let result = service.resolve(&glycerin).await;
    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(result.data.ingredient_name, "Glycerin");
    assert!(result.data.niosh_table().is_none());
    assert_eq!(source.call_count(), 1);
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn parallel_mode_tolerates_minority_failures() {
    let clock = ManualClock::starting_now();
    let service = HazardDataService::new(memory_cache(&clock), orchestrator(&clock))
        .with_mode(LookupMode::Parallel)
        .with_source(Arc::new(MockHazardSource::always("a", 0.9, fixtures::spironolactone())))
        .with_source(Arc::new(MockHazardSource::always("b", 0.8, fixtures::spironolactone())))
        .with_source(Arc::new(MockHazardSource::always("c", 0.7, fixtures::spironolactone())))
        .with_source(Arc::new(MockHazardSource::failing("d", 0.6)))
        .with_source(Arc::new(MockHazardSource::failing("e", 0.5)));

    let result = service
        .resolve(&Ingredient::new("Spironolactone", 25.0))
        .await;
    assert!(result.success);
    assert_eq!(result.errors.len(), 2);
    assert!((result.confidence - 0.8).abs() < 1e-9);
    assert!(result.warning.unwrap().contains("60%"));
}

#[tokio::test]
async fn parallel_mode_below_threshold_is_conservative() {
    let clock = ManualClock::starting_now();
    let service = HazardDataService::new(memory_cache(&clock), orchestrator(&clock))
        .with_mode(LookupMode::Parallel)
        .with_source(Arc::new(MockHazardSource::always("a", 0.9, fixtures::spironolactone())))
        .with_source(Arc::new(MockHazardSource::failing("b", 0.8)))
        .with_source(Arc::new(MockHazardSource::failing("c", 0.7)))
        .with_source(Arc::new(MockHazardSource::failing("d", 0.6)))
        .with_source(Arc::new(MockHazardSource::failing("e", 0.5)));

    let record = service
        .lookup(&Ingredient::new("Spironolactone", 25.0))
        .await
        .unwrap();
    assert_conservative(&record);
    assert!(record.data_quality.warnings.iter().any(|w| w.contains("20%")));
}
