//! hazmat Reliability - Tolerating unreliable hazard sources
//!
//! Every source call runs through a per-name circuit breaker, is recorded in
//! the statistics tracker, and sits inside a fallback chain whose failure mode
//! is a conservative safe default rather than an error.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = Arc::new(FallbackOrchestrator::from_config(&config, clock.clone()));
//! let service = HazardDataService::new(cache, orchestrator)
//!     .with_source(Arc::new(DatasetHazardSource::from_path("dataset", 0.8, &path)?));
//! let record = service.lookup(&Ingredient::new("methotrexate", 2.5)).await?;
//! ```

pub mod breaker;
pub mod compose;
pub mod fallback;
pub mod merge;
pub mod service;
pub mod source;
pub mod stats;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, GuardedOperation};
pub use compose::{with_cache, with_cache_options, with_fallback, FallbackChain};
pub use fallback::{
    FallbackOperation, FallbackOptions, FallbackOrchestrator, FallbackResult, OperationFuture,
    SourceFailure, Sourced,
};
pub use merge::merge_assessments;
pub use service::{HazardDataService, LookupMode};
pub use source::{DatasetHazardSource, HazardLookup, HazardSource};
pub use stats::{OperationStats, ReliabilityConfig, ReliabilityStats};
