//! Hazard data service.
//!
//! Resolves an ingredient against every registered [`HazardSource`]. Each
//! source call is shape-checked and guarded by its circuit breaker, with the
//! source's cache partition read first: a fresh entry is served even while
//! the breaker is open, and only real fetches move the breaker. The
//! orchestrator picks or merges the results.
//! Merged records are cached under `assessment` so repeated compounds do not
//! touch the sources at all. When nothing usable comes back the caller gets
//! the conservative record with its warnings; that record is never cached.

use std::sync::Arc;

use async_trait::async_trait;
use hazmat_core::{
    conservative_hazard_assessment, FallbackContext, HazardAssessment, HazmatError, HazmatResult,
    Ingredient, SourceError,
};
use hazmat_storage::{CacheType, FetchOptions, TtlCache};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compose::{with_cache_options, with_fallback};
use crate::fallback::{FallbackOperation, FallbackOptions, FallbackOrchestrator, FallbackResult};
use crate::merge::merge_assessments;
use crate::source::{HazardLookup, HazardSource};

/// How the service consults its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMode {
    /// Highest confidence first; first success wins.
    #[default]
    Ranked,
    /// All sources concurrently; successful records are merged worst-case.
    Parallel,
}

/// Ranked, cached, breaker-guarded access to hazard sources.
pub struct HazardDataService {
    sources: Vec<Arc<dyn HazardSource>>,
    cache: Arc<TtlCache>,
    orchestrator: Arc<FallbackOrchestrator>,
    options: FallbackOptions,
    mode: LookupMode,
}

impl HazardDataService {
    pub fn new(cache: Arc<TtlCache>, orchestrator: Arc<FallbackOrchestrator>) -> Self {
        let options = orchestrator.options().clone();
        Self {
            sources: Vec::new(),
            cache,
            orchestrator,
            options,
            mode: LookupMode::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn HazardSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_mode(mut self, mode: LookupMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_options(mut self, options: FallbackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<FallbackOrchestrator> {
        &self.orchestrator
    }

    pub fn mode(&self) -> LookupMode {
        self.mode
    }

    /// Resolve one ingredient, reporting how the record was obtained.
    pub async fn resolve(&self, ingredient: &Ingredient) -> FallbackResult<HazardAssessment> {
        self.resolve_with(ingredient, FetchOptions::new()).await
    }

    /// Resolve one ingredient bypassing every cached value. Cached values
    /// still serve as stale fallbacks when the sources fail.
    pub async fn refresh(&self, ingredient: &Ingredient) -> FallbackResult<HazardAssessment> {
        self.resolve_with(ingredient, FetchOptions::new().force_refresh())
            .await
    }

    async fn resolve_with(
        &self,
        ingredient: &Ingredient,
        opts: FetchOptions,
    ) -> FallbackResult<HazardAssessment> {
        let key = ingredient.lookup_key().to_string();

        if !opts.force_refresh {
            if let Some(cached) = self.cache.get::<HazardAssessment>(&key, CacheType::Assessment) {
                debug!(ingredient = %ingredient.name, "assessment cache hit");
                let confidence = cached.confidence();
                return FallbackResult {
                    success: true,
                    data: cached,
                    source: Some(CacheType::Assessment.as_str().to_string()),
                    confidence,
                    errors: Vec::new(),
                    warning: None,
                };
            }
        }

        let context = FallbackContext::hazard(&ingredient.name);
        let operations = self
            .sources
            .iter()
            .map(|source| self.source_operation(source.clone(), ingredient, &opts))
            .collect();
        let chain = with_fallback(self.orchestrator.clone(), context, operations);

        let result = match self.mode {
            LookupMode::Ranked => chain.run_with(&self.options).await,
            LookupMode::Parallel => {
                let parallel = chain.run_parallel_with(&self.options).await;
                let merged = merge_assessments(&parallel.data, parallel.confidence);
                FallbackResult {
                    success: parallel.success && merged.is_some(),
                    data: merged.unwrap_or_else(|| conservative_hazard_assessment(&ingredient.name)),
                    source: parallel.source,
                    confidence: parallel.confidence,
                    errors: parallel.errors,
                    warning: parallel.warning,
                }
            }
        };

        self.finish(&key, ingredient, result)
    }

    /// Attach the result warning to the record and cache successes.
    fn finish(
        &self,
        key: &str,
        ingredient: &Ingredient,
        mut result: FallbackResult<HazardAssessment>,
    ) -> FallbackResult<HazardAssessment> {
        if let Some(warning) = &result.warning {
            let warnings = &mut result.data.data_quality.warnings;
            if !warnings.contains(warning) {
                warnings.push(warning.clone());
            }
        }

        if result.success {
            if let Err(e) = self.cache.set(
                key,
                &result.data,
                CacheType::Assessment,
                result.source.as_deref(),
            ) {
                warn!(ingredient = %ingredient.name, error = %e, "failed to cache assessment");
            }
        } else {
            warn!(
                ingredient = %ingredient.name,
                failures = result.errors.len(),
                "hazard sources exhausted, conservative record returned"
            );
            result.data.data_quality.verification_required = true;
        }
        result
    }

    /// One cached, shape-checked operation for `source`.
    ///
    /// The record's confidence is capped at the source's static confidence.
    /// When the CAS number is not found the ingredient name is tried.
    fn source_operation(
        &self,
        source: Arc<dyn HazardSource>,
        ingredient: &Ingredient,
        opts: &FetchOptions,
    ) -> FallbackOperation<HazardAssessment> {
        let primary = ingredient.lookup_key().to_string();
        let by_name = (primary != ingredient.name).then(|| ingredient.name.clone());
        let name = source.name().to_string();
        let confidence = source.confidence();
        let cache_type = source.cache_type();
        let cache_key = format!("{}:{}", name, primary);

        let fetch = {
            let source = source.clone();
            FallbackOperation::new(name, confidence, move || {
                let source = source.clone();
                let primary = primary.clone();
                let by_name = by_name.clone();
                async move {
                    let record = match source.fetch(&primary).await {
                        Err(HazmatError::Source(SourceError::NotFound { .. })) if by_name.is_some() => {
                            let fallback = by_name.as_deref().unwrap_or_default();
                            source.fetch(fallback).await?
                        }
                        other => other?,
                    };
                    checked(source.as_ref(), record)
                }
            })
        };

        let guarded = self.orchestrator.guard(fetch, self.options.timeout);
        with_cache_options(self.cache.clone(), cache_type, cache_key, opts.clone(), guarded)
    }
}

fn checked(source: &dyn HazardSource, mut record: HazardAssessment) -> HazmatResult<HazardAssessment> {
    record
        .validate_shape()
        .map_err(|reason| SourceError::InvalidRecord {
            source_name: source.name().to_string(),
            reason,
        })?;
    let quality = &mut record.data_quality;
    quality.confidence = quality.confidence.min(source.confidence());
    Ok(record)
}

impl std::fmt::Debug for HazardDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HazardDataService")
            .field("sources", &self.source_names())
            .field("mode", &self.mode)
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl HazardLookup for HazardDataService {
    /// Never fails: exhausted sources produce the conservative record.
    async fn lookup(&self, ingredient: &Ingredient) -> HazmatResult<HazardAssessment> {
        Ok(self.resolve(ingredient).await.data)
    }
}
