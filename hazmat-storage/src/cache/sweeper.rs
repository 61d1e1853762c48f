//! Background expiry sweep.
//!
//! Expired entries are also removed lazily on read; the sweep bounds how long
//! an unread expired entry can sit in memory and in the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::store::TtlCache;

/// Counters for the sweeper task.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Total sweep cycles completed
    pub cycles: AtomicU64,
    /// Total expired entries removed since startup
    pub entries_purged: AtomicU64,
    /// Total cycles that failed to lock the cache
    pub errors: AtomicU64,
}

impl SweepMetrics {
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entries_purged: self.entries_purged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub cycles: u64,
    pub entries_purged: u64,
    pub errors: u64,
}

/// Purge expired entries every `every` until `shutdown_rx` flips to `true`.
///
/// The first sweep runs immediately.
pub async fn sweep_task(
    cache: Arc<TtlCache>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Cache sweeper started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweeper shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&cache, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        entries_purged = snapshot.entries_purged,
        errors = snapshot.errors,
        "Cache sweeper completed"
    );

    metrics
}

/// Spawn [`sweep_task`] on the current runtime using the cache's configured interval.
pub fn spawn_sweeper(
    cache: Arc<TtlCache>,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<Arc<SweepMetrics>> {
    let every = cache.config().sweep_interval;
    tokio::spawn(sweep_task(cache, every, shutdown_rx))
}

fn sweep_once(cache: &TtlCache, metrics: &SweepMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    match cache.purge_expired() {
        Ok(0) => tracing::trace!("Cache sweep found no expired entries"),
        Ok(removed) => {
            metrics
                .entries_purged
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::info!(removed, "Cache sweep purged expired entries");
        }
        Err(e) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Cache sweep failed");
        }
    }
}
