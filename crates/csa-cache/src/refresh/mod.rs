//! Periodic background repopulation shared by every cache.
//!
//! # Lifecycle
//!
//! 1. A cache builds its shared state and hands it to [`spawn_refresher`] as a
//!    [`Repopulate`] implementation.
//! 2. One Tokio task per cache waits `initial_delay`, then runs a cycle every
//!    `period` (fixed rate: the period is measured between cycle starts).
//! 3. A failing or panicking cycle is logged and otherwise ignored; the
//!    previous snapshot stays authoritative until a later cycle succeeds.
//! 4. [`RefreshHandle::shutdown`] cancels the task.
//!
//! A zero period is logged as an error and replaced by
//! [`RefreshSchedule::MIN_PERIOD`].
//!
//! # Module invariants
//!
//! - Cycles of one cache never overlap on the refresher task; an eviction
//!   request queued during a cycle runs right after it.
//! - No retries within a cycle.

pub mod scheduler;

pub use scheduler::{spawn_refresher, RefreshHandle};

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};

/// When a cache is first populated and how often it is refreshed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    /// Time between construction and the first cycle.
    pub initial_delay: Duration,
    /// Time between the starts of two consecutive cycles.
    pub period: Duration,
}

impl RefreshSchedule {
    /// Shortest period a refresher will run at.
    pub const MIN_PERIOD: Duration = Duration::from_secs(1);

    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
        }
    }

    /// The period the refresher actually uses: `period`, raised to
    /// [`MIN_PERIOD`](Self::MIN_PERIOD) when zero.
    pub fn effective_period(&self) -> Duration {
        if self.period.is_zero() {
            Self::MIN_PERIOD
        } else {
            self.period
        }
    }
}

/// The recomputation a cache performs on every cycle.
#[async_trait]
pub trait Repopulate: Send + Sync + 'static {
    /// Human-readable cache name used in logs and spans.
    fn cache_name(&self) -> &'static str;

    /// Recompute the cache contents and publish them.
    ///
    /// # Errors
    ///
    /// Any error aborts the current cycle only; it is logged by the caller and
    /// the previously published contents are kept.
    async fn repopulate(&self) -> anyhow::Result<()>;
}

/// Run a single cycle on a dedicated task so that neither an error nor a panic
/// escapes to the caller.
///
/// Returns `true` if the cycle completed successfully.
pub async fn run_guarded<R: Repopulate>(target: Arc<R>) -> bool {
    let name = target.cache_name();
    let span = info_span!("cache_refresh", cache = name);
    let cycle = tokio::spawn(async move { run_cycle(target.as_ref()).await }.instrument(span));
    match cycle.await {
        Ok(ok) => ok,
        Err(e) => {
            error!(cache = name, error = %e, "cache refresh aborted; retaining previous contents");
            false
        }
    }
}

async fn run_cycle<R: Repopulate + ?Sized>(target: &R) -> bool {
    let name = target.cache_name();
    info!(cache = name, "starting cache refresh");
    let start = Instant::now();
    let result = target.repopulate().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            info!(cache = name, elapsed_ms, "finished cache refresh");
            true
        }
        Err(e) => {
            error!(
                cache = name,
                elapsed_ms,
                error = format!("{e:#}"),
                "cache refresh failed; retaining previous contents"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        outcome: fn(usize) -> anyhow::Result<()>,
    }

    #[async_trait]
    impl Repopulate for Scripted {
        fn cache_name(&self) -> &'static str {
            "scripted"
        }

        async fn repopulate(&self) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(n)
        }
    }

    fn scripted(outcome: fn(usize) -> anyhow::Result<()>) -> Arc<Scripted> {
        Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            outcome,
        })
    }

    #[tokio::test]
    async fn successful_cycle_reports_true() {
        let target = scripted(|_| Ok(()));
        assert!(run_guarded(target.clone()).await);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_cycle_is_swallowed() {
        let target = scripted(|_| anyhow::bail!("crm unreachable"));
        assert!(!run_guarded(target.clone()).await);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_cycle_is_swallowed() {
        let target = scripted(|_| panic!("unexpected payload"));
        assert!(!run_guarded(target.clone()).await);
        // The caller is still alive and can run another cycle.
        assert!(!run_guarded(target.clone()).await);
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
    }
}
