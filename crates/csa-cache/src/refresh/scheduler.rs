//! [`RefreshHandle`]: the background task driving a cache's refresh cycles.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{run_guarded, RefreshSchedule, Repopulate};

/// Control handle for a running refresher task.
///
/// Cheap to clone; all clones control the same task.
#[derive(Clone, Debug)]
pub struct RefreshHandle {
    name: &'static str,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RefreshHandle {
    /// Request an immediate out-of-band cycle.
    ///
    /// The cycle runs on the refresher task, after any cycle currently in
    /// progress; repeated requests made before it starts collapse into one.
    pub fn evict(&self) {
        debug!(cache = self.name, "eviction requested");
        self.trigger.notify_one();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the refresher task and wait for it to exit.
    ///
    /// A cycle in progress is no longer awaited (it may still publish when its
    /// external calls return); the last published snapshot remains readable.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(cache = self.name, error = %e, "refresher task ended abnormally");
            }
            info!(cache = self.name, "cache refresher stopped");
        }
    }
}

/// Spawn the refresher task for `target` according to `schedule`.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_refresher<R: Repopulate>(target: Arc<R>, schedule: RefreshSchedule) -> RefreshHandle {
    let name = target.cache_name();
    let trigger = Arc::new(Notify::new());
    let cancel = CancellationToken::new();

    if schedule.period.is_zero() {
        error!(
            cache = name,
            period_ms = schedule.effective_period().as_millis() as u64,
            "zero refresh period; using the minimum period instead"
        );
    }

    let task = tokio::spawn(refresh_loop(target, schedule, trigger.clone(), cancel.clone()));
    info!(
        cache = name,
        initial_delay_ms = schedule.initial_delay.as_millis() as u64,
        period_ms = schedule.effective_period().as_millis() as u64,
        "cache refresher scheduled"
    );

    RefreshHandle {
        name,
        trigger,
        cancel,
        task: Arc::new(Mutex::new(Some(task))),
    }
}

async fn refresh_loop<R: Repopulate>(
    target: Arc<R>,
    schedule: RefreshSchedule,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(
        Instant::now() + schedule.initial_delay,
        schedule.effective_period(),
    );
    // Fixed rate: a late cycle is followed by catch-up cycles, not a shifted grid.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = trigger.notified() => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = run_guarded(target.clone()) => {}
        }
    }
    debug!(cache = target.cache_name(), "refresh loop exited");
}
