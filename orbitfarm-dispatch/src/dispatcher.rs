use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::barrier::CheckpointBarrier;
use crate::clock::{Clock, MonotonicClock};
use crate::coordinator::{Coordinator, Quiescence};
use crate::engine::{CheckpointStore, ComputeEngine};
use crate::finalize::{finish_run, ArtifactPlan};
use crate::shutdown::ShutdownTimer;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Waits and retry intervals used by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTiming {
    /// Idle time after a `Pause` item.
    pub pause_idle: Duration,
    /// Idle time after a `Sleep` item.
    pub sleep_idle: Duration,
    /// Upper bound between quiescence re-checks.
    pub quiescence_poll: Duration,
    /// How long a regular checkpoint holds the barrier after persisting, so
    /// external I/O can drain. Cut short by an abort.
    pub settle: Duration,
    pub settle_tick: Duration,
    /// Process exit delay after the final artifact is written.
    pub final_close_delay: Duration,
    /// Process exit delay after a clean stop.
    pub clean_stop_close_delay: Duration,
    pub rename_backoff: Duration,
    /// How long finalize waits for the staging artifact to appear.
    pub staging_timeout: Duration,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self {
            pause_idle: Duration::from_secs(1),
            sleep_idle: Duration::from_secs(1),
            quiescence_poll: Duration::from_millis(100),
            settle: Duration::from_secs(5),
            settle_tick: Duration::from_millis(500),
            final_close_delay: Duration::from_secs(1),
            clean_stop_close_delay: Duration::from_secs(5),
            rename_backoff: Duration::from_millis(100),
            staging_timeout: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    pub(crate) units: AtomicU64,
    pub(crate) saves: AtomicU64,
    pub(crate) persist_failures: AtomicU64,
    pub(crate) finalized: AtomicBool,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Everything the worker pool shares: the coordinator, the checkpoint barrier,
/// and the external collaborators.
pub struct Dispatcher<E, S, C = MonotonicClock>
where
    E: ComputeEngine,
    S: CheckpointStore,
    C: Clock,
{
    pub(crate) coordinator: Arc<Coordinator<C>>,
    pub(crate) barrier: CheckpointBarrier,
    pub(crate) engine: E,
    pub(crate) store: S,
    pub(crate) timing: DispatchTiming,
    pub(crate) workers: usize,
    pub(crate) stats: DispatchStats,
    artifacts: ArtifactPlan,
    shutdown: Arc<ShutdownTimer>,
    last_reported: Mutex<Option<f64>>,
    started: Instant,
}

impl<E, S, C> Dispatcher<E, S, C>
where
    E: ComputeEngine,
    S: CheckpointStore,
    C: Clock,
{
    pub fn new(
        coordinator: Arc<Coordinator<C>>,
        engine: E,
        store: S,
        workers: usize,
        artifacts: ArtifactPlan,
    ) -> crate::Result<Self> {
        if workers == 0 {
            return Err(orbitfarm_core::CoreError::NoWorkers(workers).into());
        }
        Ok(Self {
            coordinator,
            barrier: CheckpointBarrier::new(),
            engine,
            store,
            timing: DispatchTiming::default(),
            workers,
            stats: DispatchStats::default(),
            artifacts,
            shutdown: Arc::new(ShutdownTimer::new()),
            last_reported: Mutex::new(None),
            started: Instant::now(),
        })
    }

    pub fn with_timing(mut self, timing: DispatchTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<C>> {
        &self.coordinator
    }

    pub fn shutdown_timer(&self) -> &Arc<ShutdownTimer> {
        &self.shutdown
    }

    pub fn barrier(&self) -> &CheckpointBarrier {
        &self.barrier
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn timing(&self) -> &DispatchTiming {
        &self.timing
    }

    // -- Progress --

    /// Log the completed fraction, with the gain since the last report.
    pub(crate) fn report_progress(&self, fraction: f64) {
        let mut last = self.last_reported.lock();
        match *last {
            Some(prev) if prev > 0.0 && fraction > prev => info!(
                "Working... {:.4}%, +{:.4}%",
                fraction * 100.0,
                (fraction - prev) * 100.0
            ),
            _ => info!("Working... {:.4}%", fraction * 100.0),
        }
        *last = Some(fraction);
    }

    // -- Checkpoint sequence --

    /// Run a regular or stopping checkpoint on behalf of `worker_id`.
    ///
    /// The caller has already reported itself paused.
    pub(crate) fn checkpoint(&self, worker_id: usize, acc: &mut E::Accumulator, stop_after: bool) {
        let Some(ticket) = self.barrier.try_enter() else {
            debug!(worker = worker_id, "Checkpoint barrier already fired; skipping save");
            self.coordinator.done_saving();
            return;
        };

        self.engine.flush_accumulator(acc, stop_after);

        if self.coordinator.wait_for_quiescence(self.timing.quiescence_poll) == Quiescence::Aborted
        {
            warn!(worker = worker_id, "Run aborted while waiting to save; checkpoint skipped");
            self.coordinator.done_saving();
            return;
        }

        let started = Instant::now();
        self.persist(worker_id);
        self.stats.saves.fetch_add(1, Ordering::Relaxed);
        self.report_progress(self.coordinator.progress().fraction());

        if stop_after {
            if let Err(e) = self.store.close() {
                error!(worker = worker_id, "Failed to close checkpoint store: {e}");
            }
            self.coordinator.finish_stopping_save();
            ticket.fire();
            self.shutdown.schedule(self.timing.clean_stop_close_delay);
            info!(
                worker = worker_id,
                elapsed_ms = started.elapsed().as_millis(),
                "State saved; shutting down"
            );
            return;
        }

        self.settle();
        self.coordinator.done_saving();
        debug!(
            worker = worker_id,
            elapsed_ms = started.elapsed().as_millis(),
            "Checkpoint complete"
        );
    }

    /// Write the final artifact. Runs at most once per process.
    pub(crate) fn finalize(&self, worker_id: usize, acc: &mut E::Accumulator) {
        let Some(ticket) = self.barrier.try_enter() else {
            debug!(worker = worker_id, "Checkpoint barrier already fired; skipping finalize");
            return;
        };

        self.engine.flush_accumulator(acc, true);
        if self.coordinator.wait_for_quiescence(self.timing.quiescence_poll) == Quiescence::Aborted
        {
            warn!(worker = worker_id, "Run aborted before finalize");
            return;
        }

        self.persist(worker_id);
        if let Err(e) = self.store.close() {
            error!(worker = worker_id, "Failed to close checkpoint store: {e}");
        }

        let staging = self.store.staging_path();
        match finish_run(
            &self.artifacts,
            &staging,
            self.started.elapsed(),
            self.timing.rename_backoff,
            self.timing.staging_timeout,
        ) {
            Ok(names) => info!(data = %names.data.display(), "All done!"),
            Err(e) => error!(worker = worker_id, "Finalize failed: {e}"),
        }

        ticket.fire();
        self.stats.finalized.store(true, Ordering::SeqCst);
        self.shutdown.schedule(self.timing.final_close_delay);
    }

    /// Flush a retiring worker's accumulator, unless the store is already
    /// closed, and take it off the registration count.
    ///
    /// The worker counts as paused while it waits for the barrier, so a save
    /// already holding the barrier can reach quiescence and finish.
    pub(crate) fn retire(&self, worker_id: usize, acc: &mut E::Accumulator) {
        self.coordinator.pausing();
        if let Some(_ticket) = self.barrier.try_enter() {
            self.engine.flush_accumulator(acc, false);
        }
        self.coordinator.deregister_paused_worker();
        debug!(worker = worker_id, "Worker deregistered");
    }

    fn persist(&self, worker_id: usize) {
        if let Err(e) = self.store.persist() {
            self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                worker = worker_id,
                path = %self.store.staging_path().display(),
                "Failed to persist checkpoint: {e}"
            );
        }
    }

    fn settle(&self) {
        let end = Instant::now() + self.timing.settle;
        loop {
            if self.coordinator.is_aborted() {
                break;
            }
            let left = end.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            std::thread::sleep(left.min(self.timing.settle_tick));
        }
    }
}
