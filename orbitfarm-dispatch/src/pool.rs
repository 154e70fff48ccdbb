use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::engine::{CheckpointStore, ComputeEngine};
use crate::worker::WorkerReport;

/// Summary of a finished pool run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub elapsed: Duration,
    pub units_computed: u64,
    pub saves: u64,
    pub persist_failures: u64,
    pub finalized: bool,
    pub aborted: bool,
    pub workers: Vec<WorkerReport>,
}

/// Run every worker of `dispatcher` on a dedicated Rayon pool and block until
/// all of them have left their loops.
///
/// Workers are registered before any of them starts, so none can observe a
/// finished run while a sibling has yet to register.
pub fn run<E, S, C>(dispatcher: &Dispatcher<E, S, C>) -> crate::Result<RunReport>
where
    E: ComputeEngine,
    S: CheckpointStore,
    C: Clock,
{
    let workers = dispatcher.worker_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("Worker #{}", i + 1))
        .build()?;

    for _ in 0..workers {
        dispatcher.coordinator.register_worker();
    }

    let start = Instant::now();
    debug!(workers, "Starting worker pool");

    let reports = Mutex::new(Vec::with_capacity(workers));
    pool.scope(|s| {
        for worker_id in 0..workers {
            let reports = &reports;
            s.spawn(move |_| {
                let report = dispatcher.run_worker(worker_id);
                reports.lock().push(report);
            });
        }
    });

    let mut workers_done = reports.into_inner();
    workers_done.sort_by_key(|r| r.worker_id);

    let report = RunReport {
        elapsed: start.elapsed(),
        units_computed: dispatcher.stats.units.load(Ordering::Relaxed),
        saves: dispatcher.stats.saves.load(Ordering::Relaxed),
        persist_failures: dispatcher.stats.persist_failures.load(Ordering::Relaxed),
        finalized: dispatcher.stats.finalized.load(Ordering::SeqCst),
        aborted: dispatcher.coordinator.is_aborted(),
        workers: workers_done,
    };
    info!(
        elapsed_ms = report.elapsed.as_millis(),
        units = report.units_computed,
        saves = report.saves,
        finalized = report.finalized,
        aborted = report.aborted,
        "Worker pool finished"
    );
    Ok(report)
}
