//! The per-worker dispatch loop.

use std::sync::atomic::Ordering;
use std::thread;

use tracing::debug;

use orbitfarm_core::WorkItem;

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::engine::{CheckpointStore, ComputeEngine};

/// Whether a worker currently counts towards quiescence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Active,
    Paused,
}

/// What one worker did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub units: u64,
    pub checkpoints: u64,
    pub finalized: bool,
}

impl<E, S, C> Dispatcher<E, S, C>
where
    E: ComputeEngine,
    S: CheckpointStore,
    C: Clock,
{
    /// Run one worker until it is told to stop.
    ///
    /// The worker must already be registered with the coordinator. The first
    /// `Stop` it receives retires it (flush, deregister) and it keeps polling,
    /// so the last worker to retire can still pick up the final save; a
    /// `Stop` received after retiring ends the loop.
    pub fn run_worker(&self, worker_id: usize) -> WorkerReport {
        let mut acc = self.engine.create_accumulator();
        let mut cursor = self.coordinator.worker_offset(worker_id);
        let mut phase = WorkerPhase::Active;
        let mut registered = true;
        let mut report = WorkerReport {
            worker_id,
            ..WorkerReport::default()
        };
        debug!(worker = worker_id, cursor, "Worker started");

        loop {
            let item = self.coordinator.next(worker_id, &mut cursor);
            if registered {
                phase = self.track_phase(phase, &item);
            }

            match item {
                WorkItem::ComputeUnit { x, y } => {
                    self.engine.compute_unit(x, y, &mut acc);
                    self.stats.units.fetch_add(1, Ordering::Relaxed);
                    report.units += 1;
                }
                WorkItem::RefreshProgress(fraction) => self.report_progress(fraction),
                WorkItem::Pause => thread::sleep(self.timing.pause_idle),
                WorkItem::Sleep => thread::sleep(self.timing.sleep_idle),
                WorkItem::SaveCheckpoint => {
                    self.checkpoint(worker_id, &mut acc, false);
                    report.checkpoints += 1;
                }
                WorkItem::SaveCheckpointAndStop => {
                    self.checkpoint(worker_id, &mut acc, true);
                    report.checkpoints += 1;
                }
                WorkItem::FinalizeAndStop => {
                    self.finalize(worker_id, &mut acc);
                    report.finalized = true;
                    break;
                }
                WorkItem::Stop if registered => {
                    self.retire(worker_id, &mut acc);
                    registered = false;
                }
                WorkItem::Stop => break,
            }
        }

        debug!(worker = worker_id, units = report.units, "Worker exiting");
        report
    }

    /// Report pause transitions to the coordinator.
    fn track_phase(&self, phase: WorkerPhase, item: &WorkItem) -> WorkerPhase {
        match (phase, item.is_pause_class()) {
            (WorkerPhase::Active, true) => {
                self.coordinator.pausing();
                WorkerPhase::Paused
            }
            (WorkerPhase::Paused, false) => {
                self.coordinator.unpausing();
                WorkerPhase::Active
            }
            (unchanged, _) => unchanged,
        }
    }
}
