#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use orbitfarm_core::{Partition, WorkRect};
use orbitfarm_dispatch::{
    ArtifactPlan, Cadence, CheckpointStore, ComputeEngine, Coordinator, DispatchTiming,
    Dispatcher,
};

pub const HOUR: Duration = Duration::from_secs(3600);

/// Timing small enough for tests to finish in milliseconds.
pub fn fast_timing() -> DispatchTiming {
    DispatchTiming {
        pause_idle: Duration::from_millis(1),
        sleep_idle: Duration::from_millis(1),
        quiescence_poll: Duration::from_millis(2),
        settle: Duration::from_millis(5),
        settle_tick: Duration::from_millis(1),
        final_close_delay: Duration::ZERO,
        clean_stop_close_delay: Duration::ZERO,
        rename_backoff: Duration::from_millis(1),
        staging_timeout: Duration::from_secs(2),
    }
}

/// Engine that records every coordinate it is given.
pub struct RecordingEngine {
    pub claims: Mutex<Vec<(i32, i32)>>,
    pub in_flight: Arc<AtomicUsize>,
    pub work: Duration,
}

impl RecordingEngine {
    pub fn new(work: Duration) -> Self {
        Self {
            claims: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            work,
        }
    }
}

impl ComputeEngine for RecordingEngine {
    type Accumulator = Vec<(i32, i32)>;

    fn create_accumulator(&self) -> Self::Accumulator {
        Vec::new()
    }

    fn compute_unit(&self, x: i32, y: i32, acc: &mut Self::Accumulator) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
        acc.push((x, y));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn flush_accumulator(&self, acc: &mut Self::Accumulator, _final_flush: bool) {
        self.claims.lock().extend(acc.drain(..));
    }
}

/// State observed at the moment a persist started.
#[derive(Debug, Clone, Copy)]
pub struct PersistProbe {
    pub paused: usize,
    pub registered: usize,
    pub in_flight: usize,
    pub completed: u64,
}

/// Store that checks the barrier's guarantees whenever it is asked to persist.
pub struct ProbeStore {
    pub coordinator: Arc<Coordinator>,
    pub in_flight: Arc<AtomicUsize>,
    pub staging: PathBuf,
    pub probes: Mutex<Vec<PersistProbe>>,
    pub inside: AtomicUsize,
    pub max_inside: AtomicUsize,
}

impl CheckpointStore for ProbeStore {
    fn persist(&self) -> io::Result<()> {
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inside.fetch_max(now, Ordering::SeqCst);

        let progress = self.coordinator.progress();
        self.probes.lock().push(PersistProbe {
            paused: self.coordinator.paused_workers(),
            registered: self.coordinator.registered_workers(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            completed: progress.completed,
        });
        std::fs::write(&self.staging, progress.completed.to_le_bytes())?;
        std::thread::sleep(Duration::from_millis(1));

        self.inside.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        self.staging.clone()
    }
}

pub type TestDispatcher = Dispatcher<RecordingEngine, ProbeStore>;

/// Build a dispatcher over a `w × h` rectangle writing into `dir`.
pub fn dispatcher(
    dir: &Path,
    w: u32,
    h: u32,
    workers: usize,
    decorrelate: bool,
    cadence: Cadence,
    work: Duration,
) -> TestDispatcher {
    let rect = WorkRect::from_origin_size(0, 0, w, h).unwrap();
    let partition = Partition::build(rect, workers, decorrelate).unwrap();
    let coordinator = Arc::new(Coordinator::new(partition, cadence));
    let engine = RecordingEngine::new(work);
    let store = ProbeStore {
        coordinator: Arc::clone(&coordinator),
        in_flight: Arc::clone(&engine.in_flight),
        staging: dir.join("DataDump.dat"),
        probes: Mutex::new(Vec::new()),
        inside: AtomicUsize::new(0),
        max_inside: AtomicUsize::new(0),
    };
    let plan = ArtifactPlan::new(dir.join("out"), "Test").with_line("Threads", workers);
    Dispatcher::new(coordinator, engine, store, workers, plan)
        .unwrap()
        .with_timing(fast_timing())
}

pub fn full_set(w: u32, h: u32) -> std::collections::HashSet<(i32, i32)> {
    (0..w as i32)
        .flat_map(|x| (0..h as i32).map(move |y| (x, y)))
        .collect()
}
