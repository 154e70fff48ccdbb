use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use orbitfarm_core::{Partition, WorkItem};

use crate::cadence::{catch_up, pull_forward, Cadence};
use crate::clock::{Clock, MonotonicClock};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Completed versus total coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Outcome of waiting for every registered worker to pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiescence {
    Reached,
    Aborted,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct State {
    partition: Partition,
    completed: u64,
    total: u64,
    done: bool,
    aborted: bool,
    saving: bool,
    clean_stop_requested: bool,
    sleeping: bool,
    sent_final_save: bool,
    registered: usize,
    paused: usize,
    next_save_at: Instant,
    next_refresh_at: Instant,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Single source of truth for what every worker does next.
///
/// All scheduling state lives behind one mutex. [`next`](Self::next) only
/// decides and updates bookkeeping; the work itself runs after the lock is
/// released. Pause and registration changes signal a condition variable so a
/// checkpointing worker can wait for quiescence without spinning.
#[derive(Debug)]
pub struct Coordinator<C: Clock = MonotonicClock> {
    state: Mutex<State>,
    quiescence: Condvar,
    cadence: Cadence,
    clock: C,
}

impl Coordinator<MonotonicClock> {
    pub fn new(partition: Partition, cadence: Cadence) -> Self {
        Self::with_clock(partition, cadence, MonotonicClock)
    }
}

impl<C: Clock> Coordinator<C> {
    pub fn with_clock(partition: Partition, cadence: Cadence, clock: C) -> Self {
        let now = clock.now();
        let total = partition.remaining();
        debug!(
            total,
            stripes = partition.slot_count(),
            save_in_s = cadence.first_save.as_secs(),
            "Coordinator created"
        );
        Self {
            state: Mutex::new(State {
                partition,
                completed: 0,
                total,
                done: total == 0,
                aborted: false,
                saving: false,
                clean_stop_requested: false,
                sleeping: false,
                sent_final_save: false,
                registered: 0,
                paused: 0,
                next_save_at: now + cadence.first_save,
                next_refresh_at: now + cadence.first_refresh,
            }),
            quiescence: Condvar::new(),
            cadence,
            clock,
        }
    }

    /// Decide what `worker_id` does next.
    ///
    /// `cursor` is the worker's position in the stripe array. It is updated to
    /// the slot a coordinate was claimed from, so the next scan starts there.
    pub fn next(&self, worker_id: usize, cursor: &mut usize) -> WorkItem {
        let mut st = self.state.lock();

        if st.clean_stop_requested {
            st.clean_stop_requested = false;
            st.saving = true;
            info!(worker = worker_id, "Clean stop: saving state before shutdown");
            return WorkItem::SaveCheckpointAndStop;
        }
        if st.sleeping {
            return WorkItem::Sleep;
        }
        if st.aborted {
            return WorkItem::Stop;
        }
        if st.saving {
            return WorkItem::Pause;
        }

        let now = self.clock.now();
        if !st.done && now >= st.next_save_at {
            st.next_save_at = catch_up(st.next_save_at, now, self.cadence.save_interval);
            st.saving = true;
            debug!(worker = worker_id, "Checkpoint due");
            return WorkItem::SaveCheckpoint;
        }
        if !st.done && now >= st.next_refresh_at {
            st.next_refresh_at = catch_up(st.next_refresh_at, now, self.cadence.refresh_interval);
            let fraction = progress_of(&st).fraction();
            return WorkItem::RefreshProgress(fraction);
        }

        if st.done {
            if st.registered > 0 {
                return WorkItem::Stop;
            }
            if !st.sent_final_save {
                st.sent_final_save = true;
                debug!(worker = worker_id, "All workers retired; finalizing");
                return WorkItem::FinalizeAndStop;
            }
            return WorkItem::Stop;
        }

        match st.partition.claim_from(*cursor) {
            Some(claim) => {
                *cursor = claim.slot;
                st.completed += 1;
                if st.completed == st.total {
                    st.done = true;
                    info!(completed = st.completed, "All work units handed out");
                }
                WorkItem::ComputeUnit {
                    x: claim.x,
                    y: claim.y,
                }
            }
            None => {
                // Unreachable while the partition and counters agree.
                warn!(
                    completed = st.completed,
                    total = st.total,
                    "Stripes exhausted before the total was reached"
                );
                st.done = true;
                WorkItem::Stop
            }
        }
    }

    /// Starting cursor for `worker_id`.
    pub fn worker_offset(&self, worker_id: usize) -> usize {
        self.state.lock().partition.offset(worker_id)
    }

    // -- Worker lifecycle --

    pub fn register_worker(&self) {
        self.state.lock().registered += 1;
        self.quiescence.notify_all();
    }

    pub fn deregister_worker(&self) {
        {
            let mut st = self.state.lock();
            st.registered = st.registered.saturating_sub(1);
        }
        self.quiescence.notify_all();
    }

    /// Deregister a worker that reported itself paused, leaving both counts
    /// consistent under one lock.
    pub fn deregister_paused_worker(&self) {
        {
            let mut st = self.state.lock();
            st.registered = st.registered.saturating_sub(1);
            st.paused = st.paused.saturating_sub(1);
        }
        self.quiescence.notify_all();
    }

    /// A worker has seen a pause-class item and stopped touching shared state.
    pub fn pausing(&self) {
        self.state.lock().paused += 1;
        self.quiescence.notify_all();
    }

    /// A previously paused worker is back to normal work.
    pub fn unpausing(&self) {
        {
            let mut st = self.state.lock();
            st.paused = st.paused.saturating_sub(1);
        }
        self.quiescence.notify_all();
    }

    /// Called by the checkpointing worker once the save is complete.
    pub fn done_saving(&self) {
        self.state.lock().saving = false;
    }

    /// End a stopping save: the run is aborted in the same step that releases
    /// the paused workers, so none of them can claim a unit in between.
    pub fn finish_stopping_save(&self) {
        {
            let mut st = self.state.lock();
            st.aborted = true;
            st.saving = false;
        }
        self.quiescence.notify_all();
        info!("Abort requested after final save");
    }

    /// Block until every registered worker is paused, or the run is aborted.
    ///
    /// Wakes on every pause, registration, and abort change, and re-checks at
    /// least every `poll` in case a signal raced the wait.
    pub fn wait_for_quiescence(&self, poll: Duration) -> Quiescence {
        let mut st = self.state.lock();
        loop {
            if st.paused == st.registered {
                return Quiescence::Reached;
            }
            if st.aborted {
                return Quiescence::Aborted;
            }
            self.quiescence.wait_for(&mut st, poll);
        }
    }

    // -- Control surface --

    /// Stop handing out work. In-flight units finish; every later `next` call
    /// returns [`WorkItem::Stop`].
    pub fn request_abort(&self) {
        self.state.lock().aborted = true;
        self.quiescence.notify_all();
        info!("Abort requested");
    }

    /// Save once more, then abort.
    pub fn request_clean_stop(&self) {
        self.state.lock().clean_stop_requested = true;
        info!("Clean stop requested");
    }

    /// Make the next `next` call start a checkpoint without shifting the
    /// save cadence.
    pub fn request_save(&self) {
        let now = self.clock.now();
        let mut st = self.state.lock();
        st.next_save_at = pull_forward(st.next_save_at, now, self.cadence.save_interval);
    }

    /// Make the next `next` call report progress.
    pub fn request_refresh(&self) {
        let now = self.clock.now();
        let mut st = self.state.lock();
        st.next_refresh_at = pull_forward(st.next_refresh_at, now, self.cadence.refresh_interval);
    }

    pub fn sleep(&self) {
        self.state.lock().sleeping = true;
        info!("Workers sleeping");
    }

    pub fn wakeup(&self) {
        self.state.lock().sleeping = false;
        info!("Workers waking up");
    }

    // -- Queries --

    pub fn progress(&self) -> Progress {
        progress_of(&self.state.lock())
    }

    pub fn progress_percent(&self) -> f64 {
        self.progress().percent()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    pub fn is_saving(&self) -> bool {
        self.state.lock().saving
    }

    pub fn is_sleeping(&self) -> bool {
        self.state.lock().sleeping
    }

    pub fn registered_workers(&self) -> usize {
        self.state.lock().registered
    }

    pub fn paused_workers(&self) -> usize {
        self.state.lock().paused
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }
}

fn progress_of(st: &State) -> Progress {
    Progress {
        completed: st.completed,
        total: st.total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use orbitfarm_core::WorkRect;

    use crate::clock::ManualClock;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Cadence whose events never fire unless the clock is advanced.
    fn quiet_cadence() -> Cadence {
        Cadence {
            first_refresh: HOUR,
            ..Cadence::new(HOUR, HOUR).unwrap()
        }
    }

    fn coordinator(
        w: u32,
        h: u32,
        workers: usize,
        decorrelate: bool,
    ) -> (Coordinator<Arc<ManualClock>>, Arc<ManualClock>) {
        let rect = WorkRect::from_origin_size(0, 0, w, h).unwrap();
        let partition = Partition::build(rect, workers, decorrelate).unwrap();
        let clock = Arc::new(ManualClock::new());
        let c = Coordinator::with_clock(partition, quiet_cadence(), Arc::clone(&clock));
        for _ in 0..workers {
            c.register_worker();
        }
        (c, clock)
    }

    fn unit(item: WorkItem) -> Option<(i32, i32)> {
        match item {
            WorkItem::ComputeUnit { x, y } => Some((x, y)),
            _ => None,
        }
    }

    #[test]
    fn four_by_four_two_workers_end_to_end() {
        let (c, _clock) = coordinator(4, 4, 2, false);
        let mut cursors = [c.worker_offset(0), c.worker_offset(1)];
        assert_eq!(cursors, [0, 1]);

        let mut claims = HashSet::new();
        let mut turn = 0;
        while !c.is_done() {
            let item = c.next(turn, &mut cursors[turn]);
            let xy = unit(item).expect("only compute units before completion");
            assert!(claims.insert(xy), "{xy:?} claimed twice");
            turn ^= 1;
        }
        assert_eq!(claims.len(), 16);
        let expected: HashSet<_> = (0..4).flat_map(|x| (0..4).map(move |y| (x, y))).collect();
        assert_eq!(claims, expected);

        // Both workers are still registered: they are told to stop and retire.
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Stop);
        c.deregister_worker();
        assert_eq!(c.next(1, &mut cursors[1]), WorkItem::Stop);
        c.deregister_worker();

        // With nobody registered, exactly one finalize goes out.
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::FinalizeAndStop);
        assert_eq!(c.next(1, &mut cursors[1]), WorkItem::Stop);
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Stop);
    }

    #[test]
    fn cursor_tracks_claimed_slot() {
        let (c, _clock) = coordinator(4, 4, 2, false);
        let mut cursor = 1;
        assert_eq!(c.next(1, &mut cursor), WorkItem::ComputeUnit { x: 2, y: 0 });
        assert_eq!(cursor, 1);
    }

    #[test]
    fn abort_short_circuits_remaining_work() {
        let (c, _clock) = coordinator(10, 10, 3, true);
        let mut cursor = 0;
        assert!(unit(c.next(0, &mut cursor)).is_some());
        c.request_abort();
        for worker in 0..3 {
            for _ in 0..5 {
                assert_eq!(c.next(worker, &mut cursor), WorkItem::Stop);
            }
        }
        assert!(c.progress().completed < c.progress().total);
    }

    #[test]
    fn clean_stop_saves_then_never_hands_out_work() {
        let (c, _clock) = coordinator(8, 8, 2, false);
        let mut cursors = [0, 1];
        c.next(0, &mut cursors[0]);
        c.request_clean_stop();

        assert_eq!(c.next(1, &mut cursors[1]), WorkItem::SaveCheckpointAndStop);
        assert!(c.is_saving());
        // The other worker pauses while the save is in flight.
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Pause);

        c.pausing();
        c.pausing();
        assert_eq!(c.wait_for_quiescence(Duration::from_millis(1)), Quiescence::Reached);

        // Until the save finishes every poll pauses.
        for _ in 0..3 {
            assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Pause);
        }
        c.finish_stopping_save();
        assert!(c.is_aborted());
        assert!(!c.is_saving());
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Stop);
        for _ in 0..4 {
            for w in 0..2 {
                assert!(unit(c.next(w, &mut cursors[w])).is_none());
            }
        }
    }

    #[test]
    fn clean_stop_wins_over_sleep_and_abort() {
        let (c, _clock) = coordinator(4, 4, 1, false);
        c.sleep();
        c.request_abort();
        c.request_clean_stop();
        let mut cursor = 0;
        assert_eq!(c.next(0, &mut cursor), WorkItem::SaveCheckpointAndStop);
        // The request is consumed by the first call.
        assert_eq!(c.next(0, &mut cursor), WorkItem::Sleep);
    }

    #[test]
    fn sleep_is_idempotent_and_resumes_without_loss() {
        let (c, _clock) = coordinator(5, 3, 2, false);
        let mut cursors = [0, 1];
        let mut claims = Vec::new();
        for _ in 0..4 {
            claims.extend(unit(c.next(0, &mut cursors[0])));
        }

        c.sleep();
        for _ in 0..20 {
            assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Sleep);
            assert_eq!(c.next(1, &mut cursors[1]), WorkItem::Sleep);
        }
        assert_eq!(c.progress().completed, 4);

        c.wakeup();
        while !c.is_done() {
            for w in 0..2 {
                claims.extend(unit(c.next(w, &mut cursors[w])));
            }
        }
        let unique: HashSet<_> = claims.iter().copied().collect();
        assert_eq!(claims.len(), 15);
        assert_eq!(unique.len(), 15);
    }

    #[test]
    fn save_fires_once_and_pauses_others() {
        let (c, clock) = coordinator(6, 6, 2, false);
        let mut cursors = [0, 1];
        clock.advance(HOUR);
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::SaveCheckpoint);
        assert_eq!(c.next(1, &mut cursors[1]), WorkItem::Pause);
        assert_eq!(c.next(0, &mut cursors[0]), WorkItem::Pause);

        c.done_saving();
        // The refresh that came due at the same time fires next, then work.
        assert!(matches!(
            c.next(1, &mut cursors[1]),
            WorkItem::RefreshProgress(_)
        ));
        assert!(unit(c.next(1, &mut cursors[1])).is_some());
    }

    #[test]
    fn missed_saves_are_skipped_not_queued() {
        let (c, clock) = coordinator(6, 6, 1, false);
        let mut cursor = 0;
        // Stall across five save boundaries.
        clock.advance(HOUR * 5 + Duration::from_secs(1));
        assert_eq!(c.next(0, &mut cursor), WorkItem::SaveCheckpoint);
        c.done_saving();
        assert!(matches!(c.next(0, &mut cursor), WorkItem::RefreshProgress(_)));
        for _ in 0..5 {
            assert!(unit(c.next(0, &mut cursor)).is_some());
        }
        // Next boundary is 6h after start, not immediately.
        clock.advance(HOUR - Duration::from_secs(2));
        assert!(unit(c.next(0, &mut cursor)).is_some());
        clock.advance(Duration::from_secs(1));
        assert_eq!(c.next(0, &mut cursor), WorkItem::SaveCheckpoint);
    }

    #[test]
    fn refresh_reports_completed_fraction() {
        let (c, clock) = coordinator(2, 2, 1, false);
        let mut cursor = 0;
        c.next(0, &mut cursor);
        c.request_refresh();
        assert_eq!(c.next(0, &mut cursor), WorkItem::RefreshProgress(0.25));
        assert!(unit(c.next(0, &mut cursor)).is_some());
        clock.advance(HOUR);
        // Save takes priority over refresh when both are due.
        assert_eq!(c.next(0, &mut cursor), WorkItem::SaveCheckpoint);
    }

    #[test]
    fn request_save_fires_on_next_call() {
        let (c, _clock) = coordinator(4, 4, 1, false);
        let mut cursor = 0;
        assert!(unit(c.next(0, &mut cursor)).is_some());
        c.request_save();
        assert_eq!(c.next(0, &mut cursor), WorkItem::SaveCheckpoint);
        c.done_saving();
        assert!(unit(c.next(0, &mut cursor)).is_some());
    }

    #[test]
    fn no_saves_after_completion() {
        let (c, clock) = coordinator(1, 2, 1, false);
        let mut cursor = 0;
        c.next(0, &mut cursor);
        c.next(0, &mut cursor);
        assert!(c.is_done());
        clock.advance(HOUR * 3);
        assert_eq!(c.next(0, &mut cursor), WorkItem::Stop);
    }

    #[test]
    fn quiescence_counts_pauses_against_registrations() {
        let (c, _clock) = coordinator(4, 4, 2, false);
        let poll = Duration::from_millis(5);
        c.pausing();
        assert_eq!(c.paused_workers(), 1);
        c.pausing();
        assert_eq!(c.wait_for_quiescence(poll), Quiescence::Reached);
        c.unpausing();
        c.deregister_worker();
        assert_eq!(c.wait_for_quiescence(poll), Quiescence::Reached);
    }

    #[test]
    fn paused_worker_deregisters_without_breaking_quiescence() {
        let (c, _clock) = coordinator(4, 4, 2, false);
        c.pausing();
        c.pausing();
        c.deregister_paused_worker();
        assert_eq!(c.registered_workers(), 1);
        assert_eq!(c.paused_workers(), 1);
        assert_eq!(c.wait_for_quiescence(Duration::from_millis(1)), Quiescence::Reached);
    }

    #[test]
    fn quiescence_wait_observes_abort() {
        let (c, _clock) = coordinator(4, 4, 2, false);
        let c = Arc::new(c);
        c.pausing();
        let waiter = {
            let c = Arc::clone(&c);
            std::thread::spawn(move || c.wait_for_quiescence(Duration::from_millis(10)))
        };
        std::thread::sleep(Duration::from_millis(30));
        c.request_abort();
        assert_eq!(waiter.join().unwrap(), Quiescence::Aborted);
    }

    #[test]
    fn quiescence_wait_wakes_on_pause() {
        let (c, _clock) = coordinator(4, 4, 2, false);
        let c = Arc::new(c);
        c.pausing();
        let waiter = {
            let c = Arc::clone(&c);
            std::thread::spawn(move || c.wait_for_quiescence(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(20));
        c.pausing();
        assert_eq!(waiter.join().unwrap(), Quiescence::Reached);
    }

    #[test]
    fn progress_percent() {
        let (c, _clock) = coordinator(2, 2, 1, false);
        let mut cursor = 0;
        c.next(0, &mut cursor);
        assert!((c.progress_percent() - 25.0).abs() < 1e-12);
    }
}
