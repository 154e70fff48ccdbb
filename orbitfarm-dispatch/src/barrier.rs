use parking_lot::{Mutex, MutexGuard};

/// Whether save/finalize work may still run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    Armed,
    Fired,
}

/// One-shot gate around the checkpoint sequence.
///
/// Its mutex is separate from the coordinator's, so deciding whether a save
/// may run never blocks ordinary dispatch. Holding a [`BarrierTicket`] is the
/// only way to touch the shared store, and only while the gate is armed; once
/// a ticket is fired no further ticket can be issued.
#[derive(Debug)]
pub struct CheckpointBarrier {
    state: Mutex<BarrierState>,
}

/// Exclusive access to the checkpoint sequence, held for its whole duration.
#[must_use = "dropping the ticket releases the barrier immediately"]
pub struct BarrierTicket<'a> {
    guard: MutexGuard<'a, BarrierState>,
}

impl CheckpointBarrier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BarrierState::Armed),
        }
    }

    /// Enter the barrier if it is still armed. Blocks while another worker
    /// holds a ticket; returns `None` once the barrier has fired.
    pub fn try_enter(&self) -> Option<BarrierTicket<'_>> {
        let guard = self.state.lock();
        match *guard {
            BarrierState::Armed => Some(BarrierTicket { guard }),
            BarrierState::Fired => None,
        }
    }

    pub fn state(&self) -> BarrierState {
        *self.state.lock()
    }
}

impl Default for CheckpointBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierTicket<'_> {
    /// Close the barrier for good.
    pub fn fire(mut self) {
        *self.guard = BarrierState::Fired;
    }
}
