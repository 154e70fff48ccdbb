pub mod barrier;
pub mod cadence;
pub mod clock;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod pool;
pub mod shutdown;
pub mod worker;

pub use barrier::{BarrierState, BarrierTicket, CheckpointBarrier};
pub use cadence::Cadence;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use coordinator::{Coordinator, Progress, Quiescence};
pub use dispatcher::{DispatchTiming, Dispatcher};
pub use engine::{CheckpointStore, ComputeEngine};
pub use error::DispatchError;
pub use finalize::{ArtifactNames, ArtifactPlan};
pub use pool::{run, RunReport};
pub use shutdown::ShutdownTimer;
pub use worker::{WorkerPhase, WorkerReport};

/// Convenience result type for the dispatch crate.
pub type Result<T> = std::result::Result<T, DispatchError>;
