//! Seams to the external collaborators: the per-coordinate compute engine and
//! the storage that checkpoints are written to.

use std::io;
use std::path::PathBuf;

/// Does the actual work for one coordinate.
///
/// Each worker owns one accumulator for its whole life. The engine is shared by
/// reference across workers, so anything it keeps outside the accumulators
/// must be synchronised by the engine itself.
pub trait ComputeEngine: Sync {
    type Accumulator;

    fn create_accumulator(&self) -> Self::Accumulator;

    /// Process one coordinate into `acc`.
    fn compute_unit(&self, x: i32, y: i32, acc: &mut Self::Accumulator);

    /// Move everything buffered in `acc` into the shared store.
    /// `final_flush` is set when no more work will follow.
    fn flush_accumulator(&self, acc: &mut Self::Accumulator, final_flush: bool);
}

/// Durable storage for the shared store.
pub trait CheckpointStore: Sync {
    /// Write the shared store to the staging artifact.
    fn persist(&self) -> io::Result<()>;

    /// Release any handle on the staging artifact so it can be moved.
    fn close(&self) -> io::Result<()>;

    /// Where [`persist`](Self::persist) writes.
    fn staging_path(&self) -> PathBuf;
}
