/// The next thing a worker should do, as decided by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkItem {
    /// Run the compute engine for one coordinate.
    ComputeUnit { x: i32, y: i32 },
    /// Report progress; the payload is the completed fraction in `[0, 1]`.
    RefreshProgress(f64),
    /// Another worker is checkpointing; stay off shared state.
    Pause,
    /// The run is put to sleep; idle until woken.
    Sleep,
    /// Persist a checkpoint, then resume.
    SaveCheckpoint,
    /// Persist a checkpoint, then shut the run down.
    SaveCheckpointAndStop,
    /// All work is done; write the final artifact.
    FinalizeAndStop,
    /// Leave the dispatch loop.
    Stop,
}

impl WorkItem {
    /// Pause-class items make the receiving worker count as quiescent.
    #[inline]
    pub fn is_pause_class(&self) -> bool {
        matches!(
            self,
            Self::Pause | Self::SaveCheckpoint | Self::SaveCheckpointAndStop
        )
    }

    /// Items that must go through the checkpoint barrier.
    #[inline]
    pub fn needs_barrier(&self) -> bool {
        matches!(
            self,
            Self::SaveCheckpoint | Self::SaveCheckpointAndStop | Self::FinalizeAndStop
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ComputeUnit { .. } => "compute",
            Self::RefreshProgress(_) => "refresh",
            Self::Pause => "pause",
            Self::Sleep => "sleep",
            Self::SaveCheckpoint => "save",
            Self::SaveCheckpointAndStop => "save-and-stop",
            Self::FinalizeAndStop => "finalize",
            Self::Stop => "stop",
        }
    }
}
