use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors originating from the dispatch layer.
///
/// Only construction can fail with most of these; once workers are running,
/// failures are logged and retried rather than returned.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid cadence: {reason}")]
    InvalidCadence { reason: String },

    #[error("staging artifact {} did not appear within {waited:?}", path.display())]
    StagingTimeout { path: PathBuf, waited: Duration },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] orbitfarm_core::CoreError),
}
