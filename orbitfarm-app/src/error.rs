use std::path::PathBuf;

use thiserror::Error;

use orbitfarm_core::CoreError;
use orbitfarm_dispatch::DispatchError;

/// Everything that can stop the runner before or while it starts the pool.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to access settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("worker pool thread panicked")]
    PoolPanicked,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
