use thiserror::Error;

/// Errors raised while building the work layout. All of them are fatal at
/// startup; no partial partition is ever produced.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid work rectangle: {reason}")]
    InvalidRect { reason: String },

    #[error("invalid worker count: {0} (must be >= 1)")]
    NoWorkers(usize),

    #[error("invalid plane mapping: {reason}")]
    InvalidMapping { reason: String },
}
