pub mod complex;
pub mod error;
pub mod mapping;
pub mod partition;
pub mod rect;
pub mod stripe;
pub mod work_item;

// Re-export primary types for convenience.
pub use complex::Complex;
pub use error::CoreError;
pub use mapping::PlaneMapping;
pub use partition::{Partition, SlotClaim, SHUFFLE_SEED, STRIPES_PER_WORKER};
pub use rect::WorkRect;
pub use stripe::{Claim, Stripe};
pub use work_item::WorkItem;

/// Convenience result type for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
