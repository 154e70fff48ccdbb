use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use orbitfarm_dispatch::CheckpointStore;

use crate::engine::HitGrid;

/// Writes the shared hit grid to the staging file.
///
/// The file is opened and closed on every persist, so nothing holds it open
/// when the finished run is moved into place.
pub struct GridStore {
    grid: Arc<HitGrid>,
    staging: PathBuf,
}

impl GridStore {
    pub fn new(grid: Arc<HitGrid>, staging: impl Into<PathBuf>) -> Self {
        Self {
            grid,
            staging: staging.into(),
        }
    }
}

impl CheckpointStore for GridStore {
    fn persist(&self) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(&self.staging)?);
        self.grid.write_le(&mut out)?;
        out.flush()?;
        debug!(path = %self.staging.display(), "Grid written");
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        self.staging.clone()
    }
}
