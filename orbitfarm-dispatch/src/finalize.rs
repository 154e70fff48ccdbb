//! Final artifact naming, run summary, and promotion of the staging file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::error::DispatchError;

/// Where finished runs go and what their summary says.
#[derive(Debug, Clone)]
pub struct ArtifactPlan {
    pub output_dir: PathBuf,
    pub prefix: String,
    /// `(key, value)` lines written to the summary file, in order.
    pub summary: Vec<(String, String)>,
}

impl ArtifactPlan {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            summary: Vec::new(),
        }
    }

    pub fn with_line(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.summary.push((key.into(), value.to_string()));
        self
    }
}

/// The numbered file set of one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub index: u32,
    pub data: PathBuf,
    pub image: PathBuf,
    pub summary: PathBuf,
}

impl ArtifactNames {
    pub fn for_index(dir: &Path, prefix: &str, index: u32) -> Self {
        let stem = format!("{prefix}_{index:04}");
        Self {
            index,
            data: dir.join(format!("{stem}.dat")),
            image: dir.join(format!("{stem}.png")),
            summary: dir.join(format!("{stem}.txt")),
        }
    }

    fn any_exists(&self) -> bool {
        self.data.exists() || self.image.exists() || self.summary.exists()
    }
}

/// First index whose data, image, and summary names are all unused.
pub fn next_free_names(dir: &Path, prefix: &str) -> ArtifactNames {
    let mut index = 0u32;
    loop {
        let names = ArtifactNames::for_index(dir, prefix, index);
        if !names.any_exists() || index == u32::MAX {
            return names;
        }
        index += 1;
    }
}

/// Write the run summary as `Key: value` lines.
pub fn write_summary(path: &Path, plan: &ArtifactPlan, run_time: Duration) -> std::io::Result<()> {
    let finished = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut text = String::new();
    let _ = writeln!(text, "Finished (unix): {finished}");
    for (key, value) in &plan.summary {
        let _ = writeln!(text, "{key}: {value}");
    }
    let _ = writeln!(text, "Run time: {:.1}s", run_time.as_secs_f64());
    std::fs::write(path, text)
}

/// Move `from` to `to`, retrying every `backoff`.
///
/// Succeeds as soon as `to` exists. A missing `from` is waited for, since the
/// engine may still be producing it; after `timeout` the move fails with
/// [`DispatchError::StagingTimeout`].
pub fn promote_staging(
    from: &Path,
    to: &Path,
    backoff: Duration,
    timeout: Duration,
) -> crate::Result<()> {
    let start = Instant::now();
    loop {
        if to.exists() {
            return Ok(());
        }
        if from.exists() {
            match std::fs::rename(from, to) {
                Ok(()) => return Ok(()),
                Err(e) => debug!("Rename {} -> {} failed, retrying: {e}", from.display(), to.display()),
            }
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(DispatchError::StagingTimeout {
                path: from.to_path_buf(),
                waited,
            });
        }
        std::thread::sleep(backoff);
    }
}

/// Pick the output names, write the summary, and promote the staging file.
pub fn finish_run(
    plan: &ArtifactPlan,
    staging: &Path,
    run_time: Duration,
    backoff: Duration,
    timeout: Duration,
) -> crate::Result<ArtifactNames> {
    std::fs::create_dir_all(&plan.output_dir)?;
    let names = next_free_names(&plan.output_dir, &plan.prefix);
    write_summary(&names.summary, plan, run_time)?;
    promote_staging(staging, &names.data, backoff, timeout)?;
    info!(
        index = names.index,
        data = %names.data.display(),
        "Final artifact written"
    );
    Ok(names)
}
