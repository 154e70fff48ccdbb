use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use orbitfarm_core::{Complex, PlaneMapping, WorkRect};
use orbitfarm_dispatch::{ArtifactPlan, Cadence};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Render mode
// ---------------------------------------------------------------------------

/// What the reference engine accumulates per coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Replay orbits that escape.
    #[default]
    Buddhabrot,
    /// Replay orbits that stay bounded.
    AntiBuddhabrot,
    /// Store each pixel's escape count.
    Mandelbrot,
}

impl RenderMode {
    /// Orbit modes write far from the pixel they start at, so neighbouring
    /// stripes are shuffled apart to spread the contention.
    pub fn decorrelate(self) -> bool {
        !matches!(self, RenderMode::Mandelbrot)
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderMode::Buddhabrot => "Buddhabrot",
            RenderMode::AntiBuddhabrot => "Anti-Buddhabrot",
            RenderMode::Mandelbrot => "Mandelbrot",
        }
    }
}

// ---------------------------------------------------------------------------
// Run settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Top-left pixel of the view window (Mandelbrot mode only).
    #[serde(default)]
    pub view_off_x: u32,
    #[serde(default)]
    pub view_off_y: u32,
    #[serde(default = "default_width")]
    pub view_width: u32,
    #[serde(default = "default_height")]
    pub view_height: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default = "default_center_re")]
    pub center_re: f64,
    #[serde(default)]
    pub center_im: f64,
    /// Complex-plane width of the image.
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default)]
    pub rotate_degrees: f64,
    #[serde(default = "default_save_secs")]
    pub save_secs: u64,
    #[serde(default = "default_draw_secs")]
    pub draw_secs: u64,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    #[serde(default = "default_staging_file")]
    pub staging_file: String,
    /// Align the first save to the next half-hour boundary.
    #[serde(default = "default_true")]
    pub align_saves: bool,
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_iterations() -> u32 {
    1000
}
fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_center_re() -> f64 {
    -0.5
}
fn default_size() -> f64 {
    4.0
}
fn default_save_secs() -> u64 {
    1800
}
fn default_draw_secs() -> u64 {
    15
}
fn default_output_prefix() -> String {
    "OrbitFarm".to_string()
}
fn default_staging_file() -> String {
    "DataDump.dat".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            view_off_x: 0,
            view_off_y: 0,
            view_width: default_width(),
            view_height: default_height(),
            iterations: default_iterations(),
            threads: default_threads(),
            mode: RenderMode::default(),
            center_re: default_center_re(),
            center_im: 0.0,
            size: default_size(),
            rotate_degrees: 0.0,
            save_secs: default_save_secs(),
            draw_secs: default_draw_secs(),
            output_prefix: default_output_prefix(),
            staging_file: default_staging_file(),
            align_saves: true,
        }
    }
}

/// Result of [`RunSettings::load_or_create`].
#[derive(Debug)]
pub enum Loaded {
    Existing(RunSettings),
    /// No file was found; one with defaults was written at this path.
    Created(PathBuf),
}

impl RunSettings {
    /// Read settings from `path`, or write a default file there if none exists.
    pub fn load_or_create(path: &Path) -> Result<Loaded, AppError> {
        if !path.exists() {
            debug!("No settings file at {}", path.display());
            Self::default().save(path)?;
            return Ok(Loaded::Created(path.to_path_buf()));
        }
        let json = fs::read_to_string(path).map_err(|source| AppError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings =
            serde_json::from_str(&json).map_err(|source| AppError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Loaded settings from {}", path.display());
        Ok(Loaded::Existing(settings))
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let io_err = |source: std::io::Error| AppError::SettingsIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| AppError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Reject settings the run cannot start with.
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: String| Err(AppError::InvalidSettings(msg));
        if self.width == 0 || self.height == 0 {
            return invalid(format!("image is {}×{}", self.width, self.height));
        }
        // Pixel coordinates are `i32`.
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return invalid(format!(
                "image {}×{} exceeds {} pixels per side",
                self.width,
                self.height,
                i32::MAX
            ));
        }
        if self.threads == 0 {
            return invalid("threads must be >= 1".into());
        }
        if self.iterations == 0 {
            return invalid("iterations must be >= 1".into());
        }
        if self.save_secs == 0 || self.draw_secs == 0 {
            return invalid("save_secs and draw_secs must be >= 1".into());
        }
        if self.mode == RenderMode::Mandelbrot {
            let right = u64::from(self.view_off_x) + u64::from(self.view_width);
            let bottom = u64::from(self.view_off_y) + u64::from(self.view_height);
            if self.view_width == 0
                || self.view_height == 0
                || right > u64::from(self.width)
                || bottom > u64::from(self.height)
            {
                return invalid(format!(
                    "view {}×{} at ({}, {}) does not fit the {}×{} image",
                    self.view_width,
                    self.view_height,
                    self.view_off_x,
                    self.view_off_y,
                    self.width,
                    self.height
                ));
            }
        }
        if self.output_prefix.is_empty() || self.staging_file.is_empty() {
            return invalid("output_prefix and staging_file must not be empty".into());
        }
        Ok(())
    }

    pub fn mapping(&self) -> Result<PlaneMapping, AppError> {
        Ok(PlaneMapping::new(
            Complex::new(self.center_re, self.center_im),
            self.size,
            self.rotate_degrees,
            self.width,
            self.height,
        )?)
    }

    /// Coordinates the workers iterate over.
    ///
    /// Mandelbrot mode covers the view window. Orbit modes start from the full
    /// image widened to the set's bounding circle, since orbits seeded outside
    /// the image still land inside it.
    pub fn work_rect(&self, mapping: &PlaneMapping) -> Result<WorkRect, AppError> {
        match self.mode {
            RenderMode::Mandelbrot => {
                let offset = |v: u32| {
                    i32::try_from(v).map_err(|_| {
                        AppError::InvalidSettings(format!("view offset {v} exceeds {}", i32::MAX))
                    })
                };
                Ok(WorkRect::from_origin_size(
                    offset(self.view_off_x)?,
                    offset(self.view_off_y)?,
                    self.view_width,
                    self.view_height,
                )?)
            }
            RenderMode::Buddhabrot | RenderMode::AntiBuddhabrot => {
                let image = WorkRect::from_origin_size(0, 0, self.width, self.height)?;
                Ok(image.expanded_to_boundary(mapping))
            }
        }
    }

    pub fn cadence(&self, now: SystemTime) -> Result<Cadence, AppError> {
        let cadence = Cadence::new(
            Duration::from_secs(self.save_secs),
            Duration::from_secs(self.draw_secs),
        )?;
        Ok(if self.align_saves {
            cadence.aligned_to(now)
        } else {
            cadence
        })
    }

    /// Output naming plus the lines of the run summary.
    pub fn artifact_plan(&self, output_dir: &Path) -> ArtifactPlan {
        ArtifactPlan::new(output_dir, self.output_prefix.clone())
            .with_line("Size", format!("{}×{}", self.width, self.height))
            .with_line(
                "View",
                format!(
                    "center {}{:+}i, size {}, rotate {}°",
                    self.center_re, self.center_im, self.size, self.rotate_degrees
                ),
            )
            .with_line(
                "View offset",
                format!(
                    "({}, {}) {}×{}",
                    self.view_off_x, self.view_off_y, self.view_width, self.view_height
                ),
            )
            .with_line("Iterations", self.iterations)
            .with_line("Threads", self.threads)
            .with_line("Mode", self.mode.label())
    }
}

/// Directory the staging file and artifacts live in: the settings file's own.
pub fn run_directory(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
