//! Reference compute engine: escape-time and orbit-density accumulation into
//! a shared count grid.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use orbitfarm_core::{Complex, PlaneMapping};
use orbitfarm_dispatch::ComputeEngine;

use crate::settings::RenderMode;

/// Squared escape radius (radius 2).
pub const ESCAPE_RADIUS_SQ: f64 = 4.0;

/// Buffered entries per worker before an early flush.
const FLUSH_THRESHOLD: usize = 1 << 16;

// ---------------------------------------------------------------------------
// Hit grid
// ---------------------------------------------------------------------------

/// `width × height` counters shared by every worker, row-major.
#[derive(Debug)]
pub struct HitGrid {
    width: u32,
    height: u32,
    counts: Mutex<Vec<u32>>,
}

impl HitGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            counts: Mutex::new(vec![0; width as usize * height as usize]),
        }
    }

    /// Row-major index of `(x, y)`, or `None` outside the image.
    #[inline]
    pub fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn add_hits(&self, indices: &[usize]) {
        let mut counts = self.counts.lock();
        for &i in indices {
            if let Some(c) = counts.get_mut(i) {
                *c = c.saturating_add(1);
            }
        }
    }

    pub fn set_values(&self, values: &[(usize, u32)]) {
        let mut counts = self.counts.lock();
        for &(i, v) in values {
            if let Some(c) = counts.get_mut(i) {
                *c = v;
            }
        }
    }

    /// Write every counter as little-endian `u32`, row by row.
    pub fn write_le<W: Write>(&self, mut out: W) -> io::Result<()> {
        let counts = self.counts.lock();
        for c in counts.iter() {
            out.write_all(&c.to_le_bytes())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Iterations until `z → z² + c` leaves the escape radius, or `max_iterations`.
pub fn escape_time(c: Complex, max_iterations: u32) -> u32 {
    let mut z = Complex::ZERO;
    for n in 1..=max_iterations {
        z = z * z + c;
        if z.norm_sq() > ESCAPE_RADIUS_SQ {
            return n;
        }
    }
    max_iterations
}

/// Record the bounded part of the orbit of `c` into `orbit` and report whether
/// it escaped.
pub fn trace_orbit(c: Complex, max_iterations: u32, orbit: &mut Vec<Complex>) -> bool {
    orbit.clear();
    let mut z = Complex::ZERO;
    for _ in 0..max_iterations {
        z = z * z + c;
        if z.norm_sq() > ESCAPE_RADIUS_SQ {
            return true;
        }
        orbit.push(z);
    }
    false
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One worker's unflushed output.
#[derive(Debug, Default)]
pub struct OrbitAccumulator {
    hits: Vec<usize>,
    values: Vec<(usize, u32)>,
    orbit: Vec<Complex>,
}

impl OrbitAccumulator {
    pub fn pending(&self) -> usize {
        self.hits.len() + self.values.len()
    }
}

pub struct OrbitEngine {
    mapping: PlaneMapping,
    mode: RenderMode,
    iterations: u32,
    grid: Arc<HitGrid>,
}

impl OrbitEngine {
    pub fn new(mapping: PlaneMapping, mode: RenderMode, iterations: u32, grid: Arc<HitGrid>) -> Self {
        Self {
            mapping,
            mode,
            iterations,
            grid,
        }
    }
}

impl ComputeEngine for OrbitEngine {
    type Accumulator = OrbitAccumulator;

    fn create_accumulator(&self) -> OrbitAccumulator {
        OrbitAccumulator::default()
    }

    fn compute_unit(&self, x: i32, y: i32, acc: &mut OrbitAccumulator) {
        let c = self.mapping.pixel_to_complex(x, y);
        match self.mode {
            RenderMode::Mandelbrot => {
                if let Some(i) = self.grid.index_of(x, y) {
                    acc.values.push((i, escape_time(c, self.iterations)));
                }
            }
            RenderMode::Buddhabrot | RenderMode::AntiBuddhabrot => {
                let mut orbit = std::mem::take(&mut acc.orbit);
                let escaped = trace_orbit(c, self.iterations, &mut orbit);
                if escaped == (self.mode == RenderMode::Buddhabrot) {
                    for &z in &orbit {
                        let (px, py) = self.mapping.complex_to_pixel(z);
                        if let Some(i) = self.grid.index_of(px, py) {
                            acc.hits.push(i);
                        }
                    }
                }
                acc.orbit = orbit;
            }
        }
        if acc.pending() >= FLUSH_THRESHOLD {
            self.flush_accumulator(acc, false);
        }
    }

    fn flush_accumulator(&self, acc: &mut OrbitAccumulator, _final_flush: bool) {
        if !acc.hits.is_empty() {
            self.grid.add_hits(&acc.hits);
            acc.hits.clear();
        }
        if !acc.values.is_empty() {
            self.grid.set_values(&acc.values);
            acc.values.clear();
        }
    }
}
