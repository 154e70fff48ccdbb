use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::error::CoreError;
use crate::mapping::PlaneMapping;

/// Centre of the closed curve sampled by [`WorkRect::expanded_to_boundary`].
pub const BOUNDARY_CENTER: Complex = Complex { re: -0.5, im: 0.0 };
/// Radius of the sampled curve; it encloses every orbit that matters.
pub const BOUNDARY_RADIUS: f64 = 1.6;

/// An inclusive, axis-aligned integer rectangle `[min_x, max_x] × [min_y, max_y]`.
///
/// Every coordinate in it is handed out to exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl WorkRect {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> crate::Result<Self> {
        if max_x < min_x || max_y < min_y {
            return Err(CoreError::InvalidRect {
                reason: format!("empty rectangle [{min_x}, {max_x}] × [{min_y}, {max_y}]"),
            });
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Rectangle of `width × height` pixels whose top-left corner is `(x, y)`.
    pub fn from_origin_size(x: i32, y: i32, width: u32, height: u32) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidRect {
                reason: format!("dimensions must be > 0, got {width}×{height}"),
            });
        }
        let max_x = x as i64 + width as i64 - 1;
        let max_y = y as i64 + height as i64 - 1;
        if max_x > i32::MAX as i64 || max_y > i32::MAX as i64 {
            return Err(CoreError::InvalidRect {
                reason: format!("{width}×{height} at ({x}, {y}) overflows the coordinate range"),
            });
        }
        Self::new(x, y, max_x as i32, max_y as i32)
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> u64 {
        (self.max_x as i64 - self.min_x as i64 + 1) as u64
    }

    /// Number of rows; also the length of one column in column-major order.
    #[inline]
    pub fn height(&self) -> u64 {
        (self.max_y as i64 - self.min_y as i64 + 1) as u64
    }

    /// Total number of coordinates.
    #[inline]
    pub fn area(&self) -> u64 {
        self.width() * self.height()
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Coordinate at column-major position `index` (x outer, y inner).
    ///
    /// `index` must be below [`area`](Self::area).
    #[inline]
    pub fn coord_at(&self, index: u64) -> (i32, i32) {
        let h = self.height();
        let x = self.min_x as i64 + (index / h) as i64;
        let y = self.min_y as i64 + (index % h) as i64;
        (x as i32, y as i32)
    }

    /// Grow the rectangle so it covers the image of the boundary circle
    /// (radius [`BOUNDARY_RADIUS`] around [`BOUNDARY_CENTER`]) under `mapping`.
    ///
    /// Orbit-tracing engines can deposit hits anywhere inside that curve, so
    /// their starting points must include pixels outside the visible image.
    /// The circle is sampled once per whole degree.
    pub fn expanded_to_boundary(self, mapping: &PlaneMapping) -> Self {
        let mut out = self;
        for deg in 0..360 {
            let z = BOUNDARY_CENTER + Complex::from_polar_degrees(BOUNDARY_RADIUS, deg as f64);
            let (x, y) = mapping.complex_to_pixel(z);
            out.min_x = out.min_x.min(x);
            out.min_y = out.min_y.min(y);
            out.max_x = out.max_x.max(x);
            out.max_y = out.max_y.max(y);
        }
        out
    }
}
