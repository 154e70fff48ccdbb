use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::error::CoreError;

/// Maps image pixels to the complex plane and back.
///
/// The image is `width × height` pixels and spans `size` complex-plane units
/// horizontally, centred on `center` and rotated counter-clockwise by
/// `rotate_degrees`. Pixel `(0, 0)` is the top-left corner; increasing pixel-y
/// moves toward decreasing imaginary part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneMapping {
    pub center: Complex,
    pub size: f64,
    pub rotate_degrees: f64,
    pub width: u32,
    pub height: u32,
}

impl PlaneMapping {
    pub fn new(
        center: Complex,
        size: f64,
        rotate_degrees: f64,
        width: u32,
        height: u32,
    ) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidMapping {
                reason: format!("dimensions must be > 0, got {width}×{height}"),
            });
        }
        if size <= 0.0 || !size.is_finite() {
            return Err(CoreError::InvalidMapping {
                reason: format!("size must be positive and finite, got {size}"),
            });
        }
        if !rotate_degrees.is_finite() {
            return Err(CoreError::InvalidMapping {
                reason: format!("rotation must be finite, got {rotate_degrees}"),
            });
        }
        Ok(Self {
            center,
            size,
            rotate_degrees,
            width,
            height,
        })
    }

    /// Complex-plane units per pixel.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.size / self.width as f64
    }

    /// Map a pixel to the complex-plane point at its top-left corner.
    #[inline]
    pub fn pixel_to_complex(&self, px: i32, py: i32) -> Complex {
        let scale = self.scale();
        let local = Complex::new(
            (px as f64 - self.width as f64 / 2.0) * scale,
            -(py as f64 - self.height as f64 / 2.0) * scale,
        );
        local.rotated_degrees(self.rotate_degrees) + self.center
    }

    /// Map a complex-plane point to the nearest pixel.
    ///
    /// Points far outside the image saturate at the `i32` range instead of
    /// wrapping.
    #[inline]
    pub fn complex_to_pixel(&self, z: Complex) -> (i32, i32) {
        let scale = self.scale();
        let local = (z - self.center).rotated_degrees(-self.rotate_degrees);
        let px = self.width as f64 / 2.0 + local.re / scale;
        let py = self.height as f64 / 2.0 - local.im / scale;
        (px.round() as i32, py.round() as i32)
    }
}
