use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A complex number as two `f64` components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const ZERO: Self = Self { re: 0.0, im: 0.0 };

    #[inline]
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Point at `radius` from the origin, `degrees` counter-clockwise from the
    /// positive real axis.
    pub fn from_polar_degrees(radius: f64, degrees: f64) -> Self {
        let rad = degrees.to_radians();
        Self::new(radius * rad.cos(), radius * rad.sin())
    }

    /// Returns `re² + im²` without taking the square root.
    #[inline]
    pub fn norm_sq(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// Rotate about the origin by `degrees` (counter-clockwise).
    #[inline]
    pub fn rotated_degrees(self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(self.re * cos - self.im * sin, self.re * sin + self.im * cos)
    }
}

impl Add for Complex {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl std::fmt::Display for Complex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.im >= 0.0 {
            write!(f, "{} + {}i", self.re, self.im)
        } else {
            write!(f, "{} - {}i", self.re, -self.im)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn approx_eq(a: Complex, b: Complex) -> bool {
        (a.re - b.re).abs() < EPSILON && (a.im - b.im).abs() < EPSILON
    }

    #[test]
    fn multiplication() {
        // (1 + 2i)(3 + 4i) = 3 + 4i + 6i + 8i² = -5 + 10i
        let a = Complex::new(1.0, 2.0);
        let b = Complex::new(3.0, 4.0);
        assert!(approx_eq(a * b, Complex::new(-5.0, 10.0)));
    }

    #[test]
    fn polar_quarter_turn() {
        let p = Complex::from_polar_degrees(2.0, 90.0);
        assert!(approx_eq(p, Complex::new(0.0, 2.0)));
    }

    #[test]
    fn rotation_round_trips() {
        let z = Complex::new(0.3, -1.7);
        let back = z.rotated_degrees(37.0).rotated_degrees(-37.0);
        assert!(approx_eq(z, back));
    }

    #[test]
    fn display_formatting() {
        assert_eq!(format!("{}", Complex::new(1.0, 2.0)), "1 + 2i");
        assert_eq!(format!("{}", Complex::new(1.0, -2.0)), "1 - 2i");
    }
}
