use crate::rect::WorkRect;

/// A contiguous run of coordinates in column-major order.
///
/// The stripe starts at `(x, y)` and owns the next `remaining` coordinates,
/// walking down the column and wrapping to the top of the next one at
/// `rect.max_y`. Claiming consumes coordinates from the front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stripe {
    pub x: i32,
    pub y: i32,
    pub remaining: u64,
    /// Ordering key used when stripes are shuffled.
    pub sort_key: f64,
}

/// What a single claim produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub x: i32,
    pub y: i32,
    /// `true` when this claim consumed the stripe's last coordinate.
    pub retired: bool,
}

impl Stripe {
    /// Take the front coordinate and advance.
    ///
    /// Must not be called on an exhausted stripe; the partition removes a
    /// stripe as soon as a claim reports `retired`.
    #[inline]
    pub fn claim(&mut self, rect: &WorkRect) -> Claim {
        debug_assert!(self.remaining > 0, "claim on an exhausted stripe");
        let claim = Claim {
            x: self.x,
            y: self.y,
            retired: self.remaining == 1,
        };
        self.remaining -= 1;
        if self.remaining > 0 {
            if self.y >= rect.max_y {
                self.y = rect.min_y;
                self.x += 1;
            } else {
                self.y += 1;
            }
        }
        claim
    }
}
