//! Spatial partitioning of the work rectangle into stripes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::CoreError;
use crate::rect::WorkRect;
use crate::stripe::{Claim, Stripe};

/// Over-partitioning factor used when decorrelating.
pub const STRIPES_PER_WORKER: usize = 25;
/// Seed for the stripe shuffle, fixed so layouts are reproducible.
pub const SHUFFLE_SEED: u64 = 1234;

/// The stripe array plus the data needed to pick per-worker starting points.
///
/// Slots are fixed at construction. A slot becomes `None` when its stripe
/// retires and is never refilled, so the array is never resized.
#[derive(Debug, Clone)]
pub struct Partition {
    rect: WorkRect,
    slots: Vec<Option<Stripe>>,
    stride: usize,
    live: usize,
}

/// A claimed coordinate together with the slot it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClaim {
    pub slot: usize,
    pub x: i32,
    pub y: i32,
}

impl Partition {
    /// Split `rect` into stripes for `workers` workers with the default seed.
    pub fn build(rect: WorkRect, workers: usize, decorrelate: bool) -> crate::Result<Self> {
        Self::build_seeded(rect, workers, decorrelate, SHUFFLE_SEED)
    }

    /// Split `rect` into stripes for `workers` workers.
    ///
    /// Without `decorrelate` there is one stripe per worker, in column-major
    /// order. With it there are `workers * 25`, shuffled by a seeded random
    /// key so neighbouring stripes rarely run side by side. Stripe sizes differ
    /// by at most one coordinate. A rectangle with fewer coordinates than
    /// requested stripes gets one stripe per coordinate.
    pub fn build_seeded(
        rect: WorkRect,
        workers: usize,
        decorrelate: bool,
        seed: u64,
    ) -> crate::Result<Self> {
        if workers == 0 {
            return Err(CoreError::NoWorkers(workers));
        }
        let stride = if decorrelate { STRIPES_PER_WORKER } else { 1 };
        let area = rect.area();
        let requested = workers
            .checked_mul(stride)
            .ok_or(CoreError::NoWorkers(workers))? as u64;
        let count = requested.min(area);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut slots = Vec::with_capacity(count as usize);
        for k in 0..count {
            let start = split_point(k, area, count);
            let end = split_point(k + 1, area, count);
            let (x, y) = rect.coord_at(start);
            let sort_key = if decorrelate { rng.gen::<f64>() } else { k as f64 };
            slots.push(Some(Stripe {
                x,
                y,
                remaining: end - start,
                sort_key,
            }));
        }

        if decorrelate {
            slots.sort_by(|a, b| match (a, b) {
                (Some(a), Some(b)) => a.sort_key.total_cmp(&b.sort_key),
                _ => std::cmp::Ordering::Equal,
            });
        }

        debug!(
            stripes = slots.len(),
            workers,
            decorrelate,
            area,
            "Partitioned work rectangle"
        );

        let live = slots.len();
        Ok(Self {
            rect,
            slots,
            stride,
            live,
        })
    }

    pub fn rect(&self) -> &WorkRect {
        &self.rect
    }

    /// Number of slots, live or retired.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of stripes that still own coordinates.
    pub fn live_stripes(&self) -> usize {
        self.live
    }

    pub fn slots(&self) -> &[Option<Stripe>] {
        &self.slots
    }

    /// Sum of `remaining` over every live stripe.
    pub fn remaining(&self) -> u64 {
        self.slots.iter().flatten().map(|s| s.remaining).sum()
    }

    /// Slot index a worker starts scanning from.
    ///
    /// Distinct for every worker as long as the rectangle had room for the
    /// full stripe count.
    pub fn offset(&self, worker_id: usize) -> usize {
        if self.slots.is_empty() {
            return 0;
        }
        worker_id.wrapping_mul(self.stride) % self.slots.len()
    }

    /// Claim one coordinate from the first live slot at or after `cursor`,
    /// scanning circularly. Returns `None` once every stripe has retired.
    pub fn claim_from(&mut self, cursor: usize) -> Option<SlotClaim> {
        let n = self.slots.len();
        if self.live == 0 || n == 0 {
            return None;
        }
        for i in 0..n {
            let slot = (cursor % n + i) % n;
            if let Some(stripe) = self.slots[slot].as_mut() {
                let Claim { x, y, retired } = stripe.claim(&self.rect);
                if retired {
                    self.slots[slot] = None;
                    self.live -= 1;
                }
                return Some(SlotClaim { slot, x, y });
            }
        }
        None
    }
}

/// Column-major index where stripe `k` of `count` begins.
#[inline]
fn split_point(k: u64, area: u64, count: u64) -> u64 {
    ((k as u128 * area as u128) / count as u128) as u64
}
