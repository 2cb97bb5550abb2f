// Turns a stability value into the integer day count shown to callers.
// Fuzz only touches the interval; stability and difficulty never see it.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::fsrs::{self, Rating};
use crate::params::FsrsParameters;

pub const FUZZ_RANGE: RangeInclusive<f64> = 0.95..=1.05;

/// Source of the interval fuzz multiplier.
///
/// `seed` is derived from the review being scheduled; sources may use it to
/// make the factor reproducible or ignore it.
pub trait FuzzSource: Send + Sync {
    fn factor(&self, seed: u64) -> f64;
}

/// Draws from a `StdRng` seeded per review, so identical inputs yield the same
/// interval and previews match the committed schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeededFuzz;

impl FuzzSource for SeededFuzz {
    fn factor(&self, seed: u64) -> f64 {
        StdRng::seed_from_u64(seed).gen_range(FUZZ_RANGE)
    }
}

/// Thread-local RNG; not reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadFuzz;

impl FuzzSource for ThreadFuzz {
    fn factor(&self, _seed: u64) -> f64 {
        rand::thread_rng().gen_range(FUZZ_RANGE)
    }
}

/// Constant multiplier, clamped into [`FUZZ_RANGE`].
#[derive(Debug, Clone, Copy)]
pub struct FixedFuzz(pub f64);

impl FuzzSource for FixedFuzz {
    fn factor(&self, _seed: u64) -> f64 {
        self.0.clamp(*FUZZ_RANGE.start(), *FUZZ_RANGE.end())
    }
}

pub(crate) fn fuzz_seed(review_millis: i64, reps: u32, rating: Rating) -> u64 {
    (review_millis as u64)
        ^ (u64::from(reps) << 40)
        ^ (u64::from(rating.value()) << 56)
}

/// Interval in whole days, in `[1, maximum_interval]`.
///
/// `fuzz_factor` is applied only when the parameters enable fuzz.
pub fn next_interval(stability: f64, params: &FsrsParameters, fuzz_factor: f64) -> u32 {
    let mut raw = fsrs::raw_interval(stability, params.request_retention);
    if params.enable_fuzz {
        raw *= fuzz_factor;
    }
    let max = f64::from(params.maximum_interval);
    raw.round().clamp(1.0, max) as u32
}
