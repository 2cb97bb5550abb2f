// FSRS memory model: forgetting curve, stability and difficulty updates.
// Difficulty lives on [-5, 5]; higher is harder, negative is easier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

type R = f64;
type S = f64;
type D = f64;
type T = f64;

pub const WEIGHT_COUNT: usize = 19;

pub type Weights = [f64; WEIGHT_COUNT];

/// Forgetting-curve exponent. Fixed; not part of the tunable parameters.
pub const DECAY: f64 = -0.5;

/// `0.9^(1/DECAY) - 1`, i.e. 19/81. Stays fixed when the retention target changes.
pub const FACTOR: f64 = 19.0 / 81.0;

pub const MIN_STABILITY: S = 0.1;
pub const MIN_DIFFICULTY: D = -5.0;
pub const MAX_DIFFICULTY: D = 5.0;

/// Stand-in base for the `d^(-w12)` lapse term when difficulty is not positive.
const FORGET_DIFFICULTY_EPSILON: D = 1e-3;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn from_u8(n: u8) -> Option<Rating> {
        match n {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }
}

impl From<Rating> for f64 {
    fn from(g: Rating) -> f64 {
        f64::from(g.value())
    }
}

impl From<Rating> for u8 {
    fn from(g: Rating) -> u8 {
        g.value()
    }
}

impl TryFrom<u8> for Rating {
    type Error = SchedulerError;

    fn try_from(n: u8) -> Result<Rating> {
        Rating::from_u8(n).ok_or_else(|| SchedulerError::InvalidRating(n.to_string()))
    }
}

impl FromStr for Rating {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Rating> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Rating::try_from(n);
        }
        match s.to_ascii_lowercase().as_str() {
            "again" => Ok(Rating::Again),
            "hard" => Ok(Rating::Hard),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            _ => Err(SchedulerError::InvalidRating(s.to_string())),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn retrievability(t: T, s: S) -> R {
    (1.0 + FACTOR * (t / s)).powf(DECAY)
}

/// Unrounded interval in days at which recall probability falls to `retention`.
pub fn raw_interval(s: S, retention: f64) -> T {
    (s / FACTOR) * (retention.powf(1.0 / DECAY) - 1.0)
}

pub fn init_stability(w: &Weights, g: Rating) -> S {
    let s = match g {
        Rating::Again => w[0],
        Rating::Hard => w[1],
        Rating::Good => w[2],
        Rating::Easy => w[3],
    };
    f64::max(s, MIN_STABILITY)
}

pub fn init_difficulty(w: &Weights, g: Rating) -> D {
    let g: f64 = g.into();
    clamp_d(w[4] - f64::exp(w[5] * (g - 1.0)) + 1.0)
}

fn clamp_d(d: D) -> D {
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn mean_reversion(w: &Weights, init: D, current: D) -> D {
    w[7] * init + (1.0 - w[7]) * current
}

fn delta_d(w: &Weights, g: Rating) -> f64 {
    let g: f64 = g.into();
    -w[6] * (g - 3.0)
}

fn dp(w: &Weights, d: D, g: Rating) -> f64 {
    d + delta_d(w, g) * ((10.0 - d) / 9.0)
}

pub fn next_difficulty(w: &Weights, d: D, g: Rating) -> D {
    clamp_d(mean_reversion(w, init_difficulty(w, g), dp(w, d, g)))
}

pub fn next_recall_stability(w: &Weights, d: D, s: S, r: R, g: Rating) -> S {
    let t_d = 11.0 - d;
    let t_s = s.powf(-w[9]);
    let t_r = f64::exp(w[10] * (1.0 - r)) - 1.0;
    let h = if g == Rating::Hard { w[15] } else { 1.0 };
    let b = if g == Rating::Easy { w[16] } else { 1.0 };
    let c = f64::exp(w[8]);
    let alpha = 1.0 + t_d * t_s * t_r * h * b * c;
    round2(s * alpha).max(MIN_STABILITY)
}

/// Post-lapse stability. Never exceeds the pre-lapse stability `s`.
pub fn next_forget_stability(w: &Weights, d: D, s: S, r: R) -> S {
    let base = if d > 0.0 { d } else { FORGET_DIFFICULTY_EPSILON };
    let d_f = base.powf(-w[12]);
    let s_f = (s + 1.0).powf(w[13]) - 1.0;
    let r_f = f64::exp(w[14] * (1.0 - r));
    let c_f = w[11];
    let capped = f64::min(d_f * s_f * r_f * c_f, s);
    round2(capped).min(s).max(MIN_STABILITY.min(s))
}

pub(crate) fn ensure_finite(quantity: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SchedulerError::NonFinite { quantity, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DEFAULT_WEIGHTS;

    const W: Weights = DEFAULT_WEIGHTS;

    #[test]
    fn retrievability_at_zero() {
        let r = retrievability(0.0, 1.0);
        assert!((r - 1.0).abs() < 1e-10);
    }

    #[test]
    fn factor_matches_curve_definition() {
        let derived = 0.9f64.powf(1.0 / DECAY) - 1.0;
        assert!((derived - FACTOR).abs() < 1e-12);
    }

    #[test]
    fn retrievability_at_stability_is_ninety_percent() {
        let r = retrievability(7.0, 7.0);
        assert!((r - 0.9).abs() < 1e-10);
    }

    #[test]
    fn interval_roundtrip() {
        // For retention 0.9, the raw interval equals the stability
        let s = 5.0;
        let i = raw_interval(s, 0.9);
        assert!((i - s).abs() < 1e-10);
    }

    #[test]
    fn lower_retention_lengthens_interval() {
        assert!(raw_interval(5.0, 0.8) > raw_interval(5.0, 0.9));
        assert!(raw_interval(5.0, 0.95) < raw_interval(5.0, 0.9));
    }

    #[test]
    fn init_stability_uses_first_four_weights() {
        assert_eq!(init_stability(&W, Rating::Again), W[0]);
        assert_eq!(init_stability(&W, Rating::Hard), W[1]);
        assert_eq!(init_stability(&W, Rating::Good), W[2]);
        assert_eq!(init_stability(&W, Rating::Easy), W[3]);
    }

    #[test]
    fn init_stability_has_floor() {
        let mut w = W;
        w[0] = 0.01;
        assert_eq!(init_stability(&w, Rating::Again), MIN_STABILITY);
    }

    #[test]
    fn init_difficulty_values() {
        assert_eq!(init_difficulty(&W, Rating::Again), MAX_DIFFICULTY);
        assert_eq!(init_difficulty(&W, Rating::Good), MAX_DIFFICULTY);
        let easy = init_difficulty(&W, Rating::Easy);
        assert!((easy - 3.2245).abs() < 1e-3, "easy = {easy}");
    }

    #[test]
    fn mean_reversion_weights_init() {
        let mut w = W;
        w[7] = 0.5;
        assert!((mean_reversion(&w, 4.0, 0.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn stability_increases_on_good() {
        let d = 0.0;
        let s = 3.0;
        let r = retrievability(s, s); // r = 0.9 at t = s
        let new_s = next_recall_stability(&W, d, s, r, Rating::Good);
        assert!(new_s > s);
    }

    #[test]
    fn hard_penalty_and_easy_bonus_order() {
        let (d, s) = (0.0, 3.0);
        let r = retrievability(s, s);
        let hard = next_recall_stability(&W, d, s, r, Rating::Hard);
        let good = next_recall_stability(&W, d, s, r, Rating::Good);
        let easy = next_recall_stability(&W, d, s, r, Rating::Easy);
        assert!(hard < good);
        assert!(good < easy);
    }

    #[test]
    fn recall_stability_unchanged_at_full_retrievability() {
        let new_s = next_recall_stability(&W, 2.0, 3.17, 1.0, Rating::Good);
        assert!((new_s - 3.17).abs() < 1e-9);
    }

    #[test]
    fn recall_stability_is_rounded() {
        let new_s = next_recall_stability(&W, 1.3, 4.321, 0.87, Rating::Good);
        assert!(((new_s * 100.0).round() - new_s * 100.0).abs() < 1e-6);
    }

    #[test]
    fn stability_decreases_on_again() {
        let d = 0.0;
        let s = 3.0;
        let r = retrievability(s, s);
        let new_s = next_forget_stability(&W, d, s, r);
        assert!(new_s < s);
        assert!(new_s > 0.0);
    }

    #[test]
    fn forget_stability_never_exceeds_prior() {
        for d in [-5.0, -1.0, 0.0, 0.5, 2.0, 5.0] {
            for s in [0.1, 0.4, 3.0, 50.0, 9000.0] {
                for r in [0.0, 0.3, 0.9, 1.0] {
                    let new_s = next_forget_stability(&W, d, s, r);
                    assert!(new_s <= s, "d={d} s={s} r={r} -> {new_s}");
                    assert!(new_s.is_finite() && new_s > 0.0);
                }
            }
        }
    }

    #[test]
    fn forget_stability_uses_difficulty_below_one() {
        assert_eq!(next_forget_stability(&W, 0.5, 10.0, 0.5), 6.73);
        let lower = next_forget_stability(&W, 0.2, 10.0, 0.5);
        assert!(lower > 6.73, "lower = {lower}");
    }

    #[test]
    fn forget_stability_non_positive_difficulty_is_finite() {
        for d in [0.0, -0.5, -5.0] {
            let s = next_forget_stability(&W, d, 10.0, 0.5);
            assert!(s.is_finite() && s > 0.0 && s <= 10.0, "d={d} -> {s}");
        }
    }

    #[test]
    fn forget_stability_rounded_after_cap() {
        assert_eq!(next_forget_stability(&W, 5.0, 0.40255, 0.0), 0.4);
        assert_eq!(next_forget_stability(&W, 5.0, 0.40255, 1.0), 0.17);
    }

    #[test]
    fn recall_stability_not_capped() {
        let new_s = next_recall_stability(&W, -5.0, 30_000.0, 0.5, Rating::Easy);
        assert!(new_s > 36_500.0, "new_s = {new_s}");
        assert!(new_s.is_finite());
    }

    #[test]
    fn difficulty_clamped() {
        // Repeated again should not push difficulty above the ceiling
        let mut d = init_difficulty(&W, Rating::Again);
        for _ in 0..100 {
            d = next_difficulty(&W, d, Rating::Again);
        }
        assert!(d <= MAX_DIFFICULTY);
        assert!(d >= MIN_DIFFICULTY);

        // Repeated easy should not push difficulty below the floor
        let mut d = init_difficulty(&W, Rating::Easy);
        for _ in 0..100 {
            d = next_difficulty(&W, d, Rating::Easy);
        }
        assert!(d >= MIN_DIFFICULTY);
        assert!(d <= MAX_DIFFICULTY);
    }

    #[test]
    fn easy_lowers_difficulty_again_raises_it() {
        let d = 0.0;
        assert!(next_difficulty(&W, d, Rating::Easy) < d);
        assert!(next_difficulty(&W, d, Rating::Again) > d);
    }

    #[test]
    fn rating_conversions() {
        assert_eq!(Rating::from_u8(3), Some(Rating::Good));
        assert_eq!(Rating::from_u8(0), None);
        assert!(matches!(
            Rating::try_from(5),
            Err(SchedulerError::InvalidRating(_))
        ));
        assert_eq!("Easy".parse::<Rating>().unwrap(), Rating::Easy);
        assert_eq!(" 2 ".parse::<Rating>().unwrap(), Rating::Hard);
        assert!("meh".parse::<Rating>().is_err());
        assert!(Rating::Again < Rating::Easy);
        assert_eq!(f64::from(Rating::Hard), 2.0);
    }

    #[test]
    fn rating_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Rating::Good).unwrap(), "3");
        let g: Rating = serde_json::from_str("1").unwrap();
        assert_eq!(g, Rating::Again);
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }
}
