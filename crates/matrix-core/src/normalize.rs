//! Log-compressed min/max normalization into `[0, 1]`.
//!
//! The decision oracle was fit against exactly these transforms, so they are
//! kept as plain `f64` arithmetic with no reordering.

use serde::{Deserialize, Serialize};

/// Normalize a non-negative count.
///
/// Zero is replaced by one in `value`, `min` and `max` before taking the
/// natural log. The log value is clamped to the log bounds and rescaled
/// linearly.
pub fn normalize_count(value: f64, min: f64, max: f64) -> f64 {
    let ln_or_zero = |x: f64| if x == 0.0 { 1.0_f64.ln() } else { x.ln() };

    let lo = ln_or_zero(min);
    let hi = ln_or_zero(max);
    let v = ln_or_zero(value).clamp(lo, hi);

    (v - lo) / (hi - lo)
}

/// Normalize a signed ratio-of-change metric (>= -1).
///
/// Uses `ln(x + 2)` so the "no prior activity" floor of -1 maps to `ln 1`.
pub fn normalize_delta(value: f64, min: f64, max: f64) -> f64 {
    let lo = (min + 2.0).ln();
    let hi = (max + 2.0).ln();
    let v = (value + 2.0).ln().clamp(lo, hi);

    (v - lo) / (hi - lo)
}

/// Round to two decimal places.
///
/// The decision is made on the exact binary value of `x`, not on `x * 100.0`,
/// and exact ties go to the even hundredth: `0.125` rounds to `0.12`, while
/// `2.675` (stored just below the tie) rounds to `2.67`.
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }

    let bits = x.to_bits();
    let negative = bits >> 63 == 1;
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if biased == 0 {
        (frac, -1074)
    } else {
        (frac | (1u64 << 52), biased - 1075)
    };
    if exponent >= 0 {
        return x;
    }

    // |x| * 100 == scaled / 2^shift exactly
    let shift = exponent.unsigned_abs();
    let scaled = u128::from(mantissa) * 100;
    let cents = if shift > 64 {
        // scaled < 2^60, so the value is below half a cent
        0
    } else {
        let whole = scaled >> shift;
        let rem = scaled & ((1u128 << shift) - 1);
        let half = 1u128 << (shift - 1);
        if rem > half || (rem == half && (whole & 1) == 1) {
            whole + 1
        } else {
            whole
        }
    };

    let rounded = cents as f64 / 100.0;
    if negative {
        -rounded
    } else {
        rounded
    }
}

/// A calibrated `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn count(&self, value: f64) -> f64 {
        normalize_count(value, self.min, self.max)
    }

    pub fn delta(&self, value: f64) -> f64 {
        normalize_delta(value, self.min, self.max)
    }

    /// Whether these bounds give a non-degenerate count transform.
    pub fn valid_for_count(&self) -> bool {
        let sub = |x: f64| if x == 0.0 { 1.0 } else { x };
        self.min >= 0.0 && sub(self.max) > sub(self.min)
    }

    /// Whether these bounds give a non-degenerate delta transform.
    pub fn valid_for_delta(&self) -> bool {
        self.min > -2.0 && self.max > self.min
    }
}
