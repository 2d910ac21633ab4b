//! Player influence (score) in fixed-point units

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Influence stored as thousandths of a point.
///
/// Integer units keep weighted sums exact, so two tallies of `0.3 + 0.1` and
/// `0.4` compare equal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Influence(pub i64);

impl Influence {
    pub const ZERO: Influence = Influence(0);
    pub const UNITS_PER_POINT: i64 = 1000;

    /// Build from a decimal point value, rounding to the nearest unit
    pub fn from_points(points: f64) -> Self {
        Influence((points * Self::UNITS_PER_POINT as f64).round() as i64)
    }

    pub fn as_points(&self) -> f64 {
        self.0 as f64 / Self::UNITS_PER_POINT as f64
    }

    pub fn units(&self) -> i64 {
        self.0
    }
}

impl Add for Influence {
    type Output = Influence;

    fn add(self, rhs: Self) -> Self::Output {
        Influence(self.0 + rhs.0)
    }
}

impl fmt::Display for Influence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.as_points())
    }
}
