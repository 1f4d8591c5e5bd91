//! Percentage rendering of a coverage ratio.

use std::fmt;

/// Coverage ratio rendered as a whole percent, rounding half up.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Percentage {
    pub fn from_ratio(ratio: f64) -> Self {
        Self(ratio)
    }

    pub fn ratio(&self) -> f64 {
        self.0
    }

    /// Whole percent, rounded half up.
    ///
    /// The scaled value is first snapped to six decimals so that ratios like
    /// 0.595, stored as 0.59499999..., still land on the half and round to 60.
    pub fn whole_percent(&self) -> i64 {
        if !self.0.is_finite() {
            return 0;
        }
        let scaled = ((self.0 * 100.0) * 1e6).round() / 1e6;
        scaled.round() as i64
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.whole_percent())
    }
}
