//! Numeric risk banding: value against reference range.
//!
//! Deviation is measured as a percentage of the range width (two-sided
//! ranges) or of the bound's magnitude (single-bound ranges such as
//! `< 150`). Anything that can't be scored is `normal`.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{strip_digit_grouping, MetricValue, RiskLevel};

/// Deviation (percent) above which an out-of-range value is high risk.
const HIGH_DEVIATION_PCT: f64 = 50.0;
/// Deviation (percent) above which an out-of-range value is medium risk.
const MEDIUM_DEVIATION_PCT: f64 = 20.0;

static TWO_SIDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*[^\d\s.\-–]*?\s*(?:-|–|to)\s*(-?\d+(?:\.\d+)?)").unwrap()
});

static SINGLE_BOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(<=|≤|<|>=|≥|>|up to|less than|below|under|greater than|more than|above|over)\s*(-?\d+(?:\.\d+)?)",
    )
    .unwrap()
});

/// Parsed reference interval. At least one bound is present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRange {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ReferenceRange {
    pub fn between(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn at_most(upper: f64) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
        }
    }

    pub fn at_least(lower: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower.map_or(true, |lo| value >= lo) && self.upper.map_or(true, |hi| value <= hi)
    }

    /// Percent deviation outside the range, `None` when inside or when the
    /// denominator is zero.
    pub fn deviation_pct(&self, value: f64) -> Option<f64> {
        if self.contains(value) {
            return None;
        }
        let scale = match (self.lower, self.upper) {
            (Some(lo), Some(hi)) if hi > lo => hi - lo,
            (Some(lo), Some(_)) => lo.abs(),
            (Some(lo), None) => lo.abs(),
            (None, Some(hi)) => hi.abs(),
            (None, None) => return None,
        };
        if scale <= 0.0 {
            return None;
        }
        let distance = match (self.lower, self.upper) {
            (Some(lo), _) if value < lo => lo - value,
            (_, Some(hi)) => value - hi,
            _ => return None,
        };
        Some(distance / scale * 100.0)
    }
}

/// Parse a free-form reference range.
///
/// Accepts `min - max` (with units or an en dash or `to` between the bounds)
/// and the single-bound forms `< x`, `<= x`, `up to x`, `> x`, `>= x`.
/// Thousands separators are dropped first (`150,000 - 450,000`).
/// Returns `None` for non-numeric ranges such as `Negative`.
pub fn parse_reference_range(range: &str) -> Option<ReferenceRange> {
    let lowered = strip_digit_grouping(range.trim()).to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if let Some(caps) = SINGLE_BOUND.captures(&lowered) {
        let bound: f64 = caps[2].parse().ok()?;
        return match &caps[1] {
            "<=" | "≤" | "<" | "up to" | "less than" | "below" | "under" => {
                Some(ReferenceRange::at_most(bound))
            }
            _ => Some(ReferenceRange::at_least(bound)),
        };
    }

    let caps = TWO_SIDED.captures(&lowered)?;
    let lower: f64 = caps[1].parse().ok()?;
    let upper: f64 = caps[2].parse().ok()?;
    if !lower.is_finite() || !upper.is_finite() || lower > upper {
        return None;
    }
    Some(ReferenceRange::between(lower, upper))
}

fn band(deviation_pct: f64) -> RiskLevel {
    if deviation_pct > HIGH_DEVIATION_PCT {
        RiskLevel::High
    } else if deviation_pct > MEDIUM_DEVIATION_PCT {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Score a value against a range, `None` when either side can't be read.
pub fn try_classify(value: &MetricValue, range: &str) -> Option<RiskLevel> {
    let number = value.as_number()?;
    let range = parse_reference_range(range)?;
    if range.contains(number) {
        return Some(RiskLevel::Normal);
    }
    range.deviation_pct(number).map(band)
}

/// Total classifier: unscoreable input is `normal`.
pub fn classify(value: &MetricValue, range: &str) -> RiskLevel {
    try_classify(value, range).unwrap_or(RiskLevel::Normal)
}
