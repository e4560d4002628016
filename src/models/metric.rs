use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::enums::{MetricStatus, RiskLevel, Trend, VisualIndicator};

/// Leading number the way lab values are usually written ("12.5 mg/dL", "-3").
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([-+]?(?:\d+(?:\.\d*)?|\.\d+))").unwrap());

/// Digits grouped in thousands with commas ("150,000", "1,250,000").
static DIGIT_GROUPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:,\d{3})+\b").unwrap());

/// A lab value: numeric when the report value is a plain number, otherwise the
/// original text ("Positive", "<0.5", "1+").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Convert text to a number only when the whole (trimmed) string is one.
    /// Anything else keeps the original text untouched.
    pub fn from_text(raw: &str) -> Self {
        match strip_digit_grouping(raw.trim()).parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Numeric reading of the value. Text values yield their leading number, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) => None,
            Self::Text(text) => parse_leading_number(text),
        }
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

/// Parse the number a string starts with, ignoring trailing units or flags.
pub fn parse_leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(&strip_digit_grouping(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Drop thousands separators so "150,000" reads as 150000. A lone comma
/// that isn't a thousands group ("1,5") is left alone.
pub fn strip_digit_grouping(text: &str) -> Cow<'_, str> {
    DIGIT_GROUPS.replace_all(text, |caps: &regex::Captures| caps[0].replace(',', ""))
}

/// One dated observation of a metric, oldest first in `HealthMetric::history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub value: f64,
}

/// One lab parameter as written in the source report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetric {
    pub name: String,
    pub value: MetricValue,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub status: MetricStatus,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub visual_indicator: VisualIndicator,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Level the model claimed before reconciliation; kept for transparency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub trend: Trend,
    #[serde(default)]
    pub history: Vec<HistoryPoint>,
}

impl HealthMetric {
    pub fn new(name: &str, value: MetricValue, unit: &str, range: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            status: MetricStatus::Normal,
            range: range.to_string(),
            description: String::new(),
            category: OTHER_CATEGORY.to_string(),
            visual_indicator: VisualIndicator::Unflagged,
            risk_level: RiskLevel::Normal,
            reported_risk_level: None,
            trend: Trend::Stable,
            history: Vec::new(),
        }
    }

    /// Set the risk level and keep `status` consistent with it.
    pub fn set_risk_level(&mut self, level: RiskLevel) {
        self.risk_level = level;
        self.status = MetricStatus::from(level);
    }

    /// Append an observation; history is append-only.
    pub fn push_history(&mut self, date: &str, value: f64) {
        self.history.push(HistoryPoint {
            date: date.to_string(),
            value,
        });
    }

    /// Display label used in risk summaries: `Name (value unit)`.
    pub fn summary_label(&self) -> String {
        let value = self.value.to_string();
        let unit = self.unit.trim();
        if unit.is_empty() {
            format!("{} ({})", self.name, value)
        } else {
            format!("{} ({} {})", self.name, value, unit)
        }
    }
}

/// Category assigned when the model gives none.
pub const OTHER_CATEGORY: &str = "Other";
