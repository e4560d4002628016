//! Back-fill of required prose fields and per-metric normalization of the
//! model's loosely typed output.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{
    parse_leading_number, HealthMetric, HistoryPoint, MetricStatus, MetricValue, PatientInfo,
    RiskLevel, Trend, VisualIndicator, OTHER_CATEGORY,
};
use crate::pipeline::risk;

/// Prose shorter than this is replaced by the fallback text.
pub const MIN_PROSE_CHARS: usize = 50;

pub const FALLBACK_SUMMARY: &str = "Your blood test results have been analyzed. Most values \
should be reviewed together with your healthcare provider, who can interpret them in the \
context of your medical history.";

pub const FALLBACK_DETAILED_ANALYSIS: &str = "The report contains several laboratory \
measurements. Values outside their reference ranges are highlighted with their risk level. \
A single out-of-range value is not necessarily a cause for concern, but persistent or \
significant deviations should be discussed with a doctor.";

pub const FALLBACK_RECOMMENDATIONS: [&str; 3] = [
    "Discuss these results with your healthcare provider.",
    "Maintain a balanced diet and regular physical activity.",
    "Schedule regular follow-up tests to monitor any changes.",
];

pub const UNKNOWN_METRIC_NAME: &str = "Unknown";

/// camelCase keys of `PatientInfo`, in `PatientInfo::fields_mut` order.
const PATIENT_KEYS: [&str; 9] = [
    "name",
    "age",
    "gender",
    "dateOfBirth",
    "patientId",
    "collectionDate",
    "reportDate",
    "doctorName",
    "hospitalName",
];

/// Scalar JSON value as trimmed text. Empty strings, null, arrays and
/// objects give `None`.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// List of strings from an array (non-string items stringified), or a
/// single-string field.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_to_string).collect(),
        Some(other) => value_to_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Keep `text` when it is long enough, otherwise use `fallback`.
pub fn backfill_prose(text: Option<String>, fallback: &str, field: &str) -> String {
    match text {
        Some(t) if t.trim().chars().count() >= MIN_PROSE_CHARS => t.trim().to_string(),
        _ => {
            tracing::warn!(field, "Response field missing or too short, using fallback");
            fallback.to_string()
        }
    }
}

pub fn backfill_recommendations(recommendations: Vec<String>) -> Vec<String> {
    if recommendations.is_empty() {
        tracing::warn!("Response has no recommendations, using fallback list");
        return FALLBACK_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect();
    }
    recommendations
}

/// Distinct categories in metric order.
pub fn derive_categories(metrics: &[HealthMetric]) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();
    for metric in metrics {
        if !categories.contains(&metric.category) {
            categories.push(metric.category.clone());
        }
    }
    categories
}

/// Lenient patient header: known keys only, scalar values, placeholders dropped.
pub fn parse_patient_info(value: &Value) -> Option<PatientInfo> {
    let object = value.as_object()?;
    let mut info = PatientInfo::default();
    for (slot, key) in info.fields_mut().into_iter().zip(PATIENT_KEYS) {
        *slot = object.get(key).and_then(value_to_string);
    }
    let info = info.without_placeholders();
    (!info.is_empty()).then_some(info)
}

/// Risk level implied by the model's own flags.
///
/// Status `high_risk` or indicator `H`/`↑` is high; `medium_risk` or `M` is
/// medium; `low_risk` or `L`/`↓` is low; otherwise the declared level, or
/// normal.
pub fn reconcile_risk_level(
    status: Option<MetricStatus>,
    indicator: VisualIndicator,
    declared: Option<RiskLevel>,
) -> RiskLevel {
    let implied = indicator.implied_risk();
    if status == Some(MetricStatus::HighRisk) || implied == Some(RiskLevel::High) {
        RiskLevel::High
    } else if status == Some(MetricStatus::MediumRisk) || implied == Some(RiskLevel::Medium) {
        RiskLevel::Medium
    } else if status == Some(MetricStatus::LowRisk) || implied == Some(RiskLevel::Low) {
        RiskLevel::Low
    } else {
        declared.unwrap_or(RiskLevel::Normal)
    }
}

/// One metric exactly as the model sent it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMetric {
    pub name: Option<Value>,
    pub value: Option<Value>,
    pub unit: Option<Value>,
    pub status: Option<Value>,
    pub range: Option<Value>,
    pub description: Option<Value>,
    pub category: Option<Value>,
    pub visual_indicator: Option<Value>,
    pub risk_level: Option<Value>,
    pub trend: Option<Value>,
    pub history: Option<Value>,
}

fn text_field(value: &Option<Value>) -> Option<String> {
    value.as_ref().and_then(value_to_string)
}

fn metric_value(value: Option<Value>) -> MetricValue {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(MetricValue::Number)
            .unwrap_or_else(|| MetricValue::Text(n.to_string())),
        Some(Value::String(s)) => MetricValue::from_text(s.trim()),
        Some(other) => value_to_string(&other)
            .map(MetricValue::Text)
            .unwrap_or_default(),
        None => MetricValue::default(),
    }
}

fn history_points(value: Option<&Value>) -> Vec<HistoryPoint> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let date = item.get("date").and_then(value_to_string)?;
            let value = match item.get("value")? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => parse_leading_number(s),
                _ => None,
            }?;
            Some(HistoryPoint { date, value })
        })
        .collect()
}

impl RawMetric {
    /// Normalize into a `HealthMetric` with a reconciled risk level.
    ///
    /// When the value can be scored against the range, the numeric
    /// classifier decides the risk level; the model's own level is kept in
    /// `reported_risk_level`. `status` always follows the final level.
    pub fn into_metric(self) -> HealthMetric {
        let name = text_field(&self.name).unwrap_or_else(|| UNKNOWN_METRIC_NAME.to_string());
        let unit = text_field(&self.unit).unwrap_or_default();
        let range = text_field(&self.range).unwrap_or_default();

        let mut metric = HealthMetric::new(&name, metric_value(self.value), &unit, &range);
        metric.description = text_field(&self.description).unwrap_or_default();
        metric.category =
            text_field(&self.category).unwrap_or_else(|| OTHER_CATEGORY.to_string());
        metric.history = history_points(self.history.as_ref());

        let status = text_field(&self.status).and_then(|s| MetricStatus::parse_label(&s));
        metric.visual_indicator = text_field(&self.visual_indicator)
            .and_then(|s| VisualIndicator::parse_label(&s))
            .unwrap_or(VisualIndicator::Unflagged);
        let declared = text_field(&self.risk_level).and_then(|s| RiskLevel::parse_label(&s));
        metric.trend = text_field(&self.trend)
            .and_then(|s| Trend::parse_label(&s))
            .unwrap_or(Trend::Stable);

        let model_level = reconcile_risk_level(status, metric.visual_indicator, declared);
        let model_supplied = status.is_some()
            || declared.is_some()
            || metric.visual_indicator != VisualIndicator::Unflagged;

        let final_level = match risk::try_classify(&metric.value, &metric.range) {
            Some(level) => {
                if model_supplied && level != model_level {
                    tracing::debug!(
                        model_level = %model_level,
                        numeric_level = %level,
                        "Numeric classification overrides model risk level"
                    );
                }
                level
            }
            None => model_level,
        };

        metric.set_risk_level(final_level);
        metric.reported_risk_level = model_supplied.then_some(model_level);
        metric
    }
}
