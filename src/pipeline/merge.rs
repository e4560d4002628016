//! De-duplication of metrics across analyses of the same report, patient
//! header merging, and trend history from earlier stored reports.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    is_placeholder, HealthMetric, HistoryPoint, PatientInfo, StoredReport, Trend, OTHER_CATEGORY,
};

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-_:/,.()]+").unwrap());

/// Synonyms collapsed onto one spelling. Applied in order, first occurrence only.
const SYNONYMS: &[(&str, &str)] = &[
    ("hemoglobina", "hemoglobin"),
    ("triglycerides", "triglyceride"),
    ("lymphocytes", "lymphocyte"),
    ("neutrophils", "neutrophil"),
    ("platelets", "platelet"),
    ("sodium", "na"),
    ("potassium", "k"),
    ("chloride", "cl"),
    ("calcium", "ca"),
    ("totalbilirubin", "bilirubintotal"),
    ("directbilirubin", "bilirubindirect"),
    ("sgot", "ast"),
    ("sgpt", "alt"),
];

const UNSPECIFIED_RANGE: &str = "not specified";

/// Merge-matching key for a metric name. Never shown to the user.
pub fn canonical_key(name: &str) -> String {
    let mut key = SEPARATORS
        .replace_all(&name.to_lowercase(), "")
        .into_owned();
    for (from, to) in SYNONYMS {
        if key.contains(from) {
            key = key.replacen(from, to, 1);
        }
    }
    key
}

fn is_unspecified_range(range: &str) -> bool {
    let trimmed = range.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNSPECIFIED_RANGE)
}

fn is_generic_category(category: &str) -> bool {
    let trimmed = category.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(OTHER_CATEGORY)
}

/// Fold `incoming` into `base`, keeping the more detailed value per field.
fn merge_into(base: &mut HealthMetric, incoming: &HealthMetric) {
    if incoming.description.chars().count() > base.description.chars().count() {
        base.description = incoming.description.clone();
    }

    if is_generic_category(&base.category) && !is_generic_category(&incoming.category) {
        base.category = incoming.category.clone();
    }

    if !is_unspecified_range(&incoming.range)
        && (is_unspecified_range(&base.range)
            || incoming.range.trim().len() > base.range.trim().len())
    {
        base.range = incoming.range.clone();
    }

    if base.unit.trim().is_empty() && !incoming.unit.trim().is_empty() {
        base.unit = incoming.unit.clone();
    }

    for point in &incoming.history {
        if !base.history.contains(point) {
            base.history.push(point.clone());
        }
    }
}

/// Merge several metric lists into one, de-duplicated by canonical name.
///
/// Output order is first occurrence; the first-seen metric keeps its value
/// and risk, later duplicates only contribute more detailed fields.
/// Metrics with a blank name are dropped.
pub fn merge_metrics(lists: &[Vec<HealthMetric>]) -> Vec<HealthMetric> {
    let mut merged: Vec<HealthMetric> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for metric in lists.iter().flatten() {
        if metric.name.trim().is_empty() {
            continue;
        }
        let key = canonical_key(&metric.name);
        match index.get(&key) {
            Some(&pos) => merge_into(&mut merged[pos], metric),
            None => {
                index.insert(key, merged.len());
                merged.push(metric.clone());
            }
        }
    }

    merged
}

/// De-duplicate a single list.
pub fn dedupe_metrics(metrics: Vec<HealthMetric>) -> Vec<HealthMetric> {
    let before = metrics.len();
    let merged = merge_metrics(&[metrics]);
    if merged.len() < before {
        tracing::debug!(before, after = merged.len(), "Collapsed duplicate metrics");
    }
    merged
}

/// Merge patient headers field by field, keeping the longest real value.
///
/// `preferred_name` (supplied by the user) wins over any extracted name.
/// Returns `None` when nothing usable remains.
pub fn merge_patient_info(
    infos: &[PatientInfo],
    preferred_name: Option<&str>,
) -> Option<PatientInfo> {
    let mut merged = PatientInfo::default();

    for info in infos {
        for (slot, candidate) in merged.fields_mut().into_iter().zip(info.fields()) {
            let Some(value) = candidate.as_deref().map(str::trim) else {
                continue;
            };
            if is_placeholder(value) {
                continue;
            }
            let longer = slot
                .as_deref()
                .map_or(true, |current| value.chars().count() > current.chars().count());
            if longer {
                *slot = Some(value.to_string());
            }
        }
    }

    if let Some(name) = preferred_name.map(str::trim).filter(|n| !is_placeholder(n)) {
        merged.name = Some(name.to_string());
    }

    (!merged.is_empty()).then_some(merged)
}

/// True when both reports carry the same patient name (case-insensitive).
pub fn same_patient(a: Option<&PatientInfo>, b: Option<&PatientInfo>) -> bool {
    let name = |info: Option<&PatientInfo>| {
        info.and_then(|i| i.name.as_deref())
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
    };
    match (name(a), name(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Date label for a stored report: collection date, report date, or the
/// day it was saved.
fn report_date(report: &StoredReport) -> String {
    report
        .result
        .patient_info
        .as_ref()
        .and_then(|p| p.collection_date.clone().or_else(|| p.report_date.clone()))
        .unwrap_or_else(|| {
            chrono::DateTime::from_timestamp_millis(report.timestamp)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        })
}

fn trend_between(previous: f64, current: f64) -> Trend {
    let tolerance = previous.abs().max(current.abs()) * 1e-6;
    if current > previous + tolerance {
        Trend::Increasing
    } else if current < previous - tolerance {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Fill each metric's history from earlier reports, oldest first, and set
/// its trend from the most recent earlier value.
///
/// History points already on the metric are kept after the stored ones.
pub fn attach_history(metrics: &mut [HealthMetric], earlier: &[StoredReport]) {
    let mut ordered: Vec<&StoredReport> = earlier.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);

    let mut points: HashMap<String, Vec<HistoryPoint>> = HashMap::new();
    for report in ordered {
        let date = report_date(report);
        for metric in &report.result.metrics {
            if let Some(value) = metric.value.as_number() {
                points
                    .entry(canonical_key(&metric.name))
                    .or_default()
                    .push(HistoryPoint {
                        date: date.clone(),
                        value,
                    });
            }
        }
    }

    for metric in metrics.iter_mut() {
        let Some(stored) = points.get(&canonical_key(&metric.name)) else {
            continue;
        };

        if let (Some(last), Some(current)) = (stored.last(), metric.value.as_number()) {
            metric.trend = trend_between(last.value, current);
        }

        let mut history = stored.clone();
        for point in metric.history.drain(..) {
            if !history.iter().any(|p| p.date == point.date) {
                history.push(point);
            }
        }
        metric.history = history;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, MetricValue};

    fn metric(name: &str, value: f64, range: &str) -> HealthMetric {
        HealthMetric::new(name, MetricValue::Number(value), "g/dL", range)
    }

    fn stored(id: &str, timestamp: i64, date: &str, metrics: Vec<HealthMetric>) -> StoredReport {
        StoredReport {
            id: id.into(),
            timestamp,
            result: AnalysisResult {
                patient_info: Some(PatientInfo {
                    name: Some("Jane Doe".into()),
                    collection_date: Some(date.into()),
                    ..Default::default()
                }),
                metrics,
                summary: String::new(),
                detailed_analysis: String::new(),
                recommendations: vec![],
                categories: vec![],
                risk_summary: None,
                model_used: None,
            },
        }
    }

    #[test]
    fn canonical_key_strips_separators() {
        assert_eq!(canonical_key("Vitamin B-12"), "vitaminb12");
        assert_eq!(canonical_key("T.S.H (Ultra)"), "tshultra");
        assert_eq!(canonical_key("  LDL_Cholesterol: "), "ldlcholesterol");
    }

    #[test]
    fn canonical_key_applies_synonyms() {
        assert_eq!(canonical_key("Hemoglobina"), "hemoglobin");
        assert_eq!(canonical_key("Hemoglobin"), "hemoglobin");
        assert_eq!(canonical_key("SGOT"), "ast");
        assert_eq!(canonical_key("Serum Sodium"), "serumna");
        assert_eq!(canonical_key("Total Bilirubin"), "bilirubintotal");
        assert_eq!(canonical_key("Platelets Count"), "plateletcount");
    }

    #[test]
    fn synonym_collapse_merges_entries() {
        let merged = merge_metrics(&[vec![
            metric("Hemoglobin", 13.0, "12-16"),
            metric("Hemoglobina", 13.2, "12 - 16 g/dL"),
        ]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "Hemoglobin");
        assert_eq!(merged[0].value, MetricValue::Number(13.0));
        assert_eq!(merged[0].range, "12 - 16 g/dL");
    }

    #[test]
    fn merging_list_with_itself_is_identity() {
        let mut a = metric("ALT", 30.0, "7-56");
        a.description = "Liver enzyme".into();
        a.category = "Liver".into();
        a.push_history("2024-01-01", 28.0);
        let list = vec![a, metric("Glucose", 95.0, "70-100")];

        let merged = merge_metrics(&[list.clone(), list.clone()]);
        assert_eq!(merged, list);
    }

    #[test]
    fn more_detailed_fields_win() {
        let mut first = metric("LDL", 160.0, "Not specified");
        first.description = "LDL".into();
        let mut second = metric("ldl", 161.0, "< 130");
        second.description = "Low-density lipoprotein cholesterol".into();
        second.category = "Lipids".into();

        let merged = merge_metrics(&[vec![first], vec![second]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].range, "< 130");
        assert_eq!(merged[0].category, "Lipids");
        assert_eq!(merged[0].description, "Low-density lipoprotein cholesterol");
        assert_eq!(merged[0].value, MetricValue::Number(160.0));
    }

    #[test]
    fn specific_category_not_replaced_by_other() {
        let mut first = metric("TSH", 2.0, "0.4-4.0");
        first.category = "Thyroid".into();
        let second = metric("TSH", 2.0, "0.4-4.0");
        let merged = merge_metrics(&[vec![first, second]]);
        assert_eq!(merged[0].category, "Thyroid");
    }

    #[test]
    fn unspecified_range_never_replaces_real_one() {
        let first = metric("Iron", 80.0, "60-170");
        let second = metric("Iron", 80.0, "Not specified");
        let merged = merge_metrics(&[vec![first, second]]);
        assert_eq!(merged[0].range, "60-170");
    }

    #[test]
    fn blank_names_are_dropped_and_order_kept() {
        let merged = merge_metrics(&[vec![
            metric("WBC", 6.0, "4-11"),
            metric("  ", 1.0, ""),
            metric("RBC", 4.8, "4.5-5.9"),
            metric("wbc", 6.1, "4-11"),
        ]]);
        let names: Vec<_> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["WBC", "RBC"]);
    }

    #[test]
    fn patient_info_prefers_longest_real_value() {
        let a = PatientInfo {
            name: Some("J. Doe".into()),
            age: Some("N/A".into()),
            ..Default::default()
        };
        let b = PatientInfo {
            name: Some("Jane Doe".into()),
            age: Some("42".into()),
            hospital_name: Some("undefined".into()),
            ..Default::default()
        };
        let merged = merge_patient_info(&[a, b], None).unwrap();
        assert_eq!(merged.name.as_deref(), Some("Jane Doe"));
        assert_eq!(merged.age.as_deref(), Some("42"));
        assert!(merged.hospital_name.is_none());
    }

    #[test]
    fn preferred_name_wins() {
        let info = PatientInfo {
            name: Some("Extracted Name".into()),
            ..Default::default()
        };
        let merged = merge_patient_info(&[info], Some("Jane")).unwrap();
        assert_eq!(merged.name.as_deref(), Some("Jane"));
    }

    #[test]
    fn empty_patient_info_is_none() {
        let info = PatientInfo {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert!(merge_patient_info(&[info], None).is_none());
        assert!(merge_patient_info(&[], Some("undefined")).is_none());
    }

    #[test]
    fn same_patient_matches_case_insensitively() {
        let a = PatientInfo {
            name: Some("Jane Doe".into()),
            ..Default::default()
        };
        let b = PatientInfo {
            name: Some("jane doe ".into()),
            ..Default::default()
        };
        assert!(same_patient(Some(&a), Some(&b)));
        assert!(!same_patient(Some(&a), None));
        assert!(!same_patient(None, None));
    }

    #[test]
    fn history_attached_oldest_first_with_trend() {
        let earlier = vec![
            stored("b", 2_000, "2024-03-01", vec![metric("Hemoglobin", 12.5, "12-16")]),
            stored("a", 1_000, "2024-01-01", vec![metric("Hemoglobina", 12.0, "12-16")]),
        ];
        let mut current = vec![metric("Hemoglobin", 13.1, "12-16"), metric("ALT", 30.0, "7-56")];

        attach_history(&mut current, &earlier);

        let dates: Vec<_> = current[0].history.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-03-01"]);
        assert_eq!(current[0].trend, Trend::Increasing);
        assert!(current[1].history.is_empty());
        assert_eq!(current[1].trend, Trend::Stable);
    }

    #[test]
    fn history_skips_non_numeric_values_and_keeps_existing_points() {
        let mut text_metric = metric("HIV", 0.0, "");
        text_metric.value = MetricValue::Text("Negative".into());
        let earlier = vec![stored(
            "a",
            1_000,
            "2024-01-01",
            vec![text_metric, metric("Glucose", 110.0, "70-100")],
        )];
        let mut glucose = metric("Glucose", 95.0, "70-100");
        glucose.push_history("2024-06-01", 99.0);
        let mut current = vec![glucose];

        attach_history(&mut current, &earlier);

        assert_eq!(current[0].history.len(), 2);
        assert_eq!(current[0].history[0].date, "2024-01-01");
        assert_eq!(current[0].history[1].date, "2024-06-01");
        assert_eq!(current[0].trend, Trend::Decreasing);
    }

    #[test]
    fn report_date_falls_back_to_timestamp() {
        let mut report = stored("a", 1_704_067_200_000, "x", vec![]);
        report.result.patient_info = None;
        assert_eq!(report_date(&report), "2024-01-01");
    }
}
