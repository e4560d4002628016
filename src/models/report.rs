use serde::{Deserialize, Serialize};

use super::enums::RiskLevel;
use super::metric::HealthMetric;

/// Values the model emits when it has nothing to say about a field.
const PLACEHOLDER_VALUES: &[&str] = &[
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not specified",
    "not available",
    "not provided",
    "-",
];

/// Sparse patient header extracted from the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_name: Option<String>,
}

impl PatientInfo {
    /// Mutable access to every field, in declaration order.
    pub fn fields_mut(&mut self) -> [&mut Option<String>; 9] {
        [
            &mut self.name,
            &mut self.age,
            &mut self.gender,
            &mut self.date_of_birth,
            &mut self.patient_id,
            &mut self.collection_date,
            &mut self.report_date,
            &mut self.doctor_name,
            &mut self.hospital_name,
        ]
    }

    pub fn fields(&self) -> [&Option<String>; 9] {
        [
            &self.name,
            &self.age,
            &self.gender,
            &self.date_of_birth,
            &self.patient_id,
            &self.collection_date,
            &self.report_date,
            &self.doctor_name,
            &self.hospital_name,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|f| f.is_none())
    }

    /// Drop blank and placeholder values ("N/A", "undefined", ...).
    pub fn without_placeholders(mut self) -> Self {
        for field in self.fields_mut() {
            if field.as_deref().is_some_and(is_placeholder) {
                *field = None;
            } else if let Some(value) = field.as_mut() {
                *value = value.trim().to_string();
            }
        }
        self
    }
}

/// True for empty strings and the filler values models emit for unknown fields.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains("undefined") {
        return true;
    }
    let lower = trimmed.to_lowercase();
    PLACEHOLDER_VALUES.contains(&lower.as_str())
}

/// Metric labels grouped by risk band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    #[serde(default)]
    pub high_risk: Vec<String>,
    #[serde(default)]
    pub medium_risk: Vec<String>,
    #[serde(default)]
    pub low_risk: Vec<String>,
    #[serde(default)]
    pub normal: Vec<String>,
}

impl RiskSummary {
    /// Group metric labels by their final risk level, preserving metric order.
    pub fn from_metrics(metrics: &[HealthMetric]) -> Self {
        let mut summary = Self::default();
        for metric in metrics {
            let label = metric.summary_label();
            match metric.risk_level {
                RiskLevel::High => summary.high_risk.push(label),
                RiskLevel::Medium => summary.medium_risk.push(label),
                RiskLevel::Low => summary.low_risk.push(label),
                RiskLevel::Normal => summary.normal.push(label),
            }
        }
        summary
    }

    pub fn abnormal_count(&self) -> usize {
        self.high_risk.len() + self.medium_risk.len() + self.low_risk.len()
    }
}

/// Structured analysis of one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
    pub metrics: Vec<HealthMetric>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detailed_analysis: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_summary: Option<RiskSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

/// Persisted snapshot of an analysis. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

/// Text recovered from an upload, consumed by the analyzer and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub confidence: Option<f32>,
    pub model_used: Option<String>,
}
