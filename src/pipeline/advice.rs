//! Per-metric advice shown next to abnormal results.

use serde::{Deserialize, Serialize};

use super::risk::parse_reference_range;
use crate::models::{HealthMetric, RiskLevel, VisualIndicator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAdvice {
    pub recommendation: String,
    /// Only set for high-risk results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_action: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increase,
    Reduce,
}

/// Which way the value needs to move: below the lower bound means increase.
fn direction(metric: &HealthMetric) -> Direction {
    let lower = parse_reference_range(&metric.range).and_then(|r| r.lower);
    match (metric.value.as_number(), lower) {
        (Some(value), Some(lower)) if value < lower => Direction::Increase,
        (Some(_), Some(_)) => Direction::Reduce,
        _ => match metric.visual_indicator {
            VisualIndicator::Low | VisualIndicator::Down => Direction::Increase,
            _ => Direction::Reduce,
        },
    }
}

pub fn metric_advice(metric: &HealthMetric) -> MetricAdvice {
    if metric.risk_level == RiskLevel::Normal {
        return MetricAdvice {
            recommendation: "Continue with your current lifestyle and diet.".to_string(),
            critical_action: None,
        };
    }

    let verb = match direction(metric) {
        Direction::Increase => "increasing",
        Direction::Reduce => "reducing",
    };
    let recommendation = format!(
        "Consider {verb} your intake of foods that affect {} levels.",
        metric.name
    );
    let critical_action = (metric.risk_level == RiskLevel::High).then(|| {
        format!(
            "Schedule a follow-up appointment within 2 weeks to reassess your {} levels.",
            metric.name
        )
    });

    MetricAdvice {
        recommendation,
        critical_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValue;

    fn metric(value: f64, range: &str, level: RiskLevel) -> HealthMetric {
        let mut m = HealthMetric::new("Vitamin D", MetricValue::Number(value), "ng/mL", range);
        m.set_risk_level(level);
        m
    }

    #[test]
    fn normal_metric_keeps_lifestyle() {
        let advice = metric_advice(&metric(40.0, "30-100", RiskLevel::Normal));
        assert_eq!(
            advice.recommendation,
            "Continue with your current lifestyle and diet."
        );
        assert!(advice.critical_action.is_none());
    }

    #[test]
    fn low_value_suggests_increasing() {
        let advice = metric_advice(&metric(25.0, "30-100", RiskLevel::Low));
        assert_eq!(
            advice.recommendation,
            "Consider increasing your intake of foods that affect Vitamin D levels."
        );
        assert!(advice.critical_action.is_none());
    }

    #[test]
    fn high_value_suggests_reducing_with_follow_up() {
        let advice = metric_advice(&metric(180.0, "30-100", RiskLevel::High));
        assert!(advice.recommendation.starts_with("Consider reducing"));
        assert_eq!(
            advice.critical_action.as_deref(),
            Some("Schedule a follow-up appointment within 2 weeks to reassess your Vitamin D levels.")
        );
    }

    #[test]
    fn falls_back_to_indicator_without_range() {
        let mut m = metric(5.0, "Negative", RiskLevel::Medium);
        m.visual_indicator = VisualIndicator::Down;
        assert!(metric_advice(&m).recommendation.starts_with("Consider increasing"));
    }
}
