use std::sync::Arc;

use super::parser::parse_analysis_response;
use super::prompt::build_analysis_prompt;
use super::AnalysisError;
use crate::db::ReportStore;
use crate::models::AnalysisResult;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::merge::merge_patient_info;

/// Result of a persisted analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedReport {
    pub id: String,
    pub result: AnalysisResult,
}

/// Runs the analysis pipeline:
/// prompt → LLM → extract/repair JSON → validate → back-fill → normalize →
/// reconcile risk → (optionally) persist.
///
/// No retries here: model API failures are returned to the caller.
pub struct ReportAnalyzer {
    llm: Arc<dyn LlmClient + Send + Sync>,
    model_name: String,
}

impl ReportAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Analyze report text without saving it.
    ///
    /// `patient_name` is a user-supplied hint that wins over the name the
    /// model extracted.
    pub fn analyze_text(
        &self,
        text: &str,
        patient_name: Option<&str>,
    ) -> Result<AnalysisResult, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let _span = tracing::info_span!(
            "analyze_report",
            model = %self.model_name,
            text_len = text.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let prompt = build_analysis_prompt(text);
        let response = self.llm.generate(&self.model_name, &prompt)?;
        let mut result = parse_analysis_response(&response)?;

        let extracted: Vec<_> = result.patient_info.take().into_iter().collect();
        result.patient_info = merge_patient_info(&extracted, patient_name);
        result.model_used = Some(self.model_name.clone());

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            metric_count = result.metrics.len(),
            "Report analysis complete"
        );

        Ok(result)
    }

    /// Analyze report text and save the result, returning its new id.
    pub fn analyze(
        &self,
        text: &str,
        patient_name: Option<&str>,
        store: &dyn ReportStore,
    ) -> Result<AnalyzedReport, AnalysisError> {
        let result = self.analyze_text(text, patient_name)?;
        let id = store.save(&result)?;
        Ok(AnalyzedReport { id, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteReportStore;
    use crate::pipeline::llm::{LlmError, MockLlmClient};

    const RESPONSE: &str = r#"```json
{
  "patientInfo": {"name": "J. Doe", "collectionDate": "2024-05-02"},
  "metrics": [
    {"name": "Hemoglobin", "value": "13.5", "unit": "g/dL", "range": "12-16"},
    {"name": "LDL", "value": "190", "unit": "mg/dL", "range": "0-130", "status": "danger"}
  ],
  "summary": "short"
}
```"#;

    fn analyzer(llm: MockLlmClient) -> (ReportAnalyzer, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        (ReportAnalyzer::new(llm.clone(), "text-model"), llm)
    }

    #[test]
    fn analyze_text_returns_normalized_result() {
        let (analyzer, llm) = analyzer(MockLlmClient::new(RESPONSE));

        let result = analyzer.analyze_text("Hemoglobin 13.5 ...", None).unwrap();

        assert_eq!(result.metrics.len(), 2);
        assert_eq!(result.model_used.as_deref(), Some("text-model"));
        assert_eq!(result.recommendations.len(), 3);
        assert_eq!(
            result.patient_info.as_ref().unwrap().name.as_deref(),
            Some("J. Doe")
        );
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "text-model");
        assert!(calls[0].prompt.contains("Hemoglobin 13.5 ..."));
    }

    #[test]
    fn patient_name_hint_wins() {
        let (analyzer, _) = analyzer(MockLlmClient::new(RESPONSE));
        let result = analyzer.analyze_text("text", Some("Jane Doe")).unwrap();
        let info = result.patient_info.unwrap();
        assert_eq!(info.name.as_deref(), Some("Jane Doe"));
        assert_eq!(info.collection_date.as_deref(), Some("2024-05-02"));
    }

    #[test]
    fn empty_text_rejected_without_call() {
        let (analyzer, llm) = analyzer(MockLlmClient::new(RESPONSE));
        assert!(matches!(
            analyzer.analyze_text("  \n", None),
            Err(AnalysisError::EmptyInput)
        ));
        assert_eq!(llm.call_count(), 0);
    }

    #[test]
    fn upstream_failure_carries_status() {
        let (analyzer, llm) = analyzer(MockLlmClient::failing(LlmError::Upstream {
            status: 500,
            message: "internal".into(),
        }));
        let err = analyzer.analyze_text("text", None).unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("status 500"));
        assert_eq!(llm.call_count(), 1);
    }

    #[test]
    fn analyze_persists_and_returns_id() {
        let (analyzer, _) = analyzer(MockLlmClient::new(RESPONSE));
        let store = SqliteReportStore::in_memory().unwrap();

        let analyzed = analyzer.analyze("text", None, &store).unwrap();

        let stored = store.get_by_id(&analyzed.id).unwrap().unwrap();
        assert_eq!(stored.result, analyzed.result);
    }

    #[test]
    fn parse_failure_does_not_persist() {
        let (analyzer, _) = analyzer(MockLlmClient::new(r#"{"summary": "no metrics"}"#));
        let store = SqliteReportStore::in_memory().unwrap();

        let err = analyzer.analyze("text", None, &store).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingMetrics));
        assert!(store.get_all().unwrap().is_empty());
    }
}
