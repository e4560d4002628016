//! Report processing orchestrator.
//!
//! Single entry point that drives one upload through the pipeline:
//! validate → extract/OCR → analyze → merge history → persist.
//!
//! Uses trait-based DI for every engine (PdfExtractor, LlmClient,
//! ReportStore) so the orchestrator stays testable with mock implementations.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{ApiSettings, ConfigError};
use crate::db::{apply_model_choice, get_model_choice, ReportStore, SqliteReportStore, StoreError};
use crate::models::{AnalysisResult, RiskSummary};
use crate::pipeline::analysis::{AnalysisError, ReportAnalyzer};
use crate::pipeline::extraction::{ExtractionError, PdfExtractor, PdfiumExtractor};
use crate::pipeline::intake::{validate_upload, FileKind, ReportUpload, ValidationError};
use crate::pipeline::llm::{GeminiClient, LlmClient, LlmError};
use crate::pipeline::merge::{attach_history, dedupe_metrics, same_patient};
use crate::pipeline::ocr::{OcrCoordinator, OcrError};
use crate::pipeline::progress::{ProcessingStage, ProgressError, ProgressObserver, ProgressTracker};
use crate::pipeline::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while processing a report.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model API client error: {0}")]
    Llm(#[from] LlmError),

    #[error("Processing task failed: {0}")]
    Worker(String),
}

/// Who has to act on a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The uploaded file itself is the problem.
    BadInput,
    /// The hosted model API failed or was unreachable.
    Upstream,
    /// Local engine, storage or programming fault.
    Internal,
}

impl ProcessingError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::BadInput,
            Self::Extraction(e) => extraction_kind(e),
            Self::Ocr(e) => match e {
                OcrError::Validation(_) | OcrError::EmptyResult => FailureKind::BadInput,
                OcrError::Extraction(e) => extraction_kind(e),
                // Our own extractor produced the payload.
                OcrError::Vision(LlmError::InvalidImage(_)) => FailureKind::Internal,
                OcrError::Vision(_) => FailureKind::Upstream,
                OcrError::Worker(_) => FailureKind::Internal,
            },
            Self::Analysis(e) if e.is_upstream() => FailureKind::Upstream,
            Self::Analysis(AnalysisError::EmptyInput | AnalysisError::EmptyMetrics) => {
                FailureKind::BadInput
            }
            Self::Llm(LlmError::InvalidImage(_)) => FailureKind::Internal,
            Self::Llm(_) => FailureKind::Upstream,
            Self::Analysis(_)
            | Self::Store(_)
            | Self::Progress(_)
            | Self::Config(_)
            | Self::Worker(_) => FailureKind::Internal,
        }
    }

    /// Message suitable for showing to the person who uploaded the file.
    pub fn user_message(&self) -> String {
        match self.failure_kind() {
            FailureKind::BadInput => match self {
                // Validation messages already tell the user what to do.
                Self::Validation(e) | Self::Ocr(OcrError::Validation(e)) => e.to_string(),
                _ => format!(
                    "We couldn't read any health data from this file ({self}). \
                     Try a clearer scan or a different file."
                ),
            },
            FailureKind::Upstream => format!(
                "The analysis service is unavailable right now ({self}). Please try again later."
            ),
            FailureKind::Internal => {
                format!("Something went wrong while processing your report ({self}).")
            }
        }
    }
}

fn extraction_kind(error: &ExtractionError) -> FailureKind {
    match error {
        ExtractionError::NoContent | ExtractionError::Encrypted | ExtractionError::PdfParsing(_) => {
            FailureKind::BadInput
        }
        ExtractionError::EngineInit(_) | ExtractionError::ImageProcessing(_) => {
            FailureKind::Internal
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedReport {
    pub id: String,
    pub result: AnalysisResult,
    pub ocr_model: Option<String>,
    pub ocr_confidence: Option<f32>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ReportProcessor {
    extractor: Arc<dyn PdfExtractor + Send + Sync>,
    ocr: OcrCoordinator,
    analyzer: ReportAnalyzer,
    store: Arc<dyn ReportStore + Send + Sync>,
    engine_retry: RetryPolicy,
}

impl ReportProcessor {
    pub fn new(
        llm: Arc<dyn LlmClient + Send + Sync>,
        extractor: Arc<dyn PdfExtractor + Send + Sync>,
        store: Arc<dyn ReportStore + Send + Sync>,
        text_model: &str,
        vision_model: &str,
    ) -> Self {
        Self {
            ocr: OcrCoordinator::new(llm.clone(), extractor.clone(), vision_model),
            analyzer: ReportAnalyzer::new(llm, text_model),
            extractor,
            store,
            engine_retry: RetryPolicy::default(),
        }
    }

    /// Wire the production engines: Gemini over HTTP and a local PDFium.
    pub fn from_settings(
        settings: &ApiSettings,
        store: Arc<dyn ReportStore + Send + Sync>,
    ) -> Result<Self, ProcessingError> {
        let llm = Arc::new(GeminiClient::new(settings)?);
        Ok(Self::new(
            llm,
            Arc::new(PdfiumExtractor::new()),
            store,
            &settings.text_model,
            &settings.vision_model,
        ))
    }

    /// Like `from_settings`, with model overrides saved in the local store
    /// applied on top of the environment.
    pub fn from_local_store(
        mut settings: ApiSettings,
        store: Arc<SqliteReportStore>,
    ) -> Result<Self, ProcessingError> {
        let choice = store.with_connection(|conn| Ok(get_model_choice(conn)?))?;
        apply_model_choice(&mut settings, &choice);
        Self::from_settings(&settings, store)
    }

    /// Override the retry applied to PDF engine initialization.
    pub fn with_engine_retry(mut self, policy: RetryPolicy) -> Self {
        self.engine_retry = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReportStore + Send + Sync> {
        &self.store
    }

    /// Run the full pipeline for one upload, reporting each stage.
    ///
    /// On failure the observer sees `Error` plus a user-facing message and
    /// nothing is persisted.
    pub fn process(
        &self,
        upload: &ReportUpload,
        patient_name: Option<&str>,
        observer: &dyn ProgressObserver,
    ) -> Result<ProcessedReport, ProcessingError> {
        let mut tracker = ProgressTracker::start(observer);
        let _span = tracing::info_span!(
            "process_report",
            file = %upload.file_name,
            size = upload.size(),
        )
        .entered();

        let outcome = self.run_stages(upload, patient_name, &mut tracker);
        match &outcome {
            Ok(report) => tracing::info!(
                id = %report.id,
                metric_count = report.result.metrics.len(),
                "Report processed"
            ),
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.failure_kind(), "Report processing failed");
                tracker.fail(&e.user_message());
            }
        }
        outcome
    }

    fn run_stages(
        &self,
        upload: &ReportUpload,
        patient_name: Option<&str>,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<ProcessedReport, ProcessingError> {
        // Reading
        let kind = validate_upload(upload)?;
        if kind == FileKind::Pdf {
            self.engine_retry
                .run(|| self.extractor.ensure_ready(), ExtractionError::is_engine_init)?;
        }
        let ocr = self.ocr.perform_ocr(upload)?;
        tracker.advance(ProcessingStage::Analyzing)?;

        let mut result = self.analyzer.analyze_text(&ocr.text, patient_name)?;
        tracker.advance(ProcessingStage::Discussing)?;

        result.metrics = dedupe_metrics(std::mem::take(&mut result.metrics));
        let earlier: Vec<_> = self
            .store
            .get_all()?
            .into_iter()
            .filter(|r| same_patient(r.result.patient_info.as_ref(), result.patient_info.as_ref()))
            .collect();
        attach_history(&mut result.metrics, &earlier);
        result.risk_summary = Some(RiskSummary::from_metrics(&result.metrics));
        tracker.advance(ProcessingStage::Finalizing)?;

        let id = self.store.save(&result)?;
        tracker.advance(ProcessingStage::Complete)?;

        Ok(ProcessedReport {
            id,
            result,
            ocr_model: ocr.model_used,
            ocr_confidence: ocr.confidence,
        })
    }

    /// Async facade: runs `process` on tokio's blocking pool.
    pub async fn process_async(
        self: Arc<Self>,
        upload: ReportUpload,
        patient_name: Option<String>,
        observer: Arc<dyn ProgressObserver + Send + Sync>,
    ) -> Result<ProcessedReport, ProcessingError> {
        let worker_observer = observer.clone();
        let joined = tokio::task::spawn_blocking(move || {
            self.process(&upload, patient_name.as_deref(), &*worker_observer)
        })
        .await;

        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = ProcessingError::Worker(e.to_string());
                observer.on_stage(ProcessingStage::Error);
                observer.on_error(&err.user_message());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteReportStore;
    use crate::models::{RiskLevel, Trend};
    use crate::pipeline::extraction::MockPdfExtractor;
    use crate::pipeline::llm::MockLlmClient;
    use crate::pipeline::progress::{NoopObserver, RecordingObserver};
    use std::time::Duration;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn response(name: &str, glucose: &str) -> String {
        format!(
            r#"{{
  "patientInfo": {{"name": "{name}", "reportDate": "2024-06-01"}},
  "metrics": [
    {{"name": "Glucose", "value": "{glucose}", "unit": "mg/dL", "range": "70-100"}},
    {{"name": "glucose", "value": "{glucose}", "unit": "mg/dL", "range": "70-100"}},
    {{"name": "Hemoglobin", "value": "14", "unit": "g/dL", "range": "12-16"}}
  ],
  "summary": "Glucose is elevated compared with the reference range for fasting samples."
}}"#
        )
    }

    fn processor(
        llm: MockLlmClient,
        extractor: MockPdfExtractor,
    ) -> (ReportProcessor, Arc<MockLlmClient>, Arc<MockPdfExtractor>, Arc<SqliteReportStore>) {
        let llm = Arc::new(llm);
        let extractor = Arc::new(extractor);
        let store = Arc::new(SqliteReportStore::in_memory().unwrap());
        let processor = ReportProcessor::new(
            llm.clone(),
            extractor.clone(),
            store.clone(),
            "text-model",
            "vision-model",
        )
        .with_engine_retry(RetryPolicy::new(3, Duration::ZERO));
        (processor, llm, extractor, store)
    }

    fn pdf_upload() -> ReportUpload {
        ReportUpload::new("report.pdf", b"%PDF-1.7 body".to_vec())
    }

    #[test]
    fn pdf_runs_every_stage_and_persists() {
        let (processor, llm, _, store) = processor(
            MockLlmClient::new(&response("Ana Lima", "160")),
            MockPdfExtractor::new("Glucose 160 mg/dL (70-100)", vec![]),
        );
        let observer = RecordingObserver::new();

        let report = processor.process(&pdf_upload(), None, &observer).unwrap();

        assert_eq!(
            observer.stages(),
            vec![
                ProcessingStage::Reading,
                ProcessingStage::Analyzing,
                ProcessingStage::Discussing,
                ProcessingStage::Finalizing,
                ProcessingStage::Complete,
            ]
        );
        assert!(observer.errors().is_empty());
        assert_eq!(report.ocr_model.as_deref(), Some("pdfium"));
        assert_eq!(report.result.metrics.len(), 2);
        assert_eq!(report.result.metrics[0].risk_level, RiskLevel::High);
        assert_eq!(llm.call_count(), 1);

        let stored = store.get_by_id(&report.id).unwrap().unwrap();
        assert_eq!(stored.result, report.result);
        let summary = report.result.risk_summary.unwrap();
        assert_eq!(summary.high_risk.len(), 1);
    }

    #[test]
    fn history_comes_from_same_patient_only() {
        let (processor, _, _, store) = processor(
            MockLlmClient::new(&response("Ana Lima", "120")),
            MockPdfExtractor::new("Glucose report text", vec![]),
        );
        let observer = RecordingObserver::new();
        processor.process(&pdf_upload(), None, &observer).unwrap();

        let other = processor_with_store(&response("Bruno Sá", "300"), store.clone());
        other.process(&pdf_upload(), None, &observer).unwrap();

        let latest = processor_with_store(&response("ana lima", "90"), store.clone());
        let report = latest.process(&pdf_upload(), None, &observer).unwrap();

        let glucose = &report.result.metrics[0];
        let values: Vec<f64> = glucose.history.iter().map(|h| h.value).collect();
        assert_eq!(values, vec![120.0]);
        assert_eq!(glucose.history[0].date, "2024-06-01");
        assert_eq!(glucose.trend, Trend::Decreasing);
        assert_eq!(store.get_all().unwrap().len(), 3);
    }

    fn processor_with_store(reply: &str, store: Arc<SqliteReportStore>) -> ReportProcessor {
        ReportProcessor::new(
            Arc::new(MockLlmClient::new(reply)),
            Arc::new(MockPdfExtractor::new("Glucose report text", vec![])),
            store,
            "text-model",
            "vision-model",
        )
    }

    #[test]
    fn image_upload_uses_vision_model() {
        let llm = MockLlmClient::new(&response("Ana Lima", "95"))
            .with_vision(|_| Ok("Glucose 95 mg/dL".into()));
        let (processor, llm, extractor, _) = processor(llm, MockPdfExtractor::new("", vec![]));
        let upload = ReportUpload::new("scan.png", PNG_MAGIC.to_vec());

        let report = processor.process(&upload, Some("Ana L."), &RecordingObserver::new()).unwrap();

        assert_eq!(report.ocr_model.as_deref(), Some("vision-model"));
        assert_eq!(
            report.result.patient_info.unwrap().name.as_deref(),
            Some("Ana L.")
        );
        assert_eq!(llm.call_count(), 2);
        assert_eq!(extractor.init_calls(), 0);
    }

    #[test]
    fn engine_init_is_retried() {
        let (processor, _, extractor, _) = processor(
            MockLlmClient::new(&response("Ana Lima", "95")),
            MockPdfExtractor::new("Glucose 95 mg/dL", vec![]).with_init_failures(2),
        );

        processor.process(&pdf_upload(), None, &NoopObserver).unwrap();

        // Two failures, one success, then the coordinator's own readiness check.
        assert_eq!(extractor.init_calls(), 4);
    }

    #[test]
    fn engine_init_gives_up_after_attempts() {
        let (processor, llm, extractor, _) = processor(
            MockLlmClient::new("unused"),
            MockPdfExtractor::new("text", vec![]).with_init_failures(5),
        );
        let observer = RecordingObserver::new();

        let err = processor.process(&pdf_upload(), None, &observer).unwrap_err();

        assert!(matches!(err, ProcessingError::Extraction(ExtractionError::EngineInit(_))));
        assert_eq!(err.failure_kind(), FailureKind::Internal);
        assert_eq!(extractor.init_calls(), 3);
        assert_eq!(llm.call_count(), 0);
        assert_eq!(observer.last_stage(), Some(ProcessingStage::Error));
    }

    #[test]
    fn invalid_upload_fails_before_any_call() {
        let (processor, llm, extractor, store) =
            processor(MockLlmClient::new("unused"), MockPdfExtractor::new("", vec![]));
        let observer = RecordingObserver::new();
        let upload = ReportUpload::new("notes.txt", b"hello".to_vec());

        let err = processor.process(&upload, None, &observer).unwrap_err();

        assert_eq!(err.failure_kind(), FailureKind::BadInput);
        assert_eq!(
            observer.stages(),
            vec![ProcessingStage::Reading, ProcessingStage::Error]
        );
        assert!(observer.errors()[0].contains("Please upload a PDF, JPG, or PNG file."));
        assert_eq!(llm.call_count(), 0);
        assert_eq!(extractor.init_calls(), 0);
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn upstream_failure_stops_at_analyzing() {
        let (processor, _, _, store) = processor(
            MockLlmClient::failing(LlmError::Upstream {
                status: 503,
                message: "overloaded".into(),
            }),
            MockPdfExtractor::new("Glucose 95 mg/dL", vec![]),
        );
        let observer = RecordingObserver::new();

        let err = processor.process(&pdf_upload(), None, &observer).unwrap_err();

        assert_eq!(err.failure_kind(), FailureKind::Upstream);
        assert_eq!(
            observer.stages(),
            vec![
                ProcessingStage::Reading,
                ProcessingStage::Analyzing,
                ProcessingStage::Error
            ]
        );
        assert!(observer.errors()[0].contains("try again later"));
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn encrypted_pdf_is_bad_input() {
        let (processor, _, _, _) = processor(
            MockLlmClient::new("unused"),
            MockPdfExtractor::failing(ExtractionError::Encrypted),
        );
        let err = processor
            .process(&pdf_upload(), None, &RecordingObserver::new())
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::BadInput);
        assert!(err.user_message().contains("password-protected"));
    }

    #[test]
    fn user_messages_differ_by_kind() {
        let bad = ProcessingError::Ocr(OcrError::EmptyResult);
        let upstream = ProcessingError::Llm(LlmError::Timeout(120));
        let internal = ProcessingError::Worker("boom".into());

        assert_eq!(bad.failure_kind(), FailureKind::BadInput);
        assert_eq!(upstream.failure_kind(), FailureKind::Upstream);
        assert_eq!(internal.failure_kind(), FailureKind::Internal);
        let messages = [bad.user_message(), upstream.user_message(), internal.user_message()];
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
    }

    #[test]
    fn local_store_model_overrides_apply() {
        let store = Arc::new(SqliteReportStore::in_memory().unwrap());
        store
            .with_connection(|conn| {
                Ok(crate::db::set_model_choice(
                    conn,
                    &crate::db::ModelChoice {
                        analysis_model: Some("custom-text".into()),
                        vision_model: None,
                    },
                )?)
            })
            .unwrap();
        let settings = ApiSettings {
            api_key: "k".into(),
            base_url: "http://127.0.0.1:9".into(),
            text_model: "default-text".into(),
            vision_model: "default-vision".into(),
            request_timeout: Duration::from_secs(5),
        };

        let processor = ReportProcessor::from_local_store(settings, store).unwrap();

        assert_eq!(processor.analyzer.model_name(), "custom-text");
        assert_eq!(processor.ocr.vision_model(), "default-vision");
    }

    #[test]
    fn bad_image_payload_is_internal() {
        let err = ProcessingError::Ocr(OcrError::Vision(LlmError::InvalidImage(
            "not a data URI".into(),
        )));
        assert_eq!(err.failure_kind(), FailureKind::Internal);
        assert!(!err.user_message().contains("try again later"));

        let upstream = ProcessingError::Ocr(OcrError::Vision(LlmError::Connection(
            "http://127.0.0.1:9".into(),
        )));
        assert_eq!(upstream.failure_kind(), FailureKind::Upstream);
    }

    #[test]
    fn malformed_embedded_image_fails_as_internal() {
        let (processor, llm, _, _) = processor(
            MockLlmClient::new("unused"),
            MockPdfExtractor::new("", vec!["not-a-data-uri".into()]),
        );
        let observer = RecordingObserver::new();

        let err = processor.process(&pdf_upload(), None, &observer).unwrap_err();

        assert_eq!(err.failure_kind(), FailureKind::Internal);
        assert_eq!(llm.call_count(), 0);
        assert!(observer.errors()[0].starts_with("Something went wrong"));
    }

    #[tokio::test]
    async fn async_facade_runs_on_blocking_pool() {
        let (processor, _, _, store) = processor(
            MockLlmClient::new(&response("Ana Lima", "95")),
            MockPdfExtractor::new("Glucose 95 mg/dL", vec![]),
        );
        let observer = Arc::new(RecordingObserver::new());

        let report = Arc::new(processor)
            .process_async(pdf_upload(), Some("Ana Lima".into()), observer.clone())
            .await
            .unwrap();

        assert_eq!(observer.last_stage(), Some(ProcessingStage::Complete));
        assert!(store.get_by_id(&report.id).unwrap().is_some());
    }
}
