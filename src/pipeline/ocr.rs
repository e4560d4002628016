//! OCR coordination: decides whether an upload needs the vision model and
//! folds everything into one `OcrResult`.
//!
//! - Image upload: sent to the vision model, reply used verbatim.
//! - PDF with text only: local text, no network call.
//! - PDF with embedded images: page text followed by one vision reply per
//!   image, in discovery order.
//!
//! Validation runs first, so bad input never reaches the network. Vision
//! failures are surfaced as-is; retrying is the caller's decision.

use std::sync::{Arc, LazyLock};
use std::thread;

use regex::Regex;
use thiserror::Error;

use super::extraction::{ExtractionError, PdfExtractor};
use super::intake::{validate_upload, FileKind, ReportUpload, ValidationError};
use super::llm::{InlineImage, LlmClient, LlmError};
use crate::models::OcrResult;

/// Instruction for a photographed or scanned report uploaded as an image.
pub const IMAGE_UPLOAD_PROMPT: &str = "Extract all text from this health report:";

/// Instruction for a raster image found inside a PDF.
pub const PDF_IMAGE_PROMPT: &str = "Extract all text from this image:";

/// `model_used` tag for text read locally from the PDF.
pub const LOCAL_PDF_MODEL: &str = "pdfium";

/// Confidence reported for text the PDF engine read directly.
const LOCAL_TEXT_CONFIDENCE: f32 = 0.95;

/// Local text shorter than this is scored like vision output.
const MIN_LOCAL_TEXT_CHARS: usize = 10;

/// Embedded images sent to the vision model at the same time.
const MAX_PARALLEL_IMAGES: usize = 4;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Vision OCR failed: {0}")]
    Vision(#[from] LlmError),

    #[error("OCR produced no text")]
    EmptyResult,

    #[error("OCR worker failed: {0}")]
    Worker(String),
}

pub struct OcrCoordinator {
    llm: Arc<dyn LlmClient + Send + Sync>,
    extractor: Arc<dyn PdfExtractor + Send + Sync>,
    vision_model: String,
}

impl OcrCoordinator {
    pub fn new(
        llm: Arc<dyn LlmClient + Send + Sync>,
        extractor: Arc<dyn PdfExtractor + Send + Sync>,
        vision_model: &str,
    ) -> Self {
        Self {
            llm,
            extractor,
            vision_model: vision_model.to_string(),
        }
    }

    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    pub fn perform_ocr(&self, upload: &ReportUpload) -> Result<OcrResult, OcrError> {
        let kind = validate_upload(upload)?;

        let _span = tracing::info_span!(
            "ocr",
            kind = ?kind,
            size = upload.bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let result = if kind.is_image() {
            self.ocr_image_upload(kind, &upload.bytes)?
        } else {
            self.ocr_pdf(&upload.bytes)?
        };

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = result.text.len(),
            confidence = result.confidence.unwrap_or_default(),
            model = result.model_used.as_deref().unwrap_or_default(),
            "OCR complete"
        );

        Ok(result)
    }

    fn ocr_image_upload(&self, kind: FileKind, bytes: &[u8]) -> Result<OcrResult, OcrError> {
        let image = InlineImage::from_bytes(kind.mime_type(), bytes);
        let text = self
            .llm
            .generate_with_image(&self.vision_model, IMAGE_UPLOAD_PROMPT, &image)?;

        if text.trim().is_empty() {
            return Err(OcrError::EmptyResult);
        }

        Ok(OcrResult {
            confidence: Some(compute_heuristic_confidence(&text)),
            text,
            model_used: Some(self.vision_model.clone()),
        })
    }

    fn ocr_pdf(&self, bytes: &[u8]) -> Result<OcrResult, OcrError> {
        self.extractor.ensure_ready()?;
        let content = self.extractor.extract(bytes)?;

        if content.images.is_empty() {
            if !content.has_text() {
                return Err(OcrError::EmptyResult);
            }
            let confidence = if content.text.trim().chars().count() > MIN_LOCAL_TEXT_CHARS {
                LOCAL_TEXT_CONFIDENCE
            } else {
                compute_heuristic_confidence(&content.text)
            };
            return Ok(OcrResult {
                text: content.text,
                confidence: Some(confidence),
                model_used: Some(LOCAL_PDF_MODEL.to_string()),
            });
        }

        let image_texts = self.ocr_embedded_images(&content.images)?;

        let mut sections = Vec::with_capacity(image_texts.len() + 1);
        if content.has_text() {
            sections.push(content.text.trim_end().to_string());
        }
        sections.extend(
            image_texts
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        );
        let text = sections.join("\n");

        if text.trim().is_empty() {
            return Err(OcrError::EmptyResult);
        }

        Ok(OcrResult {
            confidence: Some(compute_heuristic_confidence(&text)),
            text,
            model_used: Some(self.vision_model.clone()),
        })
    }

    /// OCR each embedded image concurrently. Results come back in input
    /// order regardless of which call finishes first.
    fn ocr_embedded_images(&self, data_uris: &[String]) -> Result<Vec<String>, OcrError> {
        let images = data_uris
            .iter()
            .map(|uri| InlineImage::from_data_uri(uri))
            .collect::<Result<Vec<_>, _>>()?;

        let mut texts = Vec::with_capacity(images.len());
        for batch in images.chunks(MAX_PARALLEL_IMAGES) {
            let batch_results: Vec<Result<String, OcrError>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|image| {
                        scope.spawn(move || {
                            self.llm
                                .generate_with_image(&self.vision_model, PDF_IMAGE_PROMPT, image)
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(reply) => reply.map_err(OcrError::from),
                        Err(_) => Err(OcrError::Worker("image OCR thread panicked".into())),
                    })
                    .collect()
            });

            for result in batch_results {
                texts.push(result?);
            }
        }

        tracing::debug!(image_count = texts.len(), "Embedded images OCR'd");
        Ok(texts)
    }
}

/// A measurement followed by its unit: "13.5 g/dL", "95 mg/dL", "42 %".
static MEASUREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d[\d.,]*\s*(?:%|[a-zµμ]+(?:/[a-zµμ0-9^]+)?)").unwrap()
});

/// A reference interval: "12.0-16.0", "70 – 100", "4 to 11".
static INTERVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*\s*(?:-|–|to)\s*\d").unwrap());

/// Measurement lines that still earn credit; more adds nothing.
const MAX_SCORED_ROWS: usize = 10;

/// Heuristic confidence for model-produced text.
///
/// The vision model gives no per-word confidence, so it is estimated from
/// how much the text looks like a lab report: a small base from length,
/// 0.03 per line carrying a value with a unit (up to ten lines) and 0.1 when
/// any reference interval was read. Capped at 0.95.
pub fn compute_heuristic_confidence(text: &str) -> f32 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }

    let len = text.chars().count();
    let base: f32 = if len < 40 {
        0.15
    } else if len < 200 {
        0.35
    } else {
        0.5
    };

    let measurement_rows = text
        .lines()
        .filter(|line| MEASUREMENT.is_match(line))
        .count()
        .min(MAX_SCORED_ROWS);
    let has_intervals = text.lines().any(|line| INTERVAL.is_match(line));

    let bonus = measurement_rows as f32 * 0.03 + if has_intervals { 0.1 } else { 0.0 };
    (base + bonus).min(0.95)
}
