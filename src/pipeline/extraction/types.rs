use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Text and embedded images recovered from one PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfContent {
    /// Page texts in page order, joined by newline.
    pub text: String,
    /// Embedded raster images as `data:image/png;base64,...`, in document order.
    pub images: Vec<String>,
}

impl PdfContent {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_text() && self.images.is_empty()
    }
}

/// Local PDF text/image extraction.
pub trait PdfExtractor {
    /// One-time engine check. Cheap once it has succeeded.
    fn ensure_ready(&self) -> Result<(), ExtractionError>;

    fn extract(&self, pdf_bytes: &[u8]) -> Result<PdfContent, ExtractionError>;
}

// ── Mock for testing ──────────────────────────────────────

/// Returns fixed content. Engine init can be made to fail a number of times.
pub struct MockPdfExtractor {
    content: Result<PdfContent, ExtractionError>,
    init_failures: AtomicUsize,
    init_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl MockPdfExtractor {
    pub fn new(text: &str, images: Vec<String>) -> Self {
        Self {
            content: Ok(PdfContent {
                text: text.to_string(),
                images,
            }),
            init_failures: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ExtractionError) -> Self {
        Self {
            content: Err(error),
            ..Self::new("", vec![])
        }
    }

    /// Fail `ensure_ready` this many times before succeeding.
    pub fn with_init_failures(self, count: usize) -> Self {
        self.init_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

impl PdfExtractor for MockPdfExtractor {
    fn ensure_ready(&self) -> Result<(), ExtractionError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExtractionError::EngineInit("mock engine unavailable".into()));
        }
        Ok(())
    }

    fn extract(&self, _pdf_bytes: &[u8]) -> Result<PdfContent, ExtractionError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.content.clone()
    }
}
