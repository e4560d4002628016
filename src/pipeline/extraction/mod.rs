pub mod types;
pub mod pdfium;

pub use types::*;
pub use pdfium::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// PDF engine could not be loaded or failed its self-test.
    #[error("PDF engine initialization failed: {0}")]
    EngineInit(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF is password-protected")]
    Encrypted,

    #[error("No text or images could be extracted from the PDF")]
    NoContent,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl ExtractionError {
    /// Engine failures are worth retrying; per-file failures are not.
    pub fn is_engine_init(&self) -> bool {
        matches!(self, Self::EngineInit(_))
    }
}
