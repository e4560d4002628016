//! PDF text and embedded-image extraction via Google PDFium.
//!
//! `PdfiumExtractor` is `Send + Sync`. Each operation binds a fresh `Pdfium`
//! instance because the upstream type is `!Send`; the OS caches the
//! `dlopen`/`LoadLibrary` call so repeat loads are near-free.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine as _;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use super::types::{PdfContent, PdfExtractor};
use super::ExtractionError;

/// Env var holding an explicit path to the PDFium library file.
pub const PDFIUM_PATH_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Embedded images smaller than this (either side) are spacers or logos.
const MIN_IMAGE_DIMENSION_PX: u32 = 16;

/// One blank 50x50pt page. Loaded once to prove the engine works.
const SELF_TEST_PDF: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n\
1 0 obj\n<</Type/Catalog/Pages 2 0 R>>\nendobj\n\
2 0 obj\n<</Type/Pages/Kids[3 0 R]/Count 1>>\nendobj\n\
3 0 obj\n<</Type/Page/MediaBox[0 0 50 50]/Parent 2 0 R/Resources<<>>>>\nendobj\n\
xref\n0 4\n\
0000000000 65535 f \n\
0000000015 00000 n \n\
0000000060 00000 n \n\
0000000111 00000 n \n\
trailer\n<</Size 4/Root 1 0 R>>\nstartxref\n188\n%%EOF\n";

/// Extracts page text and embedded raster images with PDFium.
pub struct PdfiumExtractor {
    ready: AtomicBool,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl Default for PdfiumExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable, then its `resources/pdfium/{bin,lib}/`
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(PDFIUM_PATH_ENV) {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::EngineInit(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let candidates = [
                exe_dir.to_path_buf(),
                exe_dir.join("resources").join("pdfium").join("bin"),
                exe_dir.join("resources").join("pdfium").join("lib"),
            ];

            for dir in &candidates {
                let lib_path = Pdfium::pdfium_platform_library_name_at_path(
                    dir.to_string_lossy().as_ref(),
                );
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::EngineInit(format!(
            "PDFium library not found. Set {PDFIUM_PATH_ENV} or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Classify a document load failure from its message.
fn classify_load_failure(message: &str) -> ExtractionError {
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::Encrypted
    } else {
        ExtractionError::PdfParsing(format!("Failed to load PDF: {message}"))
    }
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    classify_load_failure(&format!("{e}"))
}

/// `data:<mime>;base64,<payload>`
pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn png_data_uri(image: &DynamicImage) -> Result<String, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(encode_data_uri("image/png", &cursor.into_inner()))
}

impl PdfExtractor for PdfiumExtractor {
    fn ensure_ready(&self) -> Result<(), ExtractionError> {
        if self.is_ready() {
            return Ok(());
        }

        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(SELF_TEST_PDF, None)
            .map_err(|e| ExtractionError::EngineInit(format!("Self-test PDF failed to load: {e}")))?;
        let page_count = document.pages().len();
        if page_count != 1 {
            return Err(ExtractionError::EngineInit(format!(
                "Self-test PDF reported {page_count} pages"
            )));
        }

        self.ready.store(true, Ordering::Release);
        info!("PDF engine ready");
        Ok(())
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<PdfContent, ExtractionError> {
        self.ensure_ready()?;

        let _span = tracing::info_span!("pdf_extract", size = pdf_bytes.len()).entered();
        let start = std::time::Instant::now();

        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let mut page_texts = Vec::new();
        let mut images = Vec::new();

        for (page_index, page) in document.pages().iter().enumerate() {
            match page.text() {
                Ok(text) => page_texts.push(text.all()),
                Err(e) => warn!(page = page_index, error = %e, "Page text unavailable"),
            }

            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };
                let raw = match image_object.get_raw_image() {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(page = page_index, error = %e, "Skipping unreadable embedded image");
                        continue;
                    }
                };
                let (width, height) = raw.dimensions();
                if width < MIN_IMAGE_DIMENSION_PX || height < MIN_IMAGE_DIMENSION_PX {
                    debug!(page = page_index, width, height, "Skipping tiny embedded image");
                    continue;
                }
                images.push(png_data_uri(&raw)?);
            }
        }

        let content = PdfContent {
            text: page_texts.join("\n"),
            images,
        };

        if content.is_empty() {
            return Err(ExtractionError::NoContent);
        }

        info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = content.text.len(),
            image_count = content.images.len(),
            "PDF extraction complete"
        );

        Ok(content)
    }
}
