//! Upload validation: type and size checks performed before any extraction
//! or network call.
//!
//! The claimed MIME type (declared by the caller, or guessed from the file
//! name) must be one of the supported types, and the magic bytes must agree
//! with it. Magic bytes don't lie, extensions can be wrong.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{MAX_UPLOAD_BYTES, SUPPORTED_MIME_TYPES};

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Unsupported file type: {0}. Please upload a PDF, JPG, or PNG file.")]
    UnsupportedType(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    TooLarge { size_mb: f64, max_mb: u64 },

    #[error("The file is empty")]
    Empty,

    #[error("File content does not match its type ({claimed})")]
    ContentMismatch { claimed: String },
}

/// A file handed over by the presentation layer.
#[derive(Debug, Clone)]
pub struct ReportUpload {
    pub file_name: String,
    /// MIME type reported by the picker, if any.
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl ReportUpload {
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            declared_mime: None,
            bytes,
        }
    }

    pub fn with_mime(mut self, mime: &str) -> Self {
        self.declared_mime = Some(mime.to_string());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Accepted upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Pdf,
    Jpeg,
    Png,
}

impl FileKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Detect from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            // PDF: starts with %PDF
            [0x25, 0x50, 0x44, 0x46, ..] => Some(Self::Pdf),
            // JPEG: starts with FF D8 FF
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            // PNG: starts with 89 50 4E 47
            [0x89, 0x50, 0x4E, 0x47, ..] => Some(Self::Png),
            _ => None,
        }
    }
}

/// Claimed MIME type: the declared one, else a guess from the file name.
fn claimed_mime(upload: &ReportUpload) -> String {
    upload
        .declared_mime
        .as_deref()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            mime_guess::from_path(&upload.file_name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string()
        })
}

/// Validate an upload, returning its detected kind.
pub fn validate_upload(upload: &ReportUpload) -> Result<FileKind, ValidationError> {
    let size = upload.size();
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
        });
    }
    if size == 0 {
        return Err(ValidationError::Empty);
    }

    let claimed = claimed_mime(upload);
    let kind = FileKind::from_mime(&claimed)
        .filter(|k| SUPPORTED_MIME_TYPES.contains(&k.mime_type()))
        .ok_or_else(|| ValidationError::UnsupportedType(claimed.clone()))?;

    if FileKind::sniff(&upload.bytes) != Some(kind) {
        return Err(ValidationError::ContentMismatch { claimed });
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00];

    #[test]
    fn accepts_pdf_by_extension() {
        let upload = ReportUpload::new("cbc.pdf", b"%PDF-1.4 rest".to_vec());
        assert_eq!(validate_upload(&upload).unwrap(), FileKind::Pdf);
    }

    #[test]
    fn accepts_png_with_declared_mime() {
        let upload = ReportUpload::new("scan", PNG_MAGIC.to_vec()).with_mime("image/png");
        assert_eq!(validate_upload(&upload).unwrap(), FileKind::Png);
    }

    #[test]
    fn accepts_jpeg_alias_mime() {
        let upload = ReportUpload::new("photo.jpeg", JPEG_MAGIC.to_vec()).with_mime("image/jpg");
        assert_eq!(validate_upload(&upload).unwrap(), FileKind::Jpeg);
    }

    #[test]
    fn rejects_unsupported_type() {
        let upload = ReportUpload::new("notes.txt", b"hello".to_vec());
        assert!(matches!(
            validate_upload(&upload),
            Err(ValidationError::UnsupportedType(m)) if m == "text/plain"
        ));
    }

    #[test]
    fn rejects_unknown_extension_without_mime() {
        let upload = ReportUpload::new("report", PNG_MAGIC.to_vec());
        assert!(matches!(
            validate_upload(&upload),
            Err(ValidationError::UnsupportedType(_))
        ));
    }

    #[test]
    fn rejects_oversized_before_type_check() {
        let upload = ReportUpload::new("huge.txt", vec![0u8; (MAX_UPLOAD_BYTES + 1) as usize]);
        let err = validate_upload(&upload).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { max_mb: 10, .. }));
    }

    #[test]
    fn accepts_exactly_ten_mib() {
        let mut bytes = vec![0u8; MAX_UPLOAD_BYTES as usize];
        bytes[..4].copy_from_slice(b"%PDF");
        let upload = ReportUpload::new("big.pdf", bytes);
        assert!(validate_upload(&upload).is_ok());
    }

    #[test]
    fn rejects_empty_file() {
        let upload = ReportUpload::new("empty.pdf", vec![]);
        assert_eq!(validate_upload(&upload), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_mismatched_content() {
        let upload = ReportUpload::new("fake.pdf", PNG_MAGIC.to_vec());
        assert!(matches!(
            validate_upload(&upload),
            Err(ValidationError::ContentMismatch { .. })
        ));
    }

    #[test]
    fn error_messages_are_user_facing() {
        let msg = ValidationError::UnsupportedType("text/plain".into()).to_string();
        assert!(msg.contains("PDF, JPG, or PNG"));
        let msg = ValidationError::TooLarge { size_mb: 12.0, max_mb: 10 }.to_string();
        assert!(msg.contains("10MB"));
    }
}
