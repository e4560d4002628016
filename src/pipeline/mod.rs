pub mod intake;
pub mod extraction;
pub mod llm;
pub mod ocr;
pub mod analysis;
pub mod merge;
pub mod risk;
pub mod advice;
pub mod retry;
pub mod progress;
pub mod processor; // Upload → OCR → analysis → history → store
