pub mod prompt;
pub mod parser;
pub mod normalize;
pub mod orchestrator;

pub use prompt::*;
pub use parser::*;
pub use normalize::*;
pub use orchestrator::*;

use thiserror::Error;

use super::llm::LlmError;
use crate::db::StoreError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No report text to analyze")]
    EmptyInput,

    #[error("Analysis request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to parse response: no JSON object found")]
    NoJsonFound,

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Failed to parse response: metrics array missing or not an array")]
    MissingMetrics,

    #[error("No health metrics found in the report")]
    EmptyMetrics,

    #[error("Failed to save analysis: {0}")]
    Store(#[from] StoreError),
}

impl AnalysisError {
    /// Failure of the model API itself, as opposed to its output.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Llm(_))
    }
}
