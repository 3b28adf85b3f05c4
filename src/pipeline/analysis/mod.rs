pub mod types;
pub mod resolver;
pub mod validation;
pub mod sanitize;
pub mod prompt;
pub mod provider;
pub mod events;
pub mod orchestrator;
pub mod consumer;

pub use types::*;
pub use resolver::*;
pub use validation::*;
pub use sanitize::*;
pub use prompt::*;
pub use provider::*;
pub use events::*;
pub use orchestrator::*;
pub use consumer::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Content is empty after sanitization")]
    EmptyContent,

    #[error("Cannot resume: no output supplied for stage {0}")]
    MissingResumeDependency(Stage),

    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error("Provider returned error (status {status}): {body}")]
    ProviderError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Provider returned an empty response")]
    EmptyProviderResponse,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Stage {stage} output failed validation: {detail}")]
    SchemaViolation { stage: Stage, detail: String },
}

impl AnalysisError {
    /// Errors rejected before any stage work starts.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AnalysisError::EmptyContent | AnalysisError::MissingResumeDependency(_)
        )
    }
}
