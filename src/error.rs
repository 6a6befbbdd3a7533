//! Error taxonomy for the extraction pipeline.
//!
//! Transport failures are the only retryable class; everything else either
//! aborts the current call or is absorbed into batch statistics by the
//! orchestrator.

use thiserror::Error;

/// Errors produced while extracting tenders from the portal.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network failure, timeout, or non-success HTTP status. Retryable.
    #[error("portal request failed: {0}")]
    Transport(String),

    /// Required form state could not be captured. The whole search step may
    /// be restarted from scratch, but the current attempt is dead.
    #[error("form state unavailable: {0}")]
    FormState(String),

    /// Response body was not usable as markup at all. Structural absence of
    /// tables or rows is NOT this error; that is a valid zero-result outcome.
    #[error("unparseable response: {0}")]
    Parse(String),

    /// Invalid caller-supplied search criteria.
    #[error("invalid search criteria: {0}")]
    Criteria(String),

    /// Local store failure.
    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Assistant text-generation service failure.
    #[error("llm request failed: {0}")]
    Llm(String),
}

impl ScrapeError {
    /// Whether the retry wrapper should try this error again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
