//! Summary pane: prose summaries of the document from an external service.
//!
//! Independent of synchronization. A failed request leaves the previous
//! summary in place and never reaches session state.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("Summary service unreachable: {0}")]
    Unavailable(String),

    #[error("Summary service returned status {0}")]
    Status(u16),

    #[error("Invalid summary response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, SummaryError>;

/// External summarization service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Holds the most recent summary.
#[derive(Debug, Default, Clone)]
pub struct SummaryPane {
    summary: Option<String>,
}

impl SummaryPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Ask for a fresh summary of `text`.
    ///
    /// Returns whether the summary changed. Failures are logged and swallowed.
    pub async fn refresh<S: Summarizer + ?Sized>(&mut self, summarizer: &S, text: &str) -> bool {
        debug!("Requesting summary of {} chars", text.chars().count());
        match summarizer.summarize(text).await {
            Ok(summary) => {
                self.summary = Some(summary);
                true
            }
            Err(e) => {
                warn!("Summary request failed: {}", e);
                false
            }
        }
    }
}
