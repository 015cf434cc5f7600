//! HTTP client for the external summarization service.
//!
//! `POST <url>` with `{"text": "..."}`, expecting `{"summary": "..."}` back.

use async_trait::async_trait;
use collab_core::summary::{Result, Summarizer, SummaryError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct SummaryRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

pub struct HttpSummarizer {
    client: reqwest::Client,
    url: String,
}

impl HttpSummarizer {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&SummaryRequest { text })
            .send()
            .await
            .map_err(|e| SummaryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SummaryError::Status(status.as_u16()));
        }

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;
        Ok(body.summary)
    }
}
