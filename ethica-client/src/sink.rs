//! Forwarding of normalized events to the tracking service

use async_trait::async_trait;
use ethica_common::normalizer::ProgressEvent;
use std::time::Duration;

use crate::error::{ClientError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Destination for events produced by cache transitions
///
/// Implementations must tolerate the same statement id arriving more than
/// once; replays and `resync` rely on it.
#[async_trait]
pub trait StatementSink: Send + Sync {
    async fn send(&self, event: &ProgressEvent) -> Result<()>;
}

/// Posts events to `POST {base_url}/api/progress`
pub struct HttpStatementSink {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpStatementSink {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("ethica-client/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/api/progress", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StatementSink for HttpStatementSink {
    async fn send(&self, event: &ProgressEvent) -> Result<()> {
        tracing::debug!(
            endpoint = %self.endpoint,
            learner_id = ?event.learner_id,
            lesson_id = ?event.lesson_id,
            "Forwarding progress event"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let sink = HttpStatementSink::new("http://127.0.0.1:5780/").unwrap();
        assert_eq!(sink.endpoint(), "http://127.0.0.1:5780/api/progress");
    }
}
