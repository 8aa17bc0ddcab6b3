use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use super::normalize::normalize_tamper;
use super::{build_client, check_input, AdapterError, AdapterErrorKind, TamperAnalyzer};
use crate::models::{Document, TamperAnalysis};

const ANALYZER: &str = "tamper";

/// Forensic (ELA) analyzer reached over HTTP.
pub struct HttpTamperAdapter {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTamperAdapter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self::with_client(endpoint, timeout, build_client()?))
    }

    pub fn with_client(endpoint: &str, timeout: Duration, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TamperAnalyzer for HttpTamperAdapter {
    fn name(&self) -> &'static str {
        ANALYZER
    }

    async fn analyze(&self, document: &Document) -> Result<TamperAnalysis, AdapterError> {
        check_input(document)?;

        let span = tracing::info_span!(
            "tamper_analyze",
            endpoint = %self.endpoint,
            size = document.size_bytes(),
        );

        async {
            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .timeout(self.timeout)
                .header(reqwest::header::CONTENT_TYPE, document.media_type().as_str())
                .header("X-Filename", document.filename())
                .body(document.content().to_vec())
                .send()
                .await
                .map_err(|e| AdapterError::from_reqwest(ANALYZER, e))?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(status = status.as_u16(), "Tamper analyzer returned non-success status");
                return Err(AdapterError::unavailable(
                    ANALYZER,
                    AdapterErrorKind::Status(status.as_u16()),
                    status.canonical_reason().unwrap_or("unexpected status"),
                ));
            }

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| AdapterError::from_reqwest(ANALYZER, e))?;
            let analysis = normalize_tamper(&body).map_err(|reason| {
                AdapterError::unavailable(ANALYZER, AdapterErrorKind::MalformedBody, reason)
            })?;

            tracing::info!(
                elapsed_ms = %start.elapsed().as_millis(),
                verdict = analysis.verdict.as_str(),
                score = analysis.score,
                risk = analysis.risk_level.as_str(),
                images = analysis.evidence_images.len(),
                "Tamper analysis complete"
            );
            Ok(analysis)
        }
        .instrument(span)
        .await
    }
}
