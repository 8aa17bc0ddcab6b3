use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use super::normalize::normalize_ocr;
use super::{build_client, check_input, AdapterError, AdapterErrorKind, OcrAnalyzer};
use crate::models::{Document, OcrResult};

const ANALYZER: &str = "ocr";

/// OCR analyzer reached over HTTP. The raw document is POSTed with its
/// media type as `Content-Type`; the JSON answer is normalized.
pub struct HttpOcrAdapter {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpOcrAdapter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self::with_client(endpoint, timeout, build_client()?))
    }

    /// Share one connection pool between adapters.
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
impl OcrAnalyzer for HttpOcrAdapter {
    fn name(&self) -> &'static str {
        ANALYZER
    }

    async fn analyze(&self, document: &Document) -> Result<OcrResult, AdapterError> {
        check_input(document)?;

        let span = tracing::info_span!(
            "ocr_analyze",
            endpoint = %self.endpoint,
            size = document.size_bytes(),
            media_type = %document.media_type(),
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
                tracing::warn!(status = status.as_u16(), "OCR analyzer returned non-success status");
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
            let result = normalize_ocr(&body).map_err(|reason| {
                AdapterError::unavailable(ANALYZER, AdapterErrorKind::MalformedBody, reason)
            })?;

            tracing::info!(
                elapsed_ms = %start.elapsed().as_millis(),
                text_len = result.text.len(),
                fields = result.fields.detected_count(),
                confidence = result.confidence,
                "OCR analysis complete"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::evidence::test_support::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/ocr/extract")
    }

    fn adapter(endpoint: &str, timeout: Duration) -> HttpOcrAdapter {
        HttpOcrAdapter::new(endpoint, timeout).unwrap()
    }

    #[tokio::test]
    async fn success_is_normalized() {
        let router = Router::new().route(
            "/ocr/extract",
            post(|headers: HeaderMap, body: axum::body::Bytes| async move {
                assert_eq!(headers["content-type"], "image/png");
                assert_eq!(headers["x-filename"], "certificate.png");
                assert_eq!(&body[..], b"png-bytes");
                axum::Json(serde_json::json!({
                    "text": "Rahul Verma, Delhi University",
                    "fields": {"studentName": "Rahul Verma", "institutionName": "Delhi University"},
                    "confidence": 0.93
                }))
            }),
        );
        let url = serve(router).await;

        let result = adapter(&url, Duration::from_secs(5))
            .analyze(&png_document(b"png-bytes"))
            .await
            .unwrap();
        assert_eq!(result.fields.name(), Some("Rahul Verma"));
        assert_eq!(result.fields.institution(), Some("Delhi University"));
        assert!((result.confidence - 0.93).abs() < 1e-6);
    }

    #[tokio::test]
    async fn non_2xx_is_unavailable_with_status() {
        let router = Router::new().route(
            "/ocr/extract",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = serve(router).await;

        let err = adapter(&url, Duration::from_secs(5))
            .analyze(&png_document(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Unavailable {
                analyzer: "ocr",
                kind: AdapterErrorKind::Status(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_unavailable() {
        let router = Router::new().route("/ocr/extract", post(|| async { "not json at all" }));
        let url = serve(router).await;

        let err = adapter(&url, Duration::from_secs(5))
            .analyze(&png_document(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Unavailable {
                kind: AdapterErrorKind::MalformedBody,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn json_array_body_is_malformed() {
        let router = Router::new().route(
            "/ocr/extract",
            post(|| async { axum::Json(serde_json::json!(["text"])) }),
        );
        let url = serve(router).await;

        let err = adapter(&url, Duration::from_secs(5))
            .analyze(&png_document(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Unavailable {
                kind: AdapterErrorKind::MalformedBody,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_extraction_is_not_an_error() {
        let router = Router::new().route(
            "/ocr/extract",
            post(|| async { axum::Json(serde_json::json!({"text": "", "fields": {}})) }),
        );
        let url = serve(router).await;

        let result = adapter(&url, Duration::from_secs(5))
            .analyze(&png_document(b"blank page"))
            .await
            .unwrap();
        assert_eq!(result, OcrResult::empty());
    }

    #[tokio::test]
    async fn slow_analyzer_times_out() {
        let router = Router::new().route(
            "/ocr/extract",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(serde_json::json!({"text": "late"}))
            }),
        );
        let url = serve(router).await;

        let err = adapter(&url, Duration::from_millis(100))
            .analyze(&png_document(b"x"))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = adapter(&format!("http://{addr}/ocr/extract"), Duration::from_secs(2))
            .analyze(&png_document(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unavailable { analyzer: "ocr", .. }));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn unrecognized_media_type_is_invalid_input() {
        let err = adapter("http://127.0.0.1:9/ocr", Duration::from_secs(1))
            .analyze(&document_with(b"hello", "text/plain"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidInput(_)));
    }
}
