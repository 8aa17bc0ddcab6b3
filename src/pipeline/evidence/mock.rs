//! Mock analyzers for testing and offline runs.
//!
//! Each returns a fixed outcome, optionally after a delay, and counts calls
//! so tests can assert that a cached verdict skipped the analyzers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{check_input, AdapterError, AdapterErrorKind, OcrAnalyzer, TamperAnalyzer};
use crate::models::{
    Document, EvidenceImage, FieldValue, OcrFields, OcrResult, RiskLevel, TamperAnalysis,
    TamperVerdict,
};

/// Mock OCR analyzer with a configurable answer.
pub struct MockOcrAnalyzer {
    outcome: Result<OcrResult, AdapterError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockOcrAnalyzer {
    pub fn returning(result: OcrResult) -> Self {
        Self {
            outcome: Ok(result),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer with the given identity fields at confidence 0.9.
    pub fn with_fields(name: &str, institution: &str, program: &str) -> Self {
        let field = |v: &str| {
            (!v.is_empty()).then(|| FieldValue {
                value: v.to_string(),
                confidence: 0.9,
            })
        };
        Self::returning(OcrResult {
            text: format!("{name}\n{institution}\n{program}"),
            fields: OcrFields {
                name: field(name),
                institution: field(institution),
                program: field(program),
                ..Default::default()
            },
            confidence: 0.9,
        })
    }

    pub fn failing(error: AdapterError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Shorthand for an analyzer that answers 503.
    pub fn unavailable() -> Self {
        Self::failing(AdapterError::unavailable(
            "ocr",
            AdapterErrorKind::Status(503),
            "Service Unavailable",
        ))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrAnalyzer for MockOcrAnalyzer {
    async fn analyze(&self, document: &Document) -> Result<OcrResult, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check_input(document)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

/// Mock tamper analyzer with a configurable answer.
pub struct MockTamperAnalyzer {
    outcome: Result<TamperAnalysis, AdapterError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTamperAnalyzer {
    pub fn returning(analysis: TamperAnalysis) -> Self {
        Self {
            outcome: Ok(analysis),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn genuine(score: f64) -> Self {
        Self::returning(TamperAnalysis {
            verdict: TamperVerdict::Genuine,
            score,
            risk_level: RiskLevel::Low,
            evidence_images: vec![EvidenceImage {
                kind: "noise".into(),
                reference: "/images/mock_noise.jpg".into(),
                description: Some("ELA analysis visualization".into()),
            }],
        })
    }

    pub fn tampered(score: f64, risk_level: RiskLevel) -> Self {
        Self::returning(TamperAnalysis {
            verdict: TamperVerdict::Tampered,
            score,
            risk_level,
            evidence_images: vec![
                EvidenceImage {
                    kind: "noise".into(),
                    reference: "/images/mock_noise.jpg".into(),
                    description: Some("ELA analysis visualization".into()),
                },
                EvidenceImage {
                    kind: "tampered".into(),
                    reference: "/images/mock_tampered.jpg".into(),
                    description: Some("Original image with marked suspicious regions".into()),
                },
            ],
        })
    }

    pub fn failing(error: AdapterError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::failing(AdapterError::unavailable(
            "tamper",
            AdapterErrorKind::Transport,
            "connection refused",
        ))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TamperAnalyzer for MockTamperAnalyzer {
    async fn analyze(&self, document: &Document) -> Result<TamperAnalysis, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check_input(document)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}
