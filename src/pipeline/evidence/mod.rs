//! Evidence adapters: uniform async wrappers around the two external
//! analyzers. Each returns a typed result or a typed failure and never
//! lets a transport problem escape as anything else.

pub mod mock;
pub mod normalize;
pub mod ocr;
pub mod tamper;

pub use mock::{MockOcrAnalyzer, MockTamperAnalyzer};
pub use ocr::HttpOcrAdapter;
pub use tamper::HttpTamperAdapter;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Document, OcrResult, TamperAnalysis};

/// Why an analyzer could not be consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterErrorKind {
    Transport,
    Timeout,
    Status(u16),
    MalformedBody,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => f.write_str("transport failure"),
            Self::Timeout => f.write_str("timed out"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::MalformedBody => f.write_str("malformed response"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The document cannot be sent to this analyzer at all.
    #[error("Invalid input for analyzer: {0}")]
    InvalidInput(String),

    #[error("{analyzer} analyzer unavailable ({kind}): {reason}")]
    Unavailable {
        analyzer: &'static str,
        kind: AdapterErrorKind,
        reason: String,
    },
}

impl AdapterError {
    pub fn unavailable(analyzer: &'static str, kind: AdapterErrorKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            analyzer,
            kind,
            reason: reason.into(),
        }
    }

    pub fn timeout(analyzer: &'static str, after: Duration) -> Self {
        Self::unavailable(
            analyzer,
            AdapterErrorKind::Timeout,
            format!("no answer within {}s", after.as_secs_f64()),
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Unavailable {
                kind: AdapterErrorKind::Timeout,
                ..
            }
        )
    }

    /// Map a reqwest failure onto the adapter taxonomy.
    pub(crate) fn from_reqwest(analyzer: &'static str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            AdapterErrorKind::Timeout
        } else if err.is_decode() {
            AdapterErrorKind::MalformedBody
        } else if let Some(status) = err.status() {
            AdapterErrorKind::Status(status.as_u16())
        } else {
            AdapterErrorKind::Transport
        };
        Self::unavailable(analyzer, kind, err.to_string())
    }
}

/// Text and field extraction.
#[async_trait]
pub trait OcrAnalyzer: Send + Sync {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn analyze(&self, document: &Document) -> Result<OcrResult, AdapterError>;
}

/// Forensic tamper analysis.
#[async_trait]
pub trait TamperAnalyzer: Send + Sync {
    fn name(&self) -> &'static str {
        "tamper"
    }

    async fn analyze(&self, document: &Document) -> Result<TamperAnalysis, AdapterError>;
}

/// Shared precondition of both analyzers.
pub(crate) fn check_input(document: &Document) -> Result<(), AdapterError> {
    if document.content().is_empty() {
        return Err(AdapterError::InvalidInput("document content is empty".into()));
    }
    if !document.media_type().is_recognized() {
        return Err(AdapterError::InvalidInput(format!(
            "media type {} is neither image/* nor application/pdf",
            document.media_type()
        )));
    }
    Ok(())
}

/// Build the shared HTTP client. No global timeout: each request sets its own.
pub(crate) fn build_client() -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .user_agent(concat!("certverify/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterError::unavailable("http", AdapterErrorKind::Transport, e.to_string()))
}
