use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media types the analyzers accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(String);

impl MediaType {
    pub const PDF: &'static str = "application/pdf";

    /// Normalize a declared media type: lowercase essence, parameters dropped.
    pub fn parse(raw: &str) -> Self {
        let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        Self(essence)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_image(&self) -> bool {
        self.0
            .strip_prefix("image/")
            .is_some_and(|subtype| !subtype.is_empty())
    }

    pub fn is_pdf(&self) -> bool {
        self.0 == Self::PDF
    }

    /// image/* or application/pdf.
    pub fn is_recognized(&self) -> bool {
        self.is_image() || self.is_pdf()
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the upload boundary hands over. Nothing is trusted yet.
#[derive(Debug, Clone)]
pub struct Submission {
    pub content: Vec<u8>,
    pub filename: String,
    pub media_type: String,
}

impl Submission {
    pub fn new(content: impl Into<Vec<u8>>, filename: &str, media_type: &str) -> Self {
        Self {
            content: content.into(),
            filename: filename.to_string(),
            media_type: media_type.to_string(),
        }
    }
}

/// An accepted certificate upload. Immutable once constructed; only
/// `pipeline::intake::accept` builds one.
#[derive(Debug, Clone)]
pub struct Document {
    content: Arc<[u8]>,
    fingerprint: String,
    filename: String,
    media_type: MediaType,
    submitted_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn new(
        content: Vec<u8>,
        fingerprint: String,
        filename: String,
        media_type: MediaType,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            fingerprint,
            filename,
            media_type,
            submitted_at,
        }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            fingerprint: self.fingerprint.clone(),
            filename: self.filename.clone(),
            media_type: self.media_type.clone(),
            size_bytes: self.content.len() as u64,
            submitted_at: self.submitted_at,
        }
    }
}

/// The persisted, content-free view of a Document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub fingerprint: String,
    pub filename: String,
    pub media_type: MediaType,
    pub size_bytes: u64,
    pub submitted_at: DateTime<Utc>,
}
