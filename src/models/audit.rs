use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentMetadata;
use super::evidence::{OcrResult, TamperAnalysis};
use super::record::MatchCandidate;
use super::verdict::VerificationVerdict;

/// One immutable entry per verified fingerprint. Corrections are new
/// records pointing at the old one through `supersedes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub document: DocumentMetadata,
    pub ocr: Option<OcrResult>,
    pub tamper: Option<TamperAnalysis>,
    pub best_match: Option<MatchCandidate>,
    pub verdict: VerificationVerdict,
    pub supersedes: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        document: DocumentMetadata,
        ocr: Option<OcrResult>,
        tamper: Option<TamperAnalysis>,
        verdict: VerificationVerdict,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document,
            ocr,
            tamper,
            best_match: verdict.best_match.clone(),
            verdict,
            supersedes: None,
            created_at: Utc::now(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.document.fingerprint
    }
}
