use serde::{Deserialize, Serialize};

use super::enums::{Decision, EvidenceExposure, RecordKind, RiskLevel, TamperVerdict};
use super::evidence::{EvidenceImage, TamperAnalysis};
use super::record::MatchCandidate;

/// The single decision recorded per document fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub decision: Decision,
    pub exposure: EvidenceExposure,
    pub best_match: Option<MatchCandidate>,
    /// Present whenever the tamper analyzer answered, even if the
    /// exposure policy keeps it from the caller.
    pub tamper: Option<TamperAnalysis>,
    pub rationale: String,
}

/// Lifecycle of one verification. The last four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationState {
    Received,
    EvidenceGathering,
    Aggregating,
    Verified,
    Rejected,
    Inconclusive,
    InconclusiveDegraded,
}

impl VerificationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Verified | Self::Rejected | Self::Inconclusive | Self::InconclusiveDegraded
        )
    }

    pub fn can_transition_to(&self, next: VerificationState) -> bool {
        match self {
            Self::Received => next == Self::EvidenceGathering,
            Self::EvidenceGathering => next == Self::Aggregating,
            Self::Aggregating => next.is_terminal(),
            _ => false,
        }
    }
}

impl From<Decision> for VerificationState {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Verified => Self::Verified,
            Decision::Rejected => Self::Rejected,
            Decision::Inconclusive => Self::Inconclusive,
            Decision::InconclusiveDegraded => Self::InconclusiveDegraded,
        }
    }
}

/// Match details safe to hand to any caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub kind: RecordKind,
    pub holder_name: String,
    pub institution: String,
    pub program: String,
    pub issue_year: Option<i32>,
    pub accuracy: u8,
}

impl From<&MatchCandidate> for MatchSummary {
    fn from(candidate: &MatchCandidate) -> Self {
        Self {
            kind: candidate.record.kind,
            holder_name: candidate.record.holder_name.clone(),
            institution: candidate.record.institution.clone(),
            program: candidate.record.program.clone(),
            issue_year: candidate.record.issue_year,
            accuracy: candidate.accuracy,
        }
    }
}

/// Forensic evidence as exposed under `EvidenceExposure::Full`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicEvidence {
    pub verdict: TamperVerdict,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub images: Vec<EvidenceImage>,
}

/// What leaves the core: the verdict with forensic evidence filtered by
/// the exposure policy. Built only from a `VerificationVerdict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictPayload {
    pub fingerprint: String,
    pub decision: Decision,
    pub exposure: EvidenceExposure,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_match: Option<MatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forensics: Option<ForensicEvidence>,
    pub rationale: String,
}

impl VerdictPayload {
    pub fn new(fingerprint: &str, verdict: &VerificationVerdict) -> Self {
        let forensics = match verdict.exposure {
            EvidenceExposure::Full => verdict.tamper.as_ref().map(|t| ForensicEvidence {
                verdict: t.verdict,
                score: t.score,
                risk_level: t.risk_level,
                images: t.evidence_images.clone(),
            }),
            EvidenceExposure::None | EvidenceExposure::Unavailable => None,
        };

        Self {
            fingerprint: fingerprint.to_string(),
            decision: verdict.decision,
            exposure: verdict.exposure,
            best_match: verdict.best_match.as_ref().map(MatchSummary::from),
            forensics,
            rationale: verdict.rationale.clone(),
        }
    }
}
