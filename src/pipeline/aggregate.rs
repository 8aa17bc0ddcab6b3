//! Verdict aggregation.
//!
//! `aggregate` is a pure function of the three evidence branches and the
//! decision policy. Rules are evaluated in fixed priority order:
//!
//! 1. best match accuracy >= threshold → VERIFIED, exposure NONE
//! 2. tamper verdict TAMPERED → REJECTED, exposure FULL
//! 3. tamper verdict GENUINE → INCONCLUSIVE, exposure FULL
//! 4. otherwise → INCONCLUSIVE_DEGRADED, exposure UNAVAILABLE
//!
//! Exposure is NONE exactly when rule 1 fires.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::evidence::AdapterError;
use super::matching::{MatchOutcome, MatchSkip};
use crate::config::VerifierConfig;
use crate::models::{
    Decision, EvidenceExposure, MatchCandidate, OcrResult, TamperAnalysis, TamperVerdict,
    VerificationState, VerificationVerdict,
};

/// Tunable decision thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub acceptance_threshold: u8,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            acceptance_threshold: 85,
        }
    }
}

impl From<&VerifierConfig> for DecisionPolicy {
    fn from(config: &VerifierConfig) -> Self {
        Self {
            acceptance_threshold: config.match_acceptance_threshold,
        }
    }
}

/// Everything the aggregator looks at for one document.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub ocr: Result<OcrResult, AdapterError>,
    pub tamper: Result<TamperAnalysis, AdapterError>,
    pub matching: MatchOutcome,
}

pub fn aggregate(evidence: &Evidence, policy: &DecisionPolicy) -> VerificationVerdict {
    let best = evidence.matching.best.as_ref();
    let tamper = evidence.tamper.as_ref().ok();

    let (decision, exposure, mut rationale) = match (best, tamper) {
        (Some(candidate), _) if candidate.accuracy >= policy.acceptance_threshold => (
            Decision::Verified,
            EvidenceExposure::None,
            format!(
                "Matched {} record for {} at {} with accuracy {}% (threshold {}%).",
                candidate.record.kind,
                candidate.record.holder_name,
                candidate.record.institution,
                candidate.accuracy,
                policy.acceptance_threshold
            ),
        ),
        (_, Some(t)) if t.verdict == TamperVerdict::Tampered => (
            Decision::Rejected,
            EvidenceExposure::Full,
            format!(
                "Forensic analysis detected tampering (score {:.2}, risk {}). {}",
                t.score,
                t.risk_level,
                match_summary(best, policy)
            ),
        ),
        (_, Some(t)) if t.verdict == TamperVerdict::Genuine => (
            Decision::Inconclusive,
            EvidenceExposure::Full,
            format!(
                "Forensic analysis found no tampering (score {:.2}, risk {}). {} Flagged for human review.",
                t.score,
                t.risk_level,
                match_summary(best, policy)
            ),
        ),
        _ => (
            Decision::InconclusiveDegraded,
            EvidenceExposure::Unavailable,
            format!("{} {}", tamper_absence(&evidence.tamper), match_summary(best, policy)),
        ),
    };

    for note in supporting_notes(evidence, best) {
        rationale.push(' ');
        rationale.push_str(&note);
    }

    VerificationVerdict {
        decision,
        exposure,
        best_match: best.cloned(),
        tamper: tamper.cloned(),
        rationale,
    }
}

fn match_summary(best: Option<&MatchCandidate>, policy: &DecisionPolicy) -> String {
    match best {
        Some(c) => format!(
            "Best authoritative match ({} record for {}) reached {}%, below the {}% threshold.",
            c.record.kind, c.record.holder_name, c.accuracy, policy.acceptance_threshold
        ),
        None => "No authoritative record matched.".to_string(),
    }
}

fn tamper_absence(tamper: &Result<TamperAnalysis, AdapterError>) -> String {
    match tamper {
        Err(AdapterError::Unavailable { analyzer, reason, kind }) => {
            format!("The {analyzer} analyzer could not be consulted ({kind}: {reason}).")
        }
        Err(AdapterError::InvalidInput(reason)) => {
            format!("The tamper analyzer could not be consulted (invalid input: {reason}).")
        }
        Ok(_) => "The tamper analyzer returned no conclusive verdict.".to_string(),
    }
}

/// Context that never changes the decision: OCR availability, record
/// store trouble, reference-id corroboration.
fn supporting_notes(evidence: &Evidence, best: Option<&MatchCandidate>) -> Vec<String> {
    let mut notes = Vec::new();

    match (&evidence.ocr, evidence.matching.skipped) {
        (Err(e), _) => notes.push(format!(
            "The OCR analyzer could not be consulted ({}); record matching was skipped.",
            short_reason(e)
        )),
        (Ok(_), Some(MatchSkip::NoName)) => {
            notes.push("OCR found no holder name; record matching was skipped.".to_string())
        }
        (Ok(_), Some(MatchSkip::TimedOut)) => {
            notes.push("Record lookup timed out; treated as no match.".to_string())
        }
        (Ok(_), Some(MatchSkip::Aborted)) => {
            notes.push("Record lookup did not complete; treated as no match.".to_string())
        }
        _ => {}
    }

    if !evidence.matching.failures.is_empty() {
        let kinds: Vec<&str> = evidence
            .matching
            .failures
            .iter()
            .map(|f| f.kind.as_str())
            .collect();
        notes.push(format!(
            "Record store errors in {} collection(s): {}.",
            kinds.len(),
            kinds.join(", ")
        ));
    }

    if let (Ok(ocr), Some(candidate)) = (&evidence.ocr, best) {
        if let (Some(seen), Some(expected)) =
            (ocr.fields.reference_id(), candidate.record.reference_id.as_deref())
        {
            if seen.trim().eq_ignore_ascii_case(expected.trim()) {
                notes.push(format!("Reference id {expected} corroborates the match."));
            }
        }
    }

    notes
}

fn short_reason(err: &AdapterError) -> String {
    match err {
        AdapterError::Unavailable { kind, .. } => kind.to_string(),
        AdapterError::InvalidInput(reason) => format!("invalid input: {reason}"),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Illegal verification transition {from:?} -> {to:?}")]
pub struct StateError {
    pub from: VerificationState,
    pub to: VerificationState,
}

/// Tracks one verification through its lifecycle. Only forward moves are
/// legal; terminal states accept nothing.
#[derive(Debug, Clone)]
pub struct VerificationRun {
    state: VerificationState,
}

impl Default for VerificationRun {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationRun {
    pub fn new() -> Self {
        Self {
            state: VerificationState::Received,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn advance(&mut self, next: VerificationState) -> Result<(), StateError> {
        if !self.state.can_transition_to(next) {
            return Err(StateError {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = ?self.state, to = ?next, "Verification state change");
        self.state = next;
        Ok(())
    }

    /// AGGREGATING → terminal, using the aggregator's decision. From any
    /// other state the error names the terminal state that was refused.
    pub fn conclude(
        &mut self,
        evidence: &Evidence,
        policy: &DecisionPolicy,
    ) -> Result<VerificationVerdict, StateError> {
        let verdict = aggregate(evidence, policy);
        self.advance(verdict.decision.into())?;
        Ok(verdict)
    }
}
