//! Verification orchestrator: the single entry point of the pipeline.
//!
//! Flow for one submission:
//! 1. Intake (validate, sniff, fingerprint)
//! 2. Fingerprint lookup: a recorded verdict is returned as-is
//! 3. OCR and tamper analysis concurrently, each under its own timeout;
//!    the record match runs once OCR settles, under its own bound
//! 4. Aggregation
//! 5. Audit write (insert-if-absent); losing a race re-reads the winner
//!
//! Dropping the `verify` future cancels in-flight analyzer calls and
//! writes nothing.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

use super::aggregate::{DecisionPolicy, Evidence, StateError, VerificationRun};
use super::audit::{AuditError, AuditStore, SqliteAuditStore};
use super::evidence::{
    build_client, AdapterError, HttpOcrAdapter, HttpTamperAdapter, OcrAnalyzer, TamperAnalyzer,
};
use super::intake::{self, IntakeError};
use super::matching::{MatchOutcome, MatchSkip, RecordMatcher, SqliteRecordStore};
use crate::config::{ConfigError, VerifierConfig};
use crate::db::{DatabaseError, SharedConnection};
use crate::models::{
    AuditFilter, AuditRecord, Document, OcrFields, OcrResult, Page, PageRequest, Submission,
    TamperAnalysis, VerdictPayload, VerificationState, VerificationVerdict,
};

/// Failures `verify` reports instead of a verdict.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Client-correctable; nothing was analyzed or recorded.
    #[error("Invalid payload: {0}")]
    PayloadInvalid(#[from] IntakeError),

    /// The verdict could not be durably recorded, so none is returned.
    #[error("Verdict could not be recorded: {0}")]
    PersistenceWrite(String),

    #[error("Audit lookup failed: {0}")]
    AuditLookup(String),

    #[error(transparent)]
    Lifecycle(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Cannot prepare data directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-call bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_document_bytes: usize,
    pub ocr_timeout: Duration,
    pub tamper_timeout: Duration,
    pub record_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&VerifierConfig::default())
    }
}

impl From<&VerifierConfig> for Limits {
    fn from(config: &VerifierConfig) -> Self {
        Self {
            max_document_bytes: config.max_document_bytes,
            ocr_timeout: config.ocr_timeout(),
            tamper_timeout: config.tamper_timeout(),
            record_timeout: config.record_timeout(),
        }
    }
}

/// A verdict together with where it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub audit_id: Uuid,
    pub fingerprint: String,
    pub verdict: VerificationVerdict,
    /// True when the verdict came from an earlier identical submission.
    pub reused: bool,
}

impl VerificationOutcome {
    fn from_record(record: AuditRecord, reused: bool) -> Self {
        Self {
            audit_id: record.id,
            fingerprint: record.document.fingerprint,
            verdict: record.verdict,
            reused,
        }
    }

    /// The exposure-filtered view for callers.
    pub fn payload(&self) -> VerdictPayload {
        VerdictPayload::new(&self.fingerprint, &self.verdict)
    }
}

pub struct VerificationOrchestrator {
    ocr: Arc<dyn OcrAnalyzer>,
    tamper: Arc<dyn TamperAnalyzer>,
    matcher: RecordMatcher,
    audit: Arc<dyn AuditStore>,
    policy: DecisionPolicy,
    limits: Limits,
}

impl VerificationOrchestrator {
    pub fn new(
        ocr: Arc<dyn OcrAnalyzer>,
        tamper: Arc<dyn TamperAnalyzer>,
        matcher: RecordMatcher,
        audit: Arc<dyn AuditStore>,
        policy: DecisionPolicy,
    ) -> Self {
        Self {
            ocr,
            tamper,
            matcher,
            audit,
            policy,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Production wiring: open the database at `config.database_path`.
    pub fn from_config(config: &VerifierConfig) -> Result<Self, SetupError> {
        config.validate()?;
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = SharedConnection::open(&config.database_path)?;
        Self::with_connection(config, conn)
    }

    /// HTTP analyzers plus SQLite record and audit stores over `conn`.
    pub fn with_connection(config: &VerifierConfig, conn: SharedConnection) -> Result<Self, SetupError> {
        let client = build_client()?;
        let ocr = HttpOcrAdapter::with_client(&config.ocr_endpoint, config.ocr_timeout(), client.clone());
        let tamper = HttpTamperAdapter::with_client(&config.tamper_endpoint, config.tamper_timeout(), client);
        let matcher = RecordMatcher::new(
            Arc::new(SqliteRecordStore::new(conn.clone())),
            config.weights,
            config.name_similarity_floor,
        );
        let audit = SqliteAuditStore::new(conn, config.max_page_size);

        tracing::info!(
            ocr = %config.ocr_endpoint,
            tamper = %config.tamper_endpoint,
            threshold = config.match_acceptance_threshold,
            "Verification orchestrator ready"
        );

        Ok(Self::new(
            Arc::new(ocr),
            Arc::new(tamper),
            matcher,
            Arc::new(audit),
            DecisionPolicy::from(config),
        )
        .with_limits(Limits::from(config)))
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Verify one submission. Identical bytes always yield the recorded verdict.
    pub async fn verify(&self, submission: Submission) -> Result<VerificationVerdict, VerifyError> {
        Ok(self.verify_detailed(submission).await?.verdict)
    }

    #[tracing::instrument(
        name = "verify",
        skip_all,
        fields(filename = %submission.filename, fingerprint = tracing::field::Empty)
    )]
    pub async fn verify_detailed(&self, submission: Submission) -> Result<VerificationOutcome, VerifyError> {
        let document = intake::accept(submission, self.limits.max_document_bytes).map_err(|e| {
            tracing::info!(error = %e, "Submission rejected at intake");
            e
        })?;
        tracing::Span::current().record("fingerprint", document.fingerprint());

        if let Some(existing) = self.lookup(document.fingerprint()).await? {
            tracing::info!(
                decision = existing.verdict.decision.as_str(),
                audit_id = %existing.id,
                "Returning recorded verdict"
            );
            return Ok(VerificationOutcome::from_record(existing, true));
        }

        let start = std::time::Instant::now();
        let mut run = VerificationRun::new();
        run.advance(VerificationState::EvidenceGathering)?;
        let evidence = self.gather(&document).await;
        run.advance(VerificationState::Aggregating)?;
        let verdict = run.conclude(&evidence, &self.policy)?;

        let Evidence { ocr, tamper, .. } = evidence;
        let record = AuditRecord::new(document.metadata(), ocr.ok(), tamper.ok(), verdict);

        match self.audit.create(record).await {
            Ok(created) => {
                tracing::info!(
                    decision = created.verdict.decision.as_str(),
                    exposure = created.verdict.exposure.as_str(),
                    audit_id = %created.id,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "Verification complete"
                );
                Ok(VerificationOutcome::from_record(created, false))
            }
            Err(AuditError::DuplicateFingerprint(fp)) => {
                tracing::warn!("Concurrent verification recorded first; reading its verdict");
                match self.lookup(&fp).await? {
                    Some(existing) => Ok(VerificationOutcome::from_record(existing, true)),
                    None => Err(VerifyError::PersistenceWrite(format!(
                        "duplicate fingerprint {fp} reported but no record found"
                    ))),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Audit write failed; discarding verdict");
                Err(VerifyError::PersistenceWrite(e.to_string()))
            }
        }
    }

    /// Verify several submissions concurrently. Results keep input order.
    pub async fn verify_batch(
        &self,
        submissions: Vec<Submission>,
    ) -> Vec<Result<VerificationVerdict, VerifyError>> {
        join_all(submissions.into_iter().map(|s| self.verify(s))).await
    }

    /// Recent audit records for dashboard consumers.
    pub async fn history(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<Page<AuditRecord>, VerifyError> {
        self.audit
            .list(filter, page)
            .await
            .map_err(|e| VerifyError::AuditLookup(e.to_string()))
    }

    pub async fn audit_record(&self, id: &Uuid) -> Result<Option<AuditRecord>, VerifyError> {
        self.audit
            .find_by_id(id)
            .await
            .map_err(|e| VerifyError::AuditLookup(e.to_string()))
    }

    pub async fn audit_record_by_fingerprint(&self, fingerprint: &str) -> Result<Option<AuditRecord>, VerifyError> {
        self.lookup(fingerprint).await
    }

    async fn lookup(&self, fingerprint: &str) -> Result<Option<AuditRecord>, VerifyError> {
        self.audit
            .find_by_fingerprint(fingerprint)
            .await
            .map_err(|e| VerifyError::AuditLookup(e.to_string()))
    }

    /// Both branches always settle: each is bounded by its own timeout.
    async fn gather(&self, document: &Document) -> Evidence {
        let ocr_branch = async {
            let ocr = self.run_ocr(document).await;
            let matching = match &ocr {
                Err(_) => MatchOutcome::skipped(MatchSkip::OcrUnavailable),
                Ok(result) if result.fields.name().is_none() => MatchOutcome::skipped(MatchSkip::NoName),
                Ok(result) => self.run_matcher(&result.fields).await,
            };
            (ocr, matching)
        };
        let tamper_branch = self.run_tamper(document);

        let ((ocr, matching), tamper) = tokio::join!(ocr_branch, tamper_branch);
        Evidence { ocr, tamper, matching }
    }

    async fn run_ocr(&self, document: &Document) -> Result<OcrResult, AdapterError> {
        let limit = self.limits.ocr_timeout;
        let result = match timeout(limit, self.ocr.analyze(document)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::timeout(self.ocr.name(), limit)),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "OCR evidence unavailable");
        }
        result
    }

    async fn run_tamper(&self, document: &Document) -> Result<TamperAnalysis, AdapterError> {
        let limit = self.limits.tamper_timeout;
        let result = match timeout(limit, self.tamper.analyze(document)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::timeout(self.tamper.name(), limit)),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Tamper evidence unavailable");
        }
        result
    }

    /// The record store is blocking, so the pass runs off the async workers.
    async fn run_matcher(&self, fields: &OcrFields) -> MatchOutcome {
        let matcher = self.matcher.clone();
        let fields = fields.clone();
        let task = tokio::task::spawn_blocking(move || {
            MatchOutcome::from_stream(matcher.match_fields(&fields))
        });

        match timeout(self.limits.record_timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Record match task failed");
                MatchOutcome::skipped(MatchSkip::Aborted)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.limits.record_timeout.as_millis() as u64,
                    "Record match timed out"
                );
                MatchOutcome::skipped(MatchSkip::TimedOut)
            }
        }
    }
}

impl std::fmt::Debug for VerificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationOrchestrator")
            .field("ocr", &self.ocr.name())
            .field("tamper", &self.tamper.name())
            .field("matcher", &self.matcher)
            .field("policy", &self.policy)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
