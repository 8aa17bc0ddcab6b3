//! Verification pipeline: intake, evidence gathering, record matching,
//! aggregation and audit.

pub mod aggregate;
pub mod audit;
pub mod evidence;
pub mod fingerprint;
pub mod intake;
pub mod matching;
pub mod orchestrator;

pub use aggregate::{aggregate, DecisionPolicy, Evidence, StateError, VerificationRun};
pub use audit::{AuditError, AuditStore, SqliteAuditStore};
pub use evidence::{
    AdapterError, AdapterErrorKind, HttpOcrAdapter, HttpTamperAdapter, MockOcrAnalyzer,
    MockTamperAnalyzer, OcrAnalyzer, TamperAnalyzer,
};
pub use intake::IntakeError;
pub use matching::{MatchOutcome, MatchSkip, RecordMatcher, RecordSource, SqliteRecordStore};
pub use orchestrator::{Limits, SetupError, VerificationOrchestrator, VerificationOutcome, VerifyError};
