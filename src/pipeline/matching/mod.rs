//! Record matching against the five authoritative collections.

pub mod matcher;
pub mod similarity;
pub mod store;

pub use matcher::{CandidateStream, CollectionFailure, RecordMatcher};
pub use store::{RecordSource, RecordStoreError, SqliteRecordStore};

use crate::models::MatchCandidate;

/// Why the matcher produced no candidates without looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSkip {
    /// OCR could not be consulted.
    OcrUnavailable,
    /// OCR answered but found no holder name.
    NoName,
    /// The lookup did not settle within its bound.
    TimedOut,
    /// The lookup task died before answering.
    Aborted,
}

/// What the matcher branch hands the aggregator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub best: Option<MatchCandidate>,
    pub failures: Vec<CollectionFailure>,
    pub skipped: Option<MatchSkip>,
}

impl MatchOutcome {
    pub fn skipped(reason: MatchSkip) -> Self {
        Self {
            best: None,
            failures: Vec::new(),
            skipped: Some(reason),
        }
    }

    /// Drain the best candidate from a stream and keep its failures.
    pub fn from_stream(mut stream: CandidateStream) -> Self {
        let best = stream.next();
        Self {
            best,
            failures: stream.failures().to_vec(),
            skipped: None,
        }
    }
}
