use std::cmp::Ordering;
use std::sync::Arc;

use super::similarity::{field_equality, name_similarity, name_tokens};
use super::store::RecordSource;
use crate::config::MatchWeights;
use crate::models::{AuthoritativeRecord, MatchCandidate, OcrFields, RecordKind};

/// A collection that could not be read during a match pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFailure {
    pub kind: RecordKind,
    pub message: String,
}

/// Scores OCR identity fields against every authoritative collection.
#[derive(Clone)]
pub struct RecordMatcher {
    source: Arc<dyn RecordSource>,
    weights: MatchWeights,
    name_floor: f64,
}

impl RecordMatcher {
    pub fn new(source: Arc<dyn RecordSource>, weights: MatchWeights, name_floor: f64) -> Self {
        Self {
            source,
            weights,
            name_floor,
        }
    }

    /// Candidates for `fields`, best first. Nothing is queried until the
    /// stream is first polled, and nothing at all when OCR found no name.
    pub fn match_fields(&self, fields: &OcrFields) -> CandidateStream {
        let state = match fields.name() {
            Some(name) if !name_tokens(name).is_empty() => StreamState::Pending(PendingScan {
                source: Arc::clone(&self.source),
                weights: self.weights,
                name_floor: self.name_floor,
                name: name.to_string(),
                institution: fields.institution().map(str::to_string),
                program: fields.program().map(str::to_string),
            }),
            _ => StreamState::Ready(Vec::new().into_iter()),
        };
        CandidateStream {
            state,
            failures: Vec::new(),
        }
    }

    /// Score one record. `None` when the name falls below the floor.
    pub fn score(&self, fields: &OcrFields, record: &AuthoritativeRecord) -> Option<MatchCandidate> {
        score_record(
            &self.weights,
            self.name_floor,
            fields.name()?,
            fields.institution(),
            fields.program(),
            record,
        )
    }
}

impl std::fmt::Debug for RecordMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordMatcher")
            .field("weights", &self.weights)
            .field("name_floor", &self.name_floor)
            .finish_non_exhaustive()
    }
}

struct PendingScan {
    source: Arc<dyn RecordSource>,
    weights: MatchWeights,
    name_floor: f64,
    name: String,
    institution: Option<String>,
    program: Option<String>,
}

enum StreamState {
    Pending(PendingScan),
    Ready(std::vec::IntoIter<MatchCandidate>),
}

/// Finite, single-use sequence of candidates in descending accuracy,
/// ties broken by most recent issue year. The first `next` performs one
/// pass over each collection (blocking); later calls only drain.
pub struct CandidateStream {
    state: StreamState,
    failures: Vec<CollectionFailure>,
}

impl CandidateStream {
    /// Collections that failed during the pass. Empty until evaluated.
    pub fn failures(&self) -> &[CollectionFailure] {
        &self.failures
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self.state, StreamState::Ready(_))
    }

    fn evaluate(&mut self) {
        let StreamState::Pending(scan) = &self.state else {
            return;
        };

        let tokens = name_tokens(&scan.name);
        let mut candidates = Vec::new();
        for kind in RecordKind::ALL {
            match scan.source.scan(kind, &tokens) {
                Ok(records) => candidates.extend(records.iter().filter_map(|r| {
                    score_record(
                        &scan.weights,
                        scan.name_floor,
                        &scan.name,
                        scan.institution.as_deref(),
                        scan.program.as_deref(),
                        r,
                    )
                })),
                Err(e) => {
                    tracing::warn!(collection = kind.as_str(), error = %e, "Record collection unavailable");
                    self.failures.push(CollectionFailure {
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        candidates.sort_by(rank);
        tracing::debug!(
            candidates = candidates.len(),
            failed_collections = self.failures.len(),
            "Record match pass complete"
        );
        self.state = StreamState::Ready(candidates.into_iter());
    }
}

impl Iterator for CandidateStream {
    type Item = MatchCandidate;

    fn next(&mut self) -> Option<MatchCandidate> {
        self.evaluate();
        match &mut self.state {
            StreamState::Ready(iter) => iter.next(),
            StreamState::Pending(_) => None,
        }
    }
}

fn score_record(
    weights: &MatchWeights,
    name_floor: f64,
    name: &str,
    institution: Option<&str>,
    program: Option<&str>,
    record: &AuthoritativeRecord,
) -> Option<MatchCandidate> {
    let name_score = name_similarity(name, &record.holder_name);
    if name_score < name_floor || name_score == 0.0 {
        return None;
    }
    let institution_score = field_equality(institution, &record.institution);
    let program_score = field_equality(program, &record.program);

    let weighted = weights.name * name_score
        + weights.institution * institution_score
        + weights.program * program_score;
    let accuracy = (100.0 * weighted).round().clamp(0.0, 100.0) as u8;

    Some(MatchCandidate {
        record: record.clone(),
        accuracy,
        name_score,
        institution_score,
        program_score,
    })
}

/// Accuracy descending, then issue year descending (unknown last).
fn rank(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.accuracy
        .cmp(&a.accuracy)
        .then_with(|| match (a.record.issue_year, b.record.issue_year) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use crate::pipeline::matching::store::RecordStoreError;
    use crate::db::DatabaseError;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct FixedSource {
        records: Vec<AuthoritativeRecord>,
        failing: Option<RecordKind>,
        scans: AtomicUsize,
    }

    impl FixedSource {
        fn new(records: Vec<AuthoritativeRecord>) -> Self {
            Self {
                records,
                failing: None,
                scans: AtomicUsize::new(0),
            }
        }
    }

    impl RecordSource for FixedSource {
        fn scan(
            &self,
            kind: RecordKind,
            _name_tokens: &[String],
        ) -> Result<Vec<AuthoritativeRecord>, RecordStoreError> {
            self.scans.fetch_add(1, AtomicOrdering::SeqCst);
            if self.failing == Some(kind) {
                return Err(DatabaseError::LockPoisoned.into());
            }
            Ok(self.records.iter().filter(|r| r.kind == kind).cloned().collect())
        }
    }

    fn record(kind: RecordKind, name: &str, institution: &str, program: &str, year: Option<i32>) -> AuthoritativeRecord {
        AuthoritativeRecord {
            id: 0,
            kind,
            holder_name: name.into(),
            institution: institution.into(),
            program: program.into(),
            identifiers: Default::default(),
            issue_year: year,
            reference_id: None,
        }
    }

    fn fields(name: &str, institution: &str, program: &str) -> OcrFields {
        let f = |v: &str| {
            (!v.is_empty()).then(|| FieldValue {
                value: v.into(),
                confidence: 0.9,
            })
        };
        OcrFields {
            name: f(name),
            institution: f(institution),
            program: f(program),
            ..Default::default()
        }
    }

    fn matcher(source: Arc<dyn RecordSource>) -> RecordMatcher {
        RecordMatcher::new(source, MatchWeights::default(), 0.5)
    }

    #[test]
    fn exact_match_scores_hundred() {
        let source = Arc::new(FixedSource::new(vec![record(
            RecordKind::Graduation,
            "Rahul Verma",
            "Delhi University",
            "B.Sc Physics",
            Some(2022),
        )]));
        let best = matcher(source)
            .match_fields(&fields("Rahul Verma", "Delhi University", "B.Sc Physics"))
            .next()
            .unwrap();
        assert_eq!(best.accuracy, 100);
        assert_eq!(best.record.kind, RecordKind::Graduation);
    }

    #[test]
    fn weights_combine_field_scores() {
        let source = Arc::new(FixedSource::new(vec![record(
            RecordKind::Graduation,
            "Rahul Verma",
            "Delhi University",
            "M.Sc",
            None,
        )]));
        let best = matcher(source)
            .match_fields(&fields("Rahul Verma", "Delhi University", "B.Sc"))
            .next()
            .unwrap();
        // 0.6 * 1.0 + 0.25 * 1.0 + 0.15 * 0.0
        assert_eq!(best.accuracy, 85);
    }

    #[test]
    fn names_below_floor_are_discarded() {
        let source = Arc::new(FixedSource::new(vec![record(
            RecordKind::Identity,
            "Rahul Kumar Singh Verma",
            "Delhi University",
            "B.Sc",
            None,
        )]));
        let mut stream = matcher(source).match_fields(&fields("Rahul", "Delhi University", "B.Sc"));
        assert!(stream.next().is_none());
    }

    #[test]
    fn missing_name_queries_nothing() {
        let source = Arc::new(FixedSource::new(vec![record(
            RecordKind::Graduation,
            "Rahul Verma",
            "Delhi University",
            "B.Sc",
            None,
        )]));
        let mut stream = matcher(source.clone()).match_fields(&fields("", "Delhi University", "B.Sc"));
        assert!(stream.next().is_none());
        assert_eq!(source.scans.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn stream_is_lazy_and_scans_each_collection_once() {
        let source = Arc::new(FixedSource::new(vec![
            record(RecordKind::Graduation, "Rahul Verma", "DU", "B.Sc", Some(2020)),
            record(RecordKind::Internship, "Rahul Verma", "Acme", "Intern", Some(2021)),
        ]));
        let mut stream = matcher(source.clone()).match_fields(&fields("Rahul Verma", "", ""));
        assert_eq!(source.scans.load(AtomicOrdering::SeqCst), 0);
        assert!(!stream.is_evaluated());

        assert!(stream.next().is_some());
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
        assert_eq!(source.scans.load(AtomicOrdering::SeqCst), RecordKind::ALL.len());
    }

    #[test]
    fn ties_prefer_most_recent_issue_year() {
        let source = Arc::new(FixedSource::new(vec![
            record(RecordKind::JrSecondary, "Rahul Verma", "X", "Y", Some(2015)),
            record(RecordKind::SrSecondary, "Rahul Verma", "X", "Y", Some(2017)),
            record(RecordKind::Graduation, "Rahul Verma", "X", "Y", None),
        ]));
        let years: Vec<_> = matcher(source)
            .match_fields(&fields("Rahul Verma", "X", "Y"))
            .map(|c| c.record.issue_year)
            .collect();
        assert_eq!(years, vec![Some(2017), Some(2015), None]);
    }

    #[test]
    fn candidates_ordered_by_accuracy() {
        let source = Arc::new(FixedSource::new(vec![
            record(RecordKind::Graduation, "Rahul Verma", "Other", "Other", Some(2023)),
            record(RecordKind::Graduation, "Rahul Verma", "DU", "B.Sc", Some(2010)),
        ]));
        let accuracies: Vec<u8> = matcher(source)
            .match_fields(&fields("Rahul Verma", "DU", "B.Sc"))
            .map(|c| c.accuracy)
            .collect();
        assert_eq!(accuracies, vec![100, 60]);
    }

    #[test]
    fn failing_collection_is_reported_and_others_still_match() {
        let mut source = FixedSource::new(vec![record(
            RecordKind::Identity,
            "Rahul Verma",
            "DU",
            "B.Sc",
            None,
        )]);
        source.failing = Some(RecordKind::Graduation);
        let mut stream = matcher(Arc::new(source)).match_fields(&fields("Rahul Verma", "DU", "B.Sc"));
        assert_eq!(stream.next().unwrap().record.kind, RecordKind::Identity);
        assert_eq!(stream.failures().len(), 1);
        assert_eq!(stream.failures()[0].kind, RecordKind::Graduation);
    }

    #[test]
    fn institution_match_never_lowers_accuracy() {
        let m = matcher(Arc::new(FixedSource::new(Vec::new())));
        let rec = record(RecordKind::Graduation, "Rahul Verma", "Delhi University", "B.Sc", None);
        let mut last = 0u8;
        for institution in ["", "Mumbai University", "Delhi Univ", "delhi university", "Delhi University"] {
            let c = m
                .score(&fields("Rahul Verma", institution, "B.Sc"), &rec)
                .unwrap();
            assert!(c.accuracy >= last, "{institution}: {} < {last}", c.accuracy);
            last = c.accuracy;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn uppercase_non_ascii_name_matches_stored_record() {
        use crate::db::{insert_record, SharedConnection};
        use crate::pipeline::matching::SqliteRecordStore;

        let conn = SharedConnection::open_in_memory().unwrap();
        let stored = record(
            RecordKind::Graduation,
            "Élise Öberg",
            "Université de Lyon",
            "Licence Physique",
            Some(2021),
        );
        conn.with(|c| insert_record(c, &stored)).unwrap();

        let m = matcher(Arc::new(SqliteRecordStore::new(conn)));
        let ocr = fields("ÉLISE ÖBERG", "Université de Lyon", "Licence Physique");
        assert_eq!(m.score(&ocr, &stored).unwrap().accuracy, 100);

        let candidates: Vec<_> = m.match_fields(&ocr).collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].accuracy, 100);
        assert_eq!(candidates[0].record.holder_name, "Élise Öberg");
    }
}
