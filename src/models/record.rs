use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::RecordKind;

/// A ground-truth record owned by an issuing institution. All five
/// collections share this shape; `kind` says which one it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoritativeRecord {
    #[serde(default)]
    pub id: i64,
    pub kind: RecordKind,
    pub holder_name: String,
    pub institution: String,
    pub program: String,
    /// Roll numbers, registration numbers, grades: whatever the issuer keeps.
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub issue_year: Option<i32>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// A record the matcher kept, with its weighted accuracy in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record: AuthoritativeRecord,
    pub accuracy: u8,
    pub name_score: f64,
    pub institution_score: f64,
    pub program_score: f64,
}
