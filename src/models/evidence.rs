use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::enums::{RiskLevel, TamperVerdict};

/// One extracted field and how sure the analyzer was about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub confidence: f32,
}

/// Structured fields lifted from a certificate. A key is present only
/// when the analyzer detected it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<FieldValue>,
}

impl OcrFields {
    pub fn name(&self) -> Option<&str> {
        value_of(&self.name)
    }

    pub fn institution(&self) -> Option<&str> {
        value_of(&self.institution)
    }

    pub fn program(&self) -> Option<&str> {
        value_of(&self.program)
    }

    pub fn date(&self) -> Option<&str> {
        value_of(&self.date)
    }

    pub fn reference_id(&self) -> Option<&str> {
        value_of(&self.reference_id)
    }

    pub fn is_empty(&self) -> bool {
        self.detected_count() == 0
    }

    pub fn detected_count(&self) -> usize {
        [
            &self.name,
            &self.institution,
            &self.program,
            &self.date,
            &self.reference_id,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }

    /// Four-digit year found in the date field, if any.
    pub fn issue_year(&self) -> Option<i32> {
        let date = self.date()?;
        static YEAR: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year pattern compiles"));
        YEAR.find(date).and_then(|m| m.as_str().parse().ok())
    }
}

fn value_of(field: &Option<FieldValue>) -> Option<&str> {
    field
        .as_ref()
        .map(|f| f.value.trim())
        .filter(|v| !v.is_empty())
}

/// Normalized output of the OCR analyzer. Produced once per Document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub fields: OcrFields,
    pub confidence: f32,
}

impl OcrResult {
    /// No text found. Absence of text is evidence, not failure.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            fields: OcrFields::default(),
            confidence: 0.0,
        }
    }
}

/// Reference to an image produced by the forensic analyzer
/// (noise map, highlighted-region overlay, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceImage {
    pub kind: String,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Normalized output of the tamper analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperAnalysis {
    pub verdict: TamperVerdict,
    pub score: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub evidence_images: Vec<EvidenceImage>,
}

impl TamperAnalysis {
    pub fn is_conclusive(&self) -> bool {
        self.verdict != TamperVerdict::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: &str) -> Option<FieldValue> {
        Some(FieldValue {
            value: value.into(),
            confidence: 0.9,
        })
    }

    #[test]
    fn blank_fields_read_as_absent() {
        let fields = OcrFields {
            name: field("   "),
            ..Default::default()
        };
        assert_eq!(fields.name(), None);
    }

    #[test]
    fn detected_count_counts_present_keys() {
        let fields = OcrFields {
            name: field("Rahul Verma"),
            program: field("B.Tech"),
            ..Default::default()
        };
        assert_eq!(fields.detected_count(), 2);
        assert!(!fields.is_empty());
        assert!(OcrFields::default().is_empty());
    }

    #[test]
    fn issue_year_comes_from_date_field() {
        let fields = OcrFields {
            date: field("Awarded on 14 June 2021"),
            ..Default::default()
        };
        assert_eq!(fields.issue_year(), Some(2021));

        let undated = OcrFields {
            date: field("June"),
            ..Default::default()
        };
        assert_eq!(undated.issue_year(), None);
    }

    #[test]
    fn empty_ocr_result_has_zero_confidence() {
        let empty = OcrResult::empty();
        assert_eq!(empty.confidence, 0.0);
        assert!(empty.fields.is_empty());
    }
}
