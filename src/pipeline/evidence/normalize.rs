//! Analyzer response normalization.
//!
//! Analyzer payloads are loosely shaped: field keys vary between
//! deployments (`studentName`, `Institution/Company`, `refid`, ...), values
//! arrive as bare strings or `{value, confidence}` objects, and the tamper
//! service may nest its findings under `ela`. Everything here is pure so it
//! can be tested without a server.

use serde_json::{Map, Value};

use crate::models::{
    EvidenceImage, FieldValue, OcrFields, OcrResult, RiskLevel, TamperAnalysis, TamperVerdict,
};

/// Score above which a tampered document is HIGH risk.
pub const HIGH_RISK_SCORE: f64 = 25.0;
/// Score above which a tampered document is MEDIUM risk.
pub const MEDIUM_RISK_SCORE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSlot {
    Name,
    Institution,
    Program,
    Date,
    ReferenceId,
}

/// Map an analyzer field key onto a canonical slot. Keys are compared
/// lowercase with punctuation removed, so `Institution/Company` and
/// `institution_company` are the same key.
fn slot_for(key: &str) -> Option<FieldSlot> {
    let folded: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match folded.as_str() {
        "name" | "studentname" | "holdername" | "candidatename" | "fullname" => {
            Some(FieldSlot::Name)
        }
        "institution" | "institutionname" | "institute" | "institutioncompany" | "university"
        | "college" | "school" => Some(FieldSlot::Institution),
        "program" | "programme" | "course" | "degree" => Some(FieldSlot::Program),
        "date" | "year" | "issuedate" | "dateofissue" | "issueyear" => Some(FieldSlot::Date),
        "referenceid" | "refid" | "reference" | "rollnumber" | "registrationnumber"
        | "certificateid" => Some(FieldSlot::ReferenceId),
        _ => None,
    }
}

/// Normalize an OCR analyzer body. `Err` means the body is unusable as a
/// response (not an object, or an explicit failure); an object without
/// usable text or fields is an empty result, not an error.
pub fn normalize_ocr(body: &Value) -> Result<OcrResult, String> {
    let obj = body
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {}", kind_of(body)))?;
    reject_reported_failure(obj)?;

    let text = first_str(obj, &["text", "raw_text", "extracted_text"])
        .unwrap_or_default()
        .trim()
        .to_string();

    let raw_fields = ["fields", "extracted_fields"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_object));

    let mut parsed: Vec<(FieldSlot, String, Option<f32>)> = Vec::new();
    if let Some(raw_fields) = raw_fields {
        for (key, raw) in raw_fields {
            let Some(slot) = slot_for(key) else { continue };
            if parsed.iter().any(|(s, _, _)| *s == slot) {
                continue;
            }
            if let Some((value, confidence)) = field_value(raw) {
                if confidence == Some(0.0) {
                    continue;
                }
                parsed.push((slot, value, confidence));
            }
        }
    }

    if text.is_empty() && parsed.is_empty() {
        return Ok(OcrResult::empty());
    }

    let explicit = obj.get("confidence").and_then(as_unit_interval);
    let field_confidences: Vec<f32> = parsed.iter().filter_map(|(_, _, c)| *c).collect();
    let confidence = explicit
        .or_else(|| {
            (!field_confidences.is_empty())
                .then(|| field_confidences.iter().sum::<f32>() / field_confidences.len() as f32)
        })
        .unwrap_or_else(|| heuristic_confidence(&text));

    let mut fields = OcrFields::default();
    for (slot, value, field_confidence) in parsed {
        let field = Some(FieldValue {
            value,
            confidence: field_confidence.unwrap_or(confidence),
        });
        match slot {
            FieldSlot::Name => fields.name = field,
            FieldSlot::Institution => fields.institution = field,
            FieldSlot::Program => fields.program = field,
            FieldSlot::Date => fields.date = field,
            FieldSlot::ReferenceId => fields.reference_id = field,
        }
    }

    Ok(OcrResult {
        text,
        fields,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

/// A field is a bare string/number or `{value, confidence}`. Blank values
/// are treated as not detected.
fn field_value(raw: &Value) -> Option<(String, Option<f32>)> {
    let (value, confidence) = match raw {
        Value::String(s) => (s.clone(), None),
        Value::Number(n) => (n.to_string(), None),
        Value::Object(o) => {
            let value = match o.get("value")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            (value, o.get("confidence").and_then(as_unit_interval))
        }
        _ => return None,
    };
    let value = value.trim().to_string();
    (!value.is_empty()).then_some((value, confidence))
}

/// Normalize a tamper analyzer body. A missing or unrecognized verdict is
/// `UNKNOWN`; a missing risk level is derived from the score.
pub fn normalize_tamper(body: &Value) -> Result<TamperAnalysis, String> {
    let outer = body
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {}", kind_of(body)))?;
    reject_reported_failure(outer)?;

    let core = outer.get("ela").and_then(Value::as_object).unwrap_or(outer);

    let verdict = match first_str(core, &["verdict", "result"])
        .map(|v| v.trim().to_ascii_uppercase())
        .as_deref()
    {
        Some("GENUINE") => TamperVerdict::Genuine,
        Some("TAMPERED") => TamperVerdict::Tampered,
        _ => TamperVerdict::Unknown,
    };

    let score = core
        .get("score")
        .and_then(as_f64)
        .filter(|s| s.is_finite())
        .unwrap_or(0.0);

    let risk_level = match first_str(core, &["riskLevel", "risk_level", "risk"])
        .map(|r| r.trim().to_ascii_uppercase())
        .as_deref()
    {
        Some("HIGH") => RiskLevel::High,
        Some("MEDIUM") => RiskLevel::Medium,
        Some("LOW") | Some("NOT TAMPERED") => RiskLevel::Low,
        _ => risk_from_score(verdict, score),
    };

    let mut evidence_images = collect_images(core);
    if !std::ptr::eq(core, outer) {
        evidence_images.extend(collect_images(outer));
    }

    Ok(TamperAnalysis {
        verdict,
        score,
        risk_level,
        evidence_images,
    })
}

/// Risk when the analyzer gives none: only tampered findings carry risk.
pub fn risk_from_score(verdict: TamperVerdict, score: f64) -> RiskLevel {
    if verdict != TamperVerdict::Tampered {
        return RiskLevel::Low;
    }
    if score > HIGH_RISK_SCORE {
        RiskLevel::High
    } else if score > MEDIUM_RISK_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn collect_images(obj: &Map<String, Value>) -> Vec<EvidenceImage> {
    ["evidenceImages", "evidence_images", "generated_images"]
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_array))
        .flatten()
        .filter_map(image_from)
        .collect()
}

fn image_from(raw: &Value) -> Option<EvidenceImage> {
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(EvidenceImage {
            kind: "evidence".into(),
            reference: s.trim().to_string(),
            description: None,
        }),
        Value::Object(o) => {
            let reference = first_str(o, &["url", "reference", "path", "filename"])?
                .trim()
                .to_string();
            if reference.is_empty() {
                return None;
            }
            Some(EvidenceImage {
                kind: first_str(o, &["type", "kind"]).unwrap_or("evidence").to_string(),
                reference,
                description: first_str(o, &["description"]).map(str::to_string),
            })
        }
        _ => None,
    }
}

/// Heuristic confidence when the analyzer reports none, from text volume.
///
/// - 0 chars → 0.0
/// - 1-49 chars → 0.2
/// - 50-199 chars → 0.4
/// - 200-499 chars → 0.6
/// - 500+ chars → 0.8
///
/// Capped at 0.8: never claim certainty for heuristic scoring.
pub fn heuristic_confidence(text: &str) -> f32 {
    match text.trim().len() {
        0 => 0.0,
        1..=49 => 0.2,
        50..=199 => 0.4,
        200..=499 => 0.6,
        _ => 0.8,
    }
}

fn reject_reported_failure(obj: &Map<String, Value>) -> Result<(), String> {
    if obj.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = first_str(obj, &["error", "message", "detail"]).unwrap_or("no reason given");
        return Err(format!("analyzer reported failure: {reason}"));
    }
    Ok(())
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Confidence in [0, 1]; percentages (> 1) are scaled down.
fn as_unit_interval(v: &Value) -> Option<f32> {
    let raw = as_f64(v).filter(|c| c.is_finite() && *c >= 0.0)?;
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(scaled.min(1.0) as f32)
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ocr_aliases_map_to_canonical_fields() {
        let body = json!({
            "text": "This is to certify that Rahul Verma ...",
            "fields": {
                "studentName": "Rahul Verma",
                "Institution/Company": "Delhi University",
                "course": "B.Sc Physics",
                "Year": 2022,
                "refid": "REF-9917"
            }
        });
        let ocr = normalize_ocr(&body).unwrap();
        assert_eq!(ocr.fields.name(), Some("Rahul Verma"));
        assert_eq!(ocr.fields.institution(), Some("Delhi University"));
        assert_eq!(ocr.fields.program(), Some("B.Sc Physics"));
        assert_eq!(ocr.fields.date(), Some("2022"));
        assert_eq!(ocr.fields.reference_id(), Some("REF-9917"));
        assert_eq!(ocr.fields.issue_year(), Some(2022));
    }

    #[test]
    fn ocr_field_objects_carry_confidence() {
        let body = json!({
            "text": "certificate",
            "fields": {
                "name": {"value": "Anita Rao", "confidence": 0.9},
                "institution": {"value": "IIT Bombay", "confidence": 70}
            }
        });
        let ocr = normalize_ocr(&body).unwrap();
        let name = ocr.fields.name.as_ref().unwrap();
        assert!((name.confidence - 0.9).abs() < 1e-6);
        let inst = ocr.fields.institution.as_ref().unwrap();
        assert!((inst.confidence - 0.7).abs() < 1e-6);
        assert!((ocr.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn ocr_explicit_percentage_confidence_is_scaled() {
        let body = json!({"text": "x", "fields": {"name": "A B"}, "confidence": 92});
        let ocr = normalize_ocr(&body).unwrap();
        assert!((ocr.confidence - 0.92).abs() < 1e-6);
        assert!((ocr.fields.name.unwrap().confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn ocr_blank_and_zero_confidence_fields_are_dropped() {
        let body = json!({
            "text": "some text",
            "fields": {
                "name": "   ",
                "course": {"value": "MBA", "confidence": 0.0},
                "unrelated": "ignored"
            }
        });
        let ocr = normalize_ocr(&body).unwrap();
        assert!(ocr.fields.is_empty());
        assert_eq!(ocr.text, "some text");
        assert!((ocr.confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn ocr_empty_extraction_is_empty_result() {
        let ocr = normalize_ocr(&json!({"text": "", "fields": {}})).unwrap();
        assert_eq!(ocr, OcrResult::empty());

        let ocr = normalize_ocr(&json!({"fields": "garbled"})).unwrap();
        assert_eq!(ocr, OcrResult::empty());
    }

    #[test]
    fn ocr_accepts_extracted_fields_key() {
        let body = json!({"success": true, "extracted_fields": {"studentName": "Rahul Verma"}});
        let ocr = normalize_ocr(&body).unwrap();
        assert_eq!(ocr.fields.name(), Some("Rahul Verma"));
        assert!(ocr.text.is_empty());
        assert_eq!(ocr.confidence, 0.0);
    }

    #[test]
    fn ocr_non_object_or_failure_is_error() {
        assert!(normalize_ocr(&json!(["text"])).is_err());
        assert!(normalize_ocr(&json!("text")).is_err());
        let err = normalize_ocr(&json!({"success": false, "error": "model crashed"})).unwrap_err();
        assert!(err.contains("model crashed"));
    }

    #[test]
    fn tamper_flat_body() {
        let body = json!({
            "verdict": "TAMPERED",
            "score": 78,
            "riskLevel": "HIGH",
            "evidenceImages": ["/images/c_noise.jpg"]
        });
        let t = normalize_tamper(&body).unwrap();
        assert_eq!(t.verdict, TamperVerdict::Tampered);
        assert_eq!(t.score, 78.0);
        assert_eq!(t.risk_level, RiskLevel::High);
        assert_eq!(t.evidence_images.len(), 1);
        assert_eq!(t.evidence_images[0].reference, "/images/c_noise.jpg");
    }

    #[test]
    fn tamper_nested_ela_with_generated_images() {
        let body = json!({
            "success": true,
            "ela": {"verdict": "GENUINE", "score": 4.2, "risk_level": "NOT TAMPERED"},
            "generated_images": [
                {"type": "noise", "filename": "c_noise.jpg", "url": "/images/c_noise.jpg",
                 "description": "ELA analysis visualization"},
                {"type": "tampered", "filename": "c_tampered.jpg", "url": "/images/c_tampered.jpg"}
            ]
        });
        let t = normalize_tamper(&body).unwrap();
        assert_eq!(t.verdict, TamperVerdict::Genuine);
        assert_eq!(t.risk_level, RiskLevel::Low);
        assert_eq!(t.evidence_images.len(), 2);
        assert_eq!(t.evidence_images[0].kind, "noise");
        assert_eq!(
            t.evidence_images[0].description.as_deref(),
            Some("ELA analysis visualization")
        );
    }

    #[test]
    fn tamper_missing_verdict_is_unknown() {
        let t = normalize_tamper(&json!({"score": 12.0})).unwrap();
        assert_eq!(t.verdict, TamperVerdict::Unknown);
        assert!(!t.is_conclusive());

        let t = normalize_tamper(&json!({"verdict": "ERROR"})).unwrap();
        assert_eq!(t.verdict, TamperVerdict::Unknown);
    }

    #[test]
    fn tamper_risk_derived_from_score() {
        assert_eq!(risk_from_score(TamperVerdict::Tampered, 30.0), RiskLevel::High);
        assert_eq!(risk_from_score(TamperVerdict::Tampered, 20.0), RiskLevel::Medium);
        assert_eq!(risk_from_score(TamperVerdict::Tampered, 15.0), RiskLevel::Low);
        assert_eq!(risk_from_score(TamperVerdict::Genuine, 90.0), RiskLevel::Low);

        let t = normalize_tamper(&json!({"verdict": "tampered", "score": "26.5"})).unwrap();
        assert_eq!(t.risk_level, RiskLevel::High);
    }

    #[test]
    fn tamper_non_object_is_error() {
        assert!(normalize_tamper(&json!(null)).is_err());
        assert!(normalize_tamper(&json!({"success": false})).is_err());
    }

    #[test]
    fn heuristic_confidence_tracks_text_volume() {
        assert_eq!(heuristic_confidence(""), 0.0);
        assert_eq!(heuristic_confidence("short"), 0.2);
        assert_eq!(heuristic_confidence(&"x".repeat(120)), 0.4);
        assert_eq!(heuristic_confidence(&"x".repeat(300)), 0.6);
        assert_eq!(heuristic_confidence(&"x".repeat(900)), 0.8);
    }
}
