use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

const AUDIT_COLUMNS: &str = "id, fingerprint, filename, media_type, size_bytes, submitted_at,
     ocr_json, tamper_json, match_json, verdict_json, supersedes, created_at";

/// Insert one audit record. A second record for the same fingerprint (or
/// id) is rejected by its UNIQUE constraint and surfaces as
/// `ConstraintViolation`; other constraint failures stay `Sqlite`.
pub fn insert_audit_record(conn: &Connection, record: &AuditRecord) -> Result<(), DatabaseError> {
    let result = conn.execute(
        "INSERT INTO audit_records (id, fingerprint, filename, media_type, size_bytes, submitted_at,
         ocr_json, tamper_json, match_json, verdict_json, decision, supersedes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.id.to_string(),
            record.document.fingerprint,
            record.document.filename,
            record.document.media_type.as_str(),
            record.document.size_bytes as i64,
            format_timestamp(&record.document.submitted_at),
            record.ocr.as_ref().map(serde_json::to_string).transpose()?,
            record.tamper.as_ref().map(serde_json::to_string).transpose()?,
            record.best_match.as_ref().map(serde_json::to_string).transpose()?,
            serde_json::to_string(&record.verdict)?,
            record.verdict.decision.as_str(),
            record.supersedes.map(|id| id.to_string()),
            format_timestamp(&record.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            Err(DatabaseError::ConstraintViolation(
                msg.unwrap_or_else(|| "audit_records.fingerprint".into()),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_audit_record(conn: &Connection, id: &Uuid) -> Result<Option<AuditRecord>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {AUDIT_COLUMNS} FROM audit_records WHERE id = ?1"),
        &id.to_string(),
    )
}

pub fn get_audit_record_by_fingerprint(
    conn: &Connection,
    fingerprint: &str,
) -> Result<Option<AuditRecord>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {AUDIT_COLUMNS} FROM audit_records WHERE fingerprint = ?1"),
        fingerprint,
    )
}

/// Most recent first. Returns the requested slice and the filtered total.
pub fn list_audit_records(
    conn: &Connection,
    filter: &AuditFilter,
    page: PageRequest,
) -> Result<(Vec<AuditRecord>, u64), DatabaseError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(decision) = filter.decision {
        clauses.push("decision = ?");
        values.push(Box::new(decision.as_str()));
    }
    if let Some(since) = filter.since {
        clauses.push("created_at >= ?");
        values.push(Box::new(format_timestamp(&since)));
    }
    if let Some(until) = filter.until {
        clauses.push("created_at < ?");
        values.push(Box::new(format_timestamp(&until)));
    }
    if let Some(fragment) = filter.filename_contains.as_deref().filter(|f| !f.is_empty()) {
        clauses.push("instr(lower(filename), ?) > 0");
        values.push(Box::new(fragment.to_lowercase()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM audit_records {where_sql}"),
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_records {where_sql}
         ORDER BY created_at DESC, rowid DESC LIMIT {} OFFSET {}",
        page.per_page,
        page.offset()
    ))?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        read_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(audit_record_from_row(row?)?);
    }
    Ok((records, total.max(0) as u64))
}

struct AuditRow {
    id: String,
    fingerprint: String,
    filename: String,
    media_type: String,
    size_bytes: i64,
    submitted_at: String,
    ocr_json: Option<String>,
    tamper_json: Option<String>,
    match_json: Option<String>,
    verdict_json: String,
    supersedes: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        filename: row.get(2)?,
        media_type: row.get(3)?,
        size_bytes: row.get(4)?,
        submitted_at: row.get(5)?,
        ocr_json: row.get(6)?,
        tamper_json: row.get(7)?,
        match_json: row.get(8)?,
        verdict_json: row.get(9)?,
        supersedes: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn query_one(conn: &Connection, sql: &str, key: &str) -> Result<Option<AuditRecord>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    match stmt.query_row(params![key], read_row) {
        Ok(row) => Ok(Some(audit_record_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn audit_record_from_row(row: AuditRow) -> Result<AuditRecord, DatabaseError> {
    Ok(AuditRecord {
        id: parse_uuid(&row.id)?,
        document: DocumentMetadata {
            fingerprint: row.fingerprint,
            filename: row.filename,
            media_type: MediaType::parse(&row.media_type),
            size_bytes: row.size_bytes.max(0) as u64,
            submitted_at: parse_timestamp("submitted_at", &row.submitted_at)?,
        },
        ocr: row.ocr_json.as_deref().map(serde_json::from_str).transpose()?,
        tamper: row.tamper_json.as_deref().map(serde_json::from_str).transpose()?,
        best_match: row.match_json.as_deref().map(serde_json::from_str).transpose()?,
        verdict: serde_json::from_str(&row.verdict_json)?,
        supersedes: row.supersedes.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_timestamp("created_at", &row.created_at)?,
    })
}

fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::from_str(raw).map_err(|_| DatabaseError::InvalidEnum {
        field: "uuid".into(),
        value: raw.into(),
    })
}

/// Fixed-width UTC so lexical order equals chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidTimestamp {
            column,
            value: raw.into(),
        })
}
