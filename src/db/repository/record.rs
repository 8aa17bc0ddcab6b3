use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Connection};

use crate::db::DatabaseError;
use crate::models::{AuthoritativeRecord, RecordKind};
use crate::pipeline::matching::similarity;

/// Insert a record into its kind's collection. Used by seeding and tests;
/// the verification core only reads these tables.
pub fn insert_record(conn: &Connection, record: &AuthoritativeRecord) -> Result<i64, DatabaseError> {
    let sql = format!(
        "INSERT INTO {} (holder_name, institution, program, identifiers, issue_year, reference_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        record.kind.collection()
    );
    conn.execute(
        &sql,
        params![
            record.holder_name,
            record.institution,
            record.program,
            serde_json::to_string(&record.identifiers)?,
            record.issue_year,
            record.reference_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert many records in one transaction. Either all land or none do.
pub fn insert_records(conn: &Connection, records: &[AuthoritativeRecord]) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for record in records {
        insert_record(&tx, record)?;
    }
    tx.commit()?;
    Ok(records.len())
}

/// Records in `kind` whose holder name shares at least one token with
/// `name_tokens`. Both sides are folded by `name_key`, so case and
/// punctuation never decide membership. Tokens with no letters or digits
/// match nothing.
pub fn find_records_by_name_tokens(
    conn: &Connection,
    kind: RecordKind,
    name_tokens: &[String],
) -> Result<Vec<AuthoritativeRecord>, DatabaseError> {
    let mut keys: Vec<String> = Vec::new();
    for token in name_tokens {
        for folded in similarity::name_tokens(token) {
            let bracketed = format!(" {folded} ");
            if !keys.contains(&bracketed) {
                keys.push(bracketed);
            }
        }
    }
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let clauses: Vec<String> = (1..=keys.len())
        .map(|i| format!("instr(name_key(holder_name), ?{i}) > 0"))
        .collect();
    let sql = format!(
        "SELECT id, holder_name, institution, program, identifiers, issue_year, reference_id
         FROM {} WHERE {} ORDER BY id",
        kind.collection(),
        clauses.join(" OR ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
        Ok(RecordRow {
            id: row.get(0)?,
            holder_name: row.get(1)?,
            institution: row.get(2)?,
            program: row.get(3)?,
            identifiers: row.get(4)?,
            issue_year: row.get(5)?,
            reference_id: row.get(6)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(kind, row?)?);
    }
    Ok(records)
}

pub fn count_records(conn: &Connection, kind: RecordKind) -> Result<i64, DatabaseError> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.collection());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

struct RecordRow {
    id: i64,
    holder_name: String,
    institution: String,
    program: String,
    identifiers: String,
    issue_year: Option<i32>,
    reference_id: Option<String>,
}

fn record_from_row(kind: RecordKind, row: RecordRow) -> Result<AuthoritativeRecord, DatabaseError> {
    let identifiers: BTreeMap<String, String> = serde_json::from_str(&row.identifiers)?;
    Ok(AuthoritativeRecord {
        id: row.id,
        kind,
        holder_name: row.holder_name,
        institution: row.institution,
        program: row.program,
        identifiers,
        issue_year: row.issue_year,
        reference_id: row.reference_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn record(kind: RecordKind, name: &str) -> AuthoritativeRecord {
        AuthoritativeRecord {
            id: 0,
            kind,
            holder_name: name.into(),
            institution: "Delhi University".into(),
            program: "B.Sc Physics".into(),
            identifiers: BTreeMap::from([("rollNumber".to_string(), "DU2019PH042".to_string())]),
            issue_year: Some(2022),
            reference_id: Some("REF-9917".into()),
        }
    }

    #[test]
    fn insert_and_find_by_token() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "Rahul Verma")).unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "Anita Rao")).unwrap();

        let found =
            find_records_by_name_tokens(&conn, RecordKind::Graduation, &["verma".into()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].holder_name, "Rahul Verma");
        assert_eq!(found[0].kind, RecordKind::Graduation);
        assert_eq!(found[0].identifiers["rollNumber"], "DU2019PH042");
        assert_eq!(found[0].reference_id.as_deref(), Some("REF-9917"));
    }

    #[test]
    fn lookup_is_case_insensitive_and_any_token() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Identity, "RAHUL KUMAR")).unwrap();
        insert_record(&conn, &record(RecordKind::Identity, "Priya Verma")).unwrap();

        let found = find_records_by_name_tokens(
            &conn,
            RecordKind::Identity,
            &["Rahul".into(), "Verma".into()],
        )
        .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn collections_are_isolated_by_kind() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Internship, "Rahul Verma")).unwrap();

        let graduation =
            find_records_by_name_tokens(&conn, RecordKind::Graduation, &["rahul".into()]).unwrap();
        assert!(graduation.is_empty());
        assert_eq!(count_records(&conn, RecordKind::Internship).unwrap(), 1);
    }

    #[test]
    fn bulk_insert_is_all_or_nothing() {
        let conn = open_memory_database().unwrap();
        let good = vec![
            record(RecordKind::Graduation, "Rahul Verma"),
            record(RecordKind::Identity, "Anita Rao"),
        ];
        assert_eq!(insert_records(&conn, &good).unwrap(), 2);
        assert_eq!(count_records(&conn, RecordKind::Identity).unwrap(), 1);

        conn.execute_batch(
            "CREATE TRIGGER reject_placeholder BEFORE INSERT ON graduation_records
             WHEN NEW.holder_name = 'Placeholder'
             BEGIN SELECT RAISE(ABORT, 'placeholder holder'); END;",
        )
        .unwrap();
        let batch = vec![
            record(RecordKind::Graduation, "Kiran Das"),
            record(RecordKind::Graduation, "Placeholder"),
        ];
        assert!(insert_records(&conn, &batch).is_err());
        assert_eq!(count_records(&conn, RecordKind::Graduation).unwrap(), 1);
    }

    #[test]
    fn empty_tokens_return_nothing() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "Rahul Verma")).unwrap();
        let found = find_records_by_name_tokens(&conn, RecordKind::Graduation, &[]).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn punctuation_only_tokens_match_nothing() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "Rahul Verma")).unwrap();
        let found =
            find_records_by_name_tokens(&conn, RecordKind::Graduation, &["%".into(), "_".into()])
                .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn tokens_match_whole_words_only() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "Rahul Verma")).unwrap();
        let found =
            find_records_by_name_tokens(&conn, RecordKind::Graduation, &["verm".into()]).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn non_ascii_capitals_still_find_the_record() {
        let conn = open_memory_database().unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "Élise Öberg")).unwrap();
        insert_record(&conn, &record(RecordKind::Graduation, "ÅSA LINDSTRÖM")).unwrap();

        let found = find_records_by_name_tokens(
            &conn,
            RecordKind::Graduation,
            &["ÉLISE".into(), "ÖBERG".into()],
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].holder_name, "Élise Öberg");

        let found =
            find_records_by_name_tokens(&conn, RecordKind::Graduation, &["åsa".into()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].holder_name, "ÅSA LINDSTRÖM");
    }
}
