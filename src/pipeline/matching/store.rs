use thiserror::Error;

use crate::db::{find_records_by_name_tokens, DatabaseError, SharedConnection};
use crate::models::{AuthoritativeRecord, RecordKind};

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("Record store query failed: {0}")]
    Database(#[from] DatabaseError),
}

/// Read-only access to the authoritative record collections.
///
/// `scan` returns every record of `kind` whose holder name shares at least
/// one case-folded token with `name_tokens`; the matcher scores them
/// afterwards.
/// Implementations are blocking.
pub trait RecordSource: Send + Sync {
    fn scan(
        &self,
        kind: RecordKind,
        name_tokens: &[String],
    ) -> Result<Vec<AuthoritativeRecord>, RecordStoreError>;
}

/// Record collections stored in the application database.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    conn: SharedConnection,
}

impl SqliteRecordStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl RecordSource for SqliteRecordStore {
    fn scan(
        &self,
        kind: RecordKind,
        name_tokens: &[String],
    ) -> Result<Vec<AuthoritativeRecord>, RecordStoreError> {
        Ok(self
            .conn
            .with(|c| find_records_by_name_tokens(c, kind, name_tokens))?)
    }
}
