//! Append-only audit persistence.

use async_trait::async_trait;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{
    get_audit_record, get_audit_record_by_fingerprint, insert_audit_record, list_audit_records,
    DatabaseError, SharedConnection,
};
use crate::models::{AuditFilter, AuditRecord, Page, PageRequest};

#[derive(Debug, Error)]
pub enum AuditError {
    /// Another verification already recorded this fingerprint.
    #[error("An audit record already exists for fingerprint {0}")]
    DuplicateFingerprint(String),

    #[error("Failed to write audit record: {0}")]
    Write(#[source] DatabaseError),

    #[error("Failed to read audit records: {0}")]
    Read(#[source] DatabaseError),

    /// The blocking database task panicked or was cancelled.
    #[error("Audit task did not complete: {0}")]
    Interrupted(String),
}

/// One immutable record per fingerprint. No update or delete exists;
/// corrections are new records with `supersedes` set.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<AuditRecord>, AuditError>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<AuditRecord>, AuditError>;

    /// Insert-if-absent on fingerprint.
    async fn create(&self, record: AuditRecord) -> Result<AuditRecord, AuditError>;

    /// Most recent first.
    async fn list(&self, filter: &AuditFilter, page: PageRequest) -> Result<Page<AuditRecord>, AuditError>;
}

/// Audit table in the application database. Every statement runs on the
/// blocking pool; the connection lock is never taken on an async worker.
#[derive(Debug, Clone)]
pub struct SqliteAuditStore {
    conn: SharedConnection,
    max_page_size: u32,
}

impl SqliteAuditStore {
    pub fn new(conn: SharedConnection, max_page_size: u32) -> Self {
        Self {
            conn,
            max_page_size,
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<Result<T, DatabaseError>, AuditError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || conn.with(f))
            .await
            .map_err(|e| AuditError::Interrupted(e.to_string()))
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<AuditRecord>, AuditError> {
        let fingerprint = fingerprint.to_string();
        self.blocking(move |c| get_audit_record_by_fingerprint(c, &fingerprint))
            .await?
            .map_err(AuditError::Read)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<AuditRecord>, AuditError> {
        let id = *id;
        self.blocking(move |c| get_audit_record(c, &id))
            .await?
            .map_err(AuditError::Read)
    }

    async fn create(&self, record: AuditRecord) -> Result<AuditRecord, AuditError> {
        let fingerprint = record.fingerprint().to_string();
        match self
            .blocking(move |c| insert_audit_record(c, &record).map(|()| record))
            .await?
        {
            Ok(record) => {
                tracing::debug!(id = %record.id, fingerprint = %fingerprint, "Audit record written");
                Ok(record)
            }
            Err(DatabaseError::ConstraintViolation(_)) => Err(AuditError::DuplicateFingerprint(fingerprint)),
            Err(e) => Err(AuditError::Write(e)),
        }
    }

    async fn list(&self, filter: &AuditFilter, page: PageRequest) -> Result<Page<AuditRecord>, AuditError> {
        let page = page.clamped(self.max_page_size);
        let filter = filter.clone();
        let (items, total) = self
            .blocking(move |c| list_audit_records(c, &filter, page))
            .await?
            .map_err(AuditError::Read)?;
        Ok(Page::new(items, total, page))
    }
}
