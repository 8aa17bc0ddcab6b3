//! Scoped access to the single SQLite connection shared by the record
//! store and the audit store.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so every caller goes
//! through `with`, which holds the lock only for the closure's duration.
//! The guard is released on every exit path, including early `?` returns
//! and unwinding.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::{open_database, open_memory_database, DatabaseError};

#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Connection>>,
}

impl SharedConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    pub fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let guard = self.inner.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }
}

impl std::fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection").finish_non_exhaustive()
    }
}
