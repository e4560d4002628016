//! Persisted collection of analysed reports.
//!
//! The whole collection lives under one key of the local store as a JSON
//! document. Every mutation is a read-modify-write of that document, so a
//! single statement replaces it atomically. Safe for one writer at a time; two
//! processes sharing the database file can still race.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repository::key_value::{delete_value, get_value, set_value};
use super::sqlite::{open_database, open_memory_database};
use super::StoreError;
use crate::models::{AnalysisResult, StoredReport};

pub const REPORTS_KEY: &str = "reports";

/// Schema version written with every collection.
pub const REPORTS_SCHEMA_VERSION: u32 = 1;

/// Append-only store of immutable report snapshots.
pub trait ReportStore {
    /// Persist a new snapshot under a freshly generated id.
    fn save(&self, result: &AnalysisResult) -> Result<String, StoreError>;

    /// All snapshots, in no particular order.
    fn get_all(&self) -> Result<Vec<StoredReport>, StoreError>;

    fn get_by_id(&self, id: &str) -> Result<Option<StoredReport>, StoreError>;

    /// Remove one snapshot. Absent ids are a no-op.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    fn clear_all(&self) -> Result<(), StoreError>;
}

#[derive(Serialize)]
struct ReportCollectionRef<'a> {
    version: u32,
    reports: &'a [StoredReport],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCollection {
    Versioned { version: u32, reports: Vec<StoredReport> },
    /// Bare array written before the collection carried a version.
    Legacy(Vec<StoredReport>),
}

/// `ReportStore` backed by the SQLite local store.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl SqliteReportStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run a closure against the underlying connection (preferences share it).
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.lock()?;
        f(&conn)
    }
}

fn load_collection(conn: &Connection) -> Result<Vec<StoredReport>, StoreError> {
    let Some(raw) = get_value(conn, REPORTS_KEY)? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<StoredCollection>(&raw)? {
        StoredCollection::Versioned { version, reports } => {
            if version > REPORTS_SCHEMA_VERSION {
                return Err(StoreError::UnsupportedVersion {
                    found: version,
                    supported: REPORTS_SCHEMA_VERSION,
                });
            }
            Ok(reports)
        }
        StoredCollection::Legacy(reports) => Ok(reports),
    }
}

fn write_collection(conn: &Connection, reports: &[StoredReport]) -> Result<(), StoreError> {
    let json = serde_json::to_string(&ReportCollectionRef {
        version: REPORTS_SCHEMA_VERSION,
        reports,
    })?;
    set_value(conn, REPORTS_KEY, &json)?;
    Ok(())
}

impl ReportStore for SqliteReportStore {
    fn save(&self, result: &AnalysisResult) -> Result<String, StoreError> {
        let conn = self.lock()?;
        let mut reports = load_collection(&conn)?;

        let mut id = Uuid::new_v4().to_string();
        while reports.iter().any(|r| r.id == id) {
            id = Uuid::new_v4().to_string();
        }

        reports.push(StoredReport {
            id: id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            result: result.clone(),
        });
        write_collection(&conn, &reports)?;

        tracing::info!(
            report_id = %id,
            metrics = result.metrics.len(),
            stored = reports.len(),
            "Report saved"
        );
        Ok(id)
    }

    fn get_all(&self) -> Result<Vec<StoredReport>, StoreError> {
        let conn = self.lock()?;
        load_collection(&conn)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<StoredReport>, StoreError> {
        let conn = self.lock()?;
        Ok(load_collection(&conn)?.into_iter().find(|r| r.id == id))
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let mut reports = load_collection(&conn)?;
        let before = reports.len();
        reports.retain(|r| r.id != id);
        if reports.len() != before {
            write_collection(&conn, &reports)?;
            tracing::info!(report_id = %id, "Report deleted");
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        delete_value(&conn, REPORTS_KEY)?;
        tracing::info!("All stored reports cleared");
        Ok(())
    }
}

/// Newest first, the order report lists are shown in.
pub fn sort_newest_first(reports: &mut [StoredReport]) {
    reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
