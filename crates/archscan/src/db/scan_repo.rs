//! Scan repository: CRUD operations for the `scans` table.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{Database, DatabaseError};
use crate::archive::ArchiveKind;
use crate::error::{ArchiveError, SubmitError};
use crate::scanner::Ruleset;
use crate::worker::job::Scan;

/// A raw scan row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub id: String,
    pub name: String,
    pub ruleset: String,
    pub archive_kind: String,
    pub upload_name: String,
    pub upload_path: String,
    pub unpacked_path: String,
    pub submitted_at: String,
    pub finished: bool,
    pub error: Option<String>,
    pub output: Option<String>,
}

impl ScanRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            ruleset: row.get("ruleset")?,
            archive_kind: row.get("archive_kind")?,
            upload_name: row.get("upload_name")?,
            upload_path: row.get("upload_path")?,
            unpacked_path: row.get("unpacked_path")?,
            submitted_at: row.get("submitted_at")?,
            finished: row.get("finished")?,
            error: row.get("error")?,
            output: row.get("output")?,
        })
    }
}

impl From<&Scan> for ScanRow {
    fn from(scan: &Scan) -> Self {
        Self {
            id: scan.id.to_string(),
            name: scan.name.clone(),
            ruleset: scan.ruleset.as_str().to_string(),
            archive_kind: scan.archive_kind.as_str().to_string(),
            upload_name: scan.upload_name.clone(),
            upload_path: scan.upload_path.to_string_lossy().into_owned(),
            unpacked_path: scan.unpacked_path.to_string_lossy().into_owned(),
            submitted_at: scan
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            finished: scan.is_finished(),
            error: scan.error().map(str::to_string),
            output: scan.output().map(str::to_string),
        }
    }
}

impl TryFrom<ScanRow> for Scan {
    type Error = DatabaseError;

    fn try_from(row: ScanRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|e| DatabaseError::Decode {
            column: "id",
            reason: e.to_string(),
        })?;
        let ruleset: Ruleset = row.ruleset.parse().map_err(|e: SubmitError| {
            DatabaseError::Decode {
                column: "ruleset",
                reason: e.to_string(),
            }
        })?;
        let archive_kind: ArchiveKind = row.archive_kind.parse().map_err(|e: ArchiveError| {
            DatabaseError::Decode {
                column: "archive_kind",
                reason: e.to_string(),
            }
        })?;
        let submitted_at = DateTime::parse_from_rfc3339(&row.submitted_at)
            .map_err(|e| DatabaseError::Decode {
                column: "submitted_at",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        Ok(Scan::restore(
            id,
            row.name,
            ruleset,
            archive_kind,
            row.upload_name,
            PathBuf::from(row.upload_path),
            PathBuf::from(row.unpacked_path),
            submitted_at,
            row.finished,
            row.error,
            row.output,
        ))
    }
}

/// Inserts a new scan row.
pub fn insert(db: &Database, scan: &ScanRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scans (id, name, ruleset, archive_kind, upload_name, upload_path,
             unpacked_path, submitted_at, finished, error, output)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                scan.id,
                scan.name,
                scan.ruleset,
                scan.archive_kind,
                scan.upload_name,
                scan.upload_path,
                scan.unpacked_path,
                scan.submitted_at,
                scan.finished,
                scan.error,
                scan.output,
            ],
        )?;
        Ok(())
    })
}

/// Inserts or replaces the row keyed by `id`. `submitted_at` is kept from the first write.
pub fn save(db: &Database, scan: &ScanRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scans (id, name, ruleset, archive_kind, upload_name, upload_path,
             unpacked_path, submitted_at, finished, error, output)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                ruleset = excluded.ruleset,
                archive_kind = excluded.archive_kind,
                upload_name = excluded.upload_name,
                upload_path = excluded.upload_path,
                unpacked_path = excluded.unpacked_path,
                finished = excluded.finished,
                error = excluded.error,
                output = excluded.output",
            params![
                scan.id,
                scan.name,
                scan.ruleset,
                scan.archive_kind,
                scan.upload_name,
                scan.upload_path,
                scan.unpacked_path,
                scan.submitted_at,
                scan.finished,
                scan.error,
                scan.output,
            ],
        )?;
        Ok(())
    })
}

/// Finds a scan by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ScanRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scans WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ScanRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All scans, newest first.
pub fn list(db: &Database) -> Result<Vec<ScanRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scans ORDER BY submitted_at DESC, id")?;
        let rows = stmt
            .query_map([], ScanRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a scan. Returns whether a row was removed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM scans WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

/// Counts scans that have not finished yet.
pub fn count_unfinished(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM scans WHERE finished = 0", [], |r| {
                r.get(0)
            })?;
        Ok(count.max(0) as u64)
    })
}
