//! Submission and read paths over stored scans.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::archive::detect_from_bytes;
use crate::db::{scan_repo, Database, ScanRow};
use crate::error::{SubmitError, WorkerError};
use crate::sanitize;
use crate::scanner::{normalize, Finding, Ruleset};
use crate::worker::{Scan, ScanOutcome, WorkerPool};

/// A scan request as it arrives from a user.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub name: String,
    /// Rule-set key, resolved against [`Ruleset`].
    pub ruleset: String,
    /// Original file name of the upload.
    pub upload_name: String,
    pub content: Vec<u8>,
}

/// What a finished scan produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanReportView {
    Failed { error: String },
    Findings(Vec<Finding>),
}

/// Validates submissions, stages uploads and serves stored scans.
pub struct ScanService {
    db: Database,
    temp_root: PathBuf,
    pool: Option<Arc<WorkerPool>>,
}

impl ScanService {
    /// A read-only service. [`ScanService::submit`] fails until a pool is attached.
    pub fn new(db: Database, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            temp_root: temp_root.into(),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Validates `request`, stages its upload and hands it to the pool.
    ///
    /// Blocks until a worker accepts the scan. Unsupported archives are
    /// rejected before anything touches the filesystem.
    pub fn submit(&self, request: NewScan) -> Result<Scan, SubmitError> {
        let name = sanitize::strip_markup(&request.name);
        if name.is_empty() {
            return Err(SubmitError::EmptyName);
        }
        let ruleset: Ruleset = request.ruleset.parse()?;
        if request.content.is_empty() {
            return Err(SubmitError::EmptyUpload);
        }
        let kind = detect_from_bytes(&request.content)?;
        let pool = self
            .pool
            .as_ref()
            .ok_or(SubmitError::Worker(WorkerError::ChannelClosed))?;
        if pool.is_stopped() {
            return Err(WorkerError::ChannelClosed.into());
        }

        let upload_name = sanitize::strip_markup(&request.upload_name);
        let scan = Scan::new(name, ruleset, kind, upload_name, &self.temp_root);

        fs::create_dir_all(&self.temp_root).map_err(|e| SubmitError::SaveUpload {
            path: self.temp_root.clone(),
            source: e,
        })?;
        fs::write(&scan.upload_path, &request.content).map_err(|e| SubmitError::SaveUpload {
            path: scan.upload_path.clone(),
            source: e,
        })?;

        if let Err(e) = scan_repo::insert(&self.db, &ScanRow::from(&scan)) {
            self.discard(&scan);
            return Err(e.into());
        }

        info!(
            "Submitting scan {} ({} archive, ruleset {})",
            scan.id, kind, ruleset
        );
        if let Err(e) = pool.submit(scan.clone()) {
            self.discard(&scan);
            if let Err(db_err) = scan_repo::delete(&self.db, &scan.id.to_string()) {
                warn!("Failed to remove record of rejected scan {}: {}", scan.id, db_err);
            }
            return Err(e.into());
        }

        Ok(scan)
    }

    /// Reads `path` and submits it under its file name.
    pub fn submit_file(
        &self,
        name: &str,
        ruleset: &str,
        path: &Path,
    ) -> Result<Scan, SubmitError> {
        let content = fs::read(path).map_err(|e| {
            SubmitError::Archive(crate::error::ArchiveError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        })?;
        let upload_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.submit(NewScan {
            name: name.to_string(),
            ruleset: ruleset.to_string(),
            upload_name,
            content,
        })
    }

    pub fn get(&self, id: Uuid) -> Result<Scan, SubmitError> {
        let row = scan_repo::find_by_id(&self.db, &id.to_string())?
            .ok_or(SubmitError::NotFound(id))?;
        Ok(Scan::try_from(row)?)
    }

    /// All scans, newest first.
    pub fn list(&self) -> Result<Vec<Scan>, SubmitError> {
        scan_repo::list(&self.db)?
            .into_iter()
            .map(|row| Scan::try_from(row).map_err(SubmitError::from))
            .collect()
    }

    /// Removes a scan record.
    ///
    /// Scans the attached pool still holds cannot be deleted. An unfinished
    /// record nothing is working on (its run was interrupted or its final
    /// write failed) is removed like a finished one.
    pub fn delete(&self, id: Uuid) -> Result<(), SubmitError> {
        let scan = self.get(id)?;
        if !scan.is_finished() {
            if self.pool.as_ref().is_some_and(|pool| pool.is_running(id)) {
                return Err(SubmitError::NotFinished(id));
            }
            warn!("Deleting scan {} which never finished", id);
        }
        if !scan_repo::delete(&self.db, &id.to_string())? {
            return Err(SubmitError::NotFound(id));
        }
        info!("Deleted scan {}", id);
        Ok(())
    }

    /// The recorded error, or the findings parsed from the stored report.
    pub fn results(&self, id: Uuid) -> Result<ScanReportView, SubmitError> {
        let scan = self.get(id)?;
        match scan.outcome() {
            ScanOutcome::Pending => Err(SubmitError::NotFinished(id)),
            ScanOutcome::Failed(error) => Ok(ScanReportView::Failed {
                error: error.to_string(),
            }),
            ScanOutcome::Succeeded(output) => Ok(ScanReportView::Findings(normalize(output)?)),
        }
    }

    /// The stored scanner report as it was written.
    pub fn raw_output(&self, id: Uuid) -> Result<String, SubmitError> {
        let scan = self.get(id)?;
        match scan.outcome() {
            ScanOutcome::Pending => Err(SubmitError::NotFinished(id)),
            ScanOutcome::Failed(error) => Err(SubmitError::ScanFailed(error.to_string())),
            ScanOutcome::Succeeded(output) => Ok(output.to_string()),
        }
    }

    /// Scans recorded but not yet finished.
    pub fn pending_count(&self) -> Result<u64, SubmitError> {
        Ok(scan_repo::count_unfinished(&self.db)?)
    }

    fn discard(&self, scan: &Scan) {
        if let Err(e) = fs::remove_file(&scan.upload_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove upload {} of rejected scan {}: {}",
                    sanitize::redact_path(&scan.upload_path),
                    scan.id,
                    e
                );
            }
        }
    }
}

/// Parses a scan identifier.
pub fn parse_id(raw: &str) -> Result<Uuid, SubmitError> {
    Uuid::parse_str(raw.trim()).map_err(|_| SubmitError::InvalidId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveKind;
    use crate::error::{ArchiveError, ProcessError};
    use crate::process::testing::{ok, ScriptedRunner};
    use crate::process::{CommandSpec, ProcessOutput};
    use crate::worker::PoolOptions;
    use tempfile::TempDir;

    const REPORT: &str = r#"{"results": [{"check_id": "python.lang.security.audit.eval", "path": "app.py",
        "start": {"line": 3, "col": 1}, "end": {"line": 3, "col": 9},
        "extra": {"message": "eval is dangerous", "severity": "ERROR",
                  "metadata": {"cwe": "CWE-95", "owasp": ["A03:2021"]}}}], "errors": []}"#;

    fn tools(spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        match spec.args.first().map(String::as_str) {
            Some("--help") => ok("Usage: semgrep [OPTIONS] COMMAND"),
            Some("scan") => ok(REPORT),
            _ => ok(""),
        }
    }

    fn zip_bytes() -> Vec<u8> {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(&[0u8; 60]);
        bytes
    }

    fn request(name: &str, ruleset: &str, content: Vec<u8>) -> NewScan {
        NewScan {
            name: name.to_string(),
            ruleset: ruleset.to_string(),
            upload_name: "upload.zip".to_string(),
            content,
        }
    }

    fn service(dir: &TempDir) -> (ScanService, Arc<WorkerPool>) {
        let db = Database::open_in_memory().unwrap();
        let pool = Arc::new(
            WorkerPool::start(
                PoolOptions {
                    worker_count: 2,
                    ..PoolOptions::default()
                },
                Arc::new(ScriptedRunner::new(tools)),
                Arc::new(db.clone()),
            )
            .unwrap(),
        );
        let service = ScanService::new(db, dir.path().join("tmp")).with_pool(Arc::clone(&pool));
        (service, pool)
    }

    #[test]
    fn test_submit_and_read_findings() {
        let dir = TempDir::new().unwrap();
        let (service, pool) = service(&dir);

        let scan = service
            .submit(request("<b>shop</b> api", "python", zip_bytes()))
            .unwrap();
        assert_eq!(scan.name, "shop api");
        pool.stop();

        let stored = service.get(scan.id).unwrap();
        assert!(stored.is_finished());
        assert!(!stored.upload_path.exists());
        assert!(!stored.unpacked_path.exists());

        match service.results(scan.id).unwrap() {
            ScanReportView::Findings(findings) => {
                assert_eq!(findings.len(), 1);
                assert_eq!(findings[0].path, "app.py");
            }
            other => panic!("unexpected view: {other:?}"),
        }
        assert!(service.raw_output(scan.id).unwrap().contains("eval is dangerous"));
        assert_eq!(service.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = TempDir::new().unwrap();
        let (service, _pool) = service(&dir);
        let err = service
            .submit(request("  <i></i> ", "default", zip_bytes()))
            .unwrap_err();
        assert!(matches!(err, SubmitError::EmptyName));
    }

    #[test]
    fn test_unknown_ruleset_rejected() {
        let dir = TempDir::new().unwrap();
        let (service, _pool) = service(&dir);
        let err = service
            .submit(request("api", "cobol", zip_bytes()))
            .unwrap_err();
        match err {
            SubmitError::UnknownRuleset { given, known } => {
                assert_eq!(given, "cobol");
                assert!(known.contains("owasp-top-ten"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_archive_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let (service, _pool) = service(&dir);
        let xz = vec![0xFD, b'7', b'z', b'X', b'Z', 0x00, 0x00, 0x04];

        let err = service.submit(request("api", "default", xz)).unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Archive(ArchiveError::UnsupportedFormat { .. })
        ));
        assert!(!service.temp_root().exists());
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn test_empty_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let (service, _pool) = service(&dir);
        let err = service.submit(request("api", "default", Vec::new())).unwrap_err();
        assert!(matches!(err, SubmitError::EmptyUpload));
    }

    #[test]
    fn test_submit_after_stop_rolls_back() {
        let dir = TempDir::new().unwrap();
        let (service, pool) = service(&dir);
        pool.stop();

        let err = service
            .submit(request("api", "default", zip_bytes()))
            .unwrap_err();

        assert!(matches!(err, SubmitError::Worker(WorkerError::ChannelClosed)));
        assert!(service.list().unwrap().is_empty());
        let leftovers = fs::read_dir(service.temp_root()).map_or(0, |dir| dir.count());
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_read_only_service_cannot_submit() {
        let dir = TempDir::new().unwrap();
        let service = ScanService::new(Database::open_in_memory().unwrap(), dir.path());
        let err = service
            .submit(request("api", "default", zip_bytes()))
            .unwrap_err();
        assert!(matches!(err, SubmitError::Worker(WorkerError::ChannelClosed)));
    }

    #[test]
    fn test_abandoned_scan_can_be_deleted_but_not_read() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let scan = Scan::new("api", Ruleset::Default, ArchiveKind::Zip, "a.zip", dir.path());
        scan_repo::insert(&db, &ScanRow::from(&scan)).unwrap();
        let service = ScanService::new(db, dir.path());

        assert!(matches!(service.results(scan.id), Err(SubmitError::NotFinished(_))));
        assert!(matches!(service.raw_output(scan.id), Err(SubmitError::NotFinished(_))));
        assert_eq!(service.pending_count().unwrap(), 1);

        service.delete(scan.id).unwrap();
        assert!(matches!(service.get(scan.id), Err(SubmitError::NotFound(_))));
        assert_eq!(service.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_running_scan_cannot_be_deleted() {
        let dir = TempDir::new().unwrap();
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let runner = ScriptedRunner::new(move |spec| {
            if spec.args.first().map(String::as_str) == Some("scan") {
                let _ = release_rx.recv_timeout(std::time::Duration::from_secs(10));
            }
            tools(spec)
        });
        let db = Database::open_in_memory().unwrap();
        let pool = Arc::new(
            WorkerPool::start(
                PoolOptions {
                    worker_count: 1,
                    ..PoolOptions::default()
                },
                Arc::new(runner),
                Arc::new(db.clone()),
            )
            .unwrap(),
        );
        let service = ScanService::new(db, dir.path().join("tmp")).with_pool(Arc::clone(&pool));

        let scan = service.submit(request("api", "default", zip_bytes())).unwrap();
        assert!(matches!(service.delete(scan.id), Err(SubmitError::NotFinished(_))));

        release_tx.send(()).unwrap();
        pool.stop();
        service.delete(scan.id).unwrap();
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn test_failed_scan_reports_error() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let mut scan = Scan::new("api", Ruleset::Default, ArchiveKind::Zip, "a.zip", dir.path());
        scan.complete(Err("error running scan: unzip exited 9".to_string()));
        scan_repo::insert(&db, &ScanRow::from(&scan)).unwrap();
        let service = ScanService::new(db, dir.path());

        assert_eq!(
            service.results(scan.id).unwrap(),
            ScanReportView::Failed {
                error: "error running scan: unzip exited 9".to_string()
            }
        );
        assert!(matches!(service.raw_output(scan.id), Err(SubmitError::ScanFailed(_))));

        service.delete(scan.id).unwrap();
        assert!(matches!(service.get(scan.id), Err(SubmitError::NotFound(_))));
        assert!(matches!(service.delete(scan.id), Err(SubmitError::NotFound(_))));
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(parse_id("../etc/passwd"), Err(SubmitError::InvalidId(_))));
    }
}
