use std::sync::Arc;

use tracing::{error, info, info_span, warn};

use crate::archive::Extractor;
use crate::db::ScanStore;
use crate::error::WorkerError;
use crate::process::ProcessRunner;
use crate::sanitize;
use crate::scanner::ScanRunner;
use crate::worker::job::Scan;

use super::cleanup::TempPaths;
use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{ProgressReporter, ScanStage};

/// Runs one scan from unpacking to persistence.
pub struct Pipeline {
    extractor: Extractor,
    scanner: ScanRunner,
    store: Arc<dyn ScanStore>,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn ScanStore>,
    ) -> Self {
        Self {
            extractor: Extractor::new(Arc::clone(&runner), config.unpack.clone()),
            scanner: ScanRunner::new(runner, config.scanner.clone()),
            store,
        }
    }

    /// Runs the full pipeline for a single scan and returns it finished.
    ///
    /// Unpack and scan failures are recorded on the scan. The upload and the
    /// unpacked tree are removed on every path. The finished scan is persisted
    /// exactly once; a persistence failure is logged and otherwise ignored.
    pub fn run(&self, mut scan: Scan, progress: &dyn ProgressReporter) -> Scan {
        let archive = sanitize::redact_path(&scan.upload_path);
        let _pipeline_span = info_span!("scan_pipeline",
            scan_id = %scan.id,
            ruleset = %scan.ruleset,
            archive = %archive,
        )
        .entered();

        info!("Starting scan {}", scan.id);
        let paths = TempPaths::new(&scan.upload_path, &scan.unpacked_path);

        let result = self.execute(&scan, &paths, progress);
        let result = match result {
            Ok(output) => {
                progress.report(scan.id, ScanStage::Succeeded);
                Ok(output)
            }
            Err(e) => {
                let detail = e.to_string();
                error!("error running scan {}: {}", scan.id, detail);
                progress.report(scan.id, ScanStage::Failed);
                Err(format!(
                    "error running scan {}: {}",
                    scan.id,
                    redacted(&detail, &paths)
                ))
            }
        };

        {
            let _step = info_span!("cleanup").entered();
            for e in paths.cleanup() {
                warn!("{}", e);
            }
            progress.report(scan.id, ScanStage::Cleaned);
        }

        if !scan.complete(result) {
            warn!("Scan {} was already finished, keeping its first result", scan.id);
        }

        {
            let _step = info_span!("persist").entered();
            if let Err(e) = self.store.persist(&scan) {
                let e = WorkerError::PersistenceFailed {
                    id: scan.id,
                    source: e,
                };
                error!("{}", e);
            }
        }

        info!("Finished scan {}", scan.id);
        scan
    }

    fn execute(
        &self,
        scan: &Scan,
        paths: &TempPaths,
        progress: &dyn ProgressReporter,
    ) -> Result<String, PipelineError> {
        {
            let _step = info_span!("unpack", kind = %scan.archive_kind).entered();
            progress.report(scan.id, ScanStage::Unpacking);
            self.extractor
                .extract(paths.upload(), scan.archive_kind, paths.unpacked())?;
        }

        let _step = info_span!("scan").entered();
        progress.report(scan.id, ScanStage::Scanning);
        let output = self.scanner.scan(paths.unpacked(), scan.ruleset)?;
        Ok(output)
    }
}

/// `detail` with the scan's temp paths reduced to file names, for the stored record.
fn redacted(detail: &str, paths: &TempPaths) -> String {
    let mut known = vec![paths.upload(), paths.unpacked()];
    if let Some(root) = paths.upload().parent() {
        known.push(root);
    }
    sanitize::redact_paths_in(detail, &known)
}
