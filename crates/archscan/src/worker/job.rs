use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::archive::ArchiveKind;
use crate::scanner::Ruleset;

/// One submitted scan and its lifecycle state.
///
/// The completion fields are private: a scan moves from unfinished to finished
/// exactly once, through [`Scan::complete`], and carries either an error or an
/// output document afterwards, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub id: Uuid,
    pub name: String,
    pub ruleset: Ruleset,
    pub archive_kind: ArchiveKind,
    /// Original file name of the upload, for display only.
    pub upload_name: String,
    pub upload_path: PathBuf,
    pub unpacked_path: PathBuf,
    pub submitted_at: DateTime<Utc>,
    finished: bool,
    error: Option<String>,
    output: Option<String>,
}

/// Where a scan currently stands, borrowed from the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome<'a> {
    Pending,
    Failed(&'a str),
    Succeeded(&'a str),
}

impl Scan {
    /// Creates an unfinished scan with a fresh identifier. Upload and unpack
    /// locations are derived from the identifier under `temp_root`.
    pub fn new(
        name: impl Into<String>,
        ruleset: Ruleset,
        archive_kind: ArchiveKind,
        upload_name: impl Into<String>,
        temp_root: &Path,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.into(),
            ruleset,
            archive_kind,
            upload_name: upload_name.into(),
            upload_path: upload_path_for(temp_root, id, archive_kind),
            unpacked_path: unpacked_path_for(temp_root, id),
            submitted_at: Utc::now(),
            finished: false,
            error: None,
            output: None,
        }
    }

    /// Rebuilds a scan from stored state.
    ///
    /// A finished record with both or neither of `error`/`output` is normalised
    /// so the error wins and a missing output reads as an empty document error.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid,
        name: String,
        ruleset: Ruleset,
        archive_kind: ArchiveKind,
        upload_name: String,
        upload_path: PathBuf,
        unpacked_path: PathBuf,
        submitted_at: DateTime<Utc>,
        finished: bool,
        error: Option<String>,
        output: Option<String>,
    ) -> Self {
        let error = error.filter(|e| !e.is_empty());
        let output = output.filter(|o| !o.is_empty());
        let (error, output) = match (finished, error, output) {
            (false, _, _) => (None, None),
            (true, Some(error), _) => (Some(error), None),
            (true, None, Some(output)) => (None, Some(output)),
            (true, None, None) => (Some("scan finished without output".to_string()), None),
        };

        Self {
            id,
            name,
            ruleset,
            archive_kind,
            upload_name,
            upload_path,
            unpacked_path,
            submitted_at,
            finished,
            error,
            output,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Failure reason, set only on finished scans that failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Stored scanner report, set only on finished scans that succeeded.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn outcome(&self) -> ScanOutcome<'_> {
        match (&self.error, &self.output) {
            _ if !self.finished => ScanOutcome::Pending,
            (Some(error), _) => ScanOutcome::Failed(error),
            (None, Some(output)) => ScanOutcome::Succeeded(output),
            (None, None) => ScanOutcome::Pending,
        }
    }

    /// Records the pipeline result and marks the scan finished.
    ///
    /// Returns `false` and changes nothing if the scan was already finished.
    pub fn complete(&mut self, result: Result<String, String>) -> bool {
        if self.finished {
            return false;
        }
        match result {
            Ok(output) => {
                self.output = Some(output);
                self.error = None;
            }
            Err(error) => {
                self.error = Some(error);
                self.output = None;
            }
        }
        self.finished = true;
        true
    }
}

/// `<temp_root>/<id><ext>`, where the saved upload lives until cleanup.
pub fn upload_path_for(temp_root: &Path, id: Uuid, kind: ArchiveKind) -> PathBuf {
    temp_root.join(format!("{}{}", id, kind.extension()))
}

/// `<temp_root>/<id>`, the directory the upload is unpacked into.
pub fn unpacked_path_for(temp_root: &Path, id: Uuid) -> PathBuf {
    temp_root.join(id.to_string())
}
