use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::CleanupError;

/// Owns a scan's upload file and unpack directory until they are removed.
///
/// Removal happens on [`TempPaths::cleanup`] or, if that is never reached, on
/// drop. Paths that are already gone count as removed.
#[derive(Debug)]
pub struct TempPaths {
    upload: PathBuf,
    unpacked: PathBuf,
    released: bool,
}

impl TempPaths {
    pub fn new(upload: impl Into<PathBuf>, unpacked: impl Into<PathBuf>) -> Self {
        Self {
            upload: upload.into(),
            unpacked: unpacked.into(),
            released: false,
        }
    }

    pub fn upload(&self) -> &Path {
        &self.upload
    }

    pub fn unpacked(&self) -> &Path {
        &self.unpacked
    }

    /// Removes both paths once and returns whatever could not be removed.
    pub fn cleanup(mut self) -> Vec<CleanupError> {
        self.released = true;
        remove_both(&self.upload, &self.unpacked)
    }
}

impl Drop for TempPaths {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for error in remove_both(&self.upload, &self.unpacked) {
            warn!("{}", error);
        }
    }
}

fn remove_both(upload: &Path, unpacked: &Path) -> Vec<CleanupError> {
    let mut errors = Vec::new();

    debug!("Removing {}", upload.display());
    if let Err(e) = ignore_missing(std::fs::remove_file(upload)) {
        errors.push(CleanupError::RemoveFile {
            path: upload.to_path_buf(),
            source: e,
        });
    }

    debug!("Removing {}", unpacked.display());
    if let Err(e) = ignore_missing(std::fs::remove_dir_all(unpacked)) {
        errors.push(CleanupError::RemoveDir {
            path: unpacked.to_path_buf(),
            source: e,
        });
    }

    errors
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
