use std::path::PathBuf;

use thiserror::Error;

use crate::error::{ExtractError, ScanError};

/// Why a scan's pipeline ended in the failed state.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// A temp path that could not be removed. Logged, never propagated.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Failed to remove upload '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove unpacked directory '{path}': {source}")]
    RemoveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
