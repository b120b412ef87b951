use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::archive::ArchiveKind;

#[derive(Error, Debug)]
pub enum ArchscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Result error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?} and was killed")]
    TimedOut { program: String, timeout: Duration },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Unsupported archive format (detected {detected})")]
    UnsupportedFormat { detected: String },

    #[error("Failed to read archive '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to create unpack directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to unpack {kind} archive: {source}")]
    Process {
        kind: ArchiveKind,
        #[source]
        source: ProcessError,
    },

    #[error("Failed to unpack {kind} archive: {detail}")]
    NonZeroExit { kind: ArchiveKind, detail: String },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scanner could not be run: {0}")]
    Process(#[from] ProcessError),

    #[error("Scanner failed: {detail}")]
    NonZeroExit { detail: String },

    #[error("Scanner produced invalid output: {0}")]
    InvalidOutput(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Malformed scanner output: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker pool is shutting down, no new scans are accepted")]
    ChannelClosed,

    #[error("Scanning tool '{program}' is not installed or not in $PATH: {detail}")]
    ToolNotAvailable { program: String, detail: String },

    #[error("Scanner pro activation failed: {0}")]
    ActivationFailed(String),

    #[error("Invalid scanner token: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Failed to persist scan {id}: {source}")]
    PersistenceFailed {
        id: uuid::Uuid,
        #[source]
        source: crate::db::DatabaseError,
    },
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Invalid ruleset '{given}', must be one of: {known}")]
    UnknownRuleset { given: String, known: String },

    #[error("Archive content cannot be empty")]
    EmptyUpload,

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to save upload '{path}': {source}")]
    SaveUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scan ID: {0}")]
    InvalidId(String),

    #[error("Scan not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("Scan not finished: {0}")]
    NotFinished(uuid::Uuid),

    #[error("Scan had an error: {0}")]
    ScanFailed(String),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, ArchscanError>;
