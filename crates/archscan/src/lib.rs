pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod sanitize;
pub mod scanner;
pub mod secrets;
pub mod service;
pub mod worker;

pub use archive::ArchiveKind;
pub use config::{load_config, load_config_or_default, Config};
pub use db::{Database, ScanStore};
pub use error::{
    ArchiveError, ArchscanError, ConfigError, ExtractError, NormalizeError, ProcessError, Result,
    ScanError, SubmitError, WorkerError,
};
pub use pipeline::{Pipeline, PipelineConfig, ProgressReporter, ScanStage};
pub use process::{ProcessRunner, SystemRunner};
pub use scanner::{normalize, Finding, Ruleset};
pub use secrets::{resolve_scanner_token, resolve_secret, SecretError};
pub use service::{parse_id, NewScan, ScanReportView, ScanService};
pub use worker::{PoolOptions, Scan, ScanOutcome, WorkerPool};
