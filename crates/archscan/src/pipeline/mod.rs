pub mod cleanup;
pub mod config;
pub mod error;
pub mod progress;
pub mod runner;

pub use cleanup::TempPaths;
pub use config::PipelineConfig;
pub use error::{CleanupError, PipelineError};
pub use progress::{NoopProgress, ProgressReporter, ScanStage};
pub use runner::Pipeline;
