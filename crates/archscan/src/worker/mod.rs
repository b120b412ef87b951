pub mod job;
pub mod pool;
pub mod preflight;

pub use job::{Scan, ScanOutcome};
pub use pool::{PoolOptions, WorkerPool};
