use std::fmt;

use uuid::Uuid;

/// Lifecycle stages of a single scan, in the order a worker moves through them.
///
/// `Succeeded` and `Failed` are exclusive; `Cleaned` always follows one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStage {
    Queued,
    Unpacking,
    Scanning,
    Succeeded,
    Failed,
    Cleaned,
}

impl ScanStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStage::Queued => "queued",
            ScanStage::Unpacking => "unpacking",
            ScanStage::Scanning => "scanning",
            ScanStage::Succeeded => "succeeded",
            ScanStage::Failed => "failed",
            ScanStage::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer for stage transitions. Called from worker threads.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, scan_id: Uuid, stage: ScanStage);
}

/// Reporter that ignores every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _scan_id: Uuid, _stage: ScanStage) {}
}
