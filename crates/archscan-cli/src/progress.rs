use archscan::{ProgressReporter, ScanStage};
use uuid::Uuid;

/// Prints one line per stage transition to stderr.
pub struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn report(&self, scan_id: Uuid, stage: ScanStage) {
        eprintln!("[{}] {}", short_id(scan_id), stage);
    }
}

/// First block of the hyphenated ID, enough to tell concurrent scans apart.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
