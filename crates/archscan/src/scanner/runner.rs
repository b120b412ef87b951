use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::process::{CommandSpec, ProcessRunner};
use crate::scanner::result::ScanReport;
use crate::scanner::Ruleset;

/// Runs the static analysis tool against an unpacked source tree.
pub struct ScanRunner {
    runner: Arc<dyn ProcessRunner>,
    config: ScannerConfig,
}

impl ScanRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: ScannerConfig) -> Self {
        Self { runner, config }
    }

    /// Quiet, metrics off, JSON on stdout, scanning `workdir` with `ruleset`.
    pub fn command_for(&self, workdir: &Path, ruleset: Ruleset) -> CommandSpec {
        CommandSpec::new(&self.config.binary)
            .args(["scan", "-q", "--metrics", "off", "--json", "--config"])
            .arg(ruleset.config_arg())
            .arg(workdir.to_string_lossy())
            .timeout(self.config.timeout())
    }

    /// Scans `workdir` and returns the report with `workdir` stripped from every path.
    ///
    /// The report must parse as a [`ScanReport`] before it is accepted.
    pub fn scan(&self, workdir: &Path, ruleset: Ruleset) -> Result<String, ScanError> {
        let command = self.command_for(workdir, ruleset);
        info!("Running {}", command.display());

        let output = self.runner.run(&command)?;
        if !output.success {
            return Err(ScanError::NonZeroExit {
                detail: output.failure_detail(),
            });
        }

        let report: ScanReport =
            serde_json::from_slice(&output.stdout).map_err(ScanError::InvalidOutput)?;
        debug!("Scanner reported {} findings", report.results.len());

        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(strip_workdir_prefix(&raw, workdir))
    }
}

/// Removes every occurrence of `<workdir>/` from a JSON document.
///
/// The prefix is matched in its JSON-escaped form so paths containing quotes
/// or backslashes are stripped as they appear inside string literals.
pub fn strip_workdir_prefix(raw: &str, workdir: &Path) -> String {
    let dir = workdir.to_string_lossy();
    let prefix = format!("{}/", dir.trim_end_matches('/'));

    let escaped = match serde_json::to_string(&prefix) {
        Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
        Err(_) => prefix,
    };

    raw.replace(&escaped, "")
}
