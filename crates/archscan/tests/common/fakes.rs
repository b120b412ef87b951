//! Test doubles for the pool's collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde_json::json;
use uuid::Uuid;

use archscan::db::DatabaseError;
use archscan::process::{CommandSpec, ProcessOutput};
use archscan::{ProcessError, ProcessRunner, ProgressReporter, Scan, ScanStage, ScanStore};

pub const HELP_TEXT: &str = "Usage: semgrep [OPTIONS] COMMAND [ARGS]...";

/// Emulates `unzip`, `tar` and `semgrep` against the real filesystem.
///
/// - `unzip` really extracts the archive with the `zip` crate and exits 9 on a
///   corrupt one.
/// - `tar` writes a fixed `src/app.py` into the target directory.
/// - `semgrep scan` reports one finding per file under the working directory,
///   with absolute paths as the real tool does.
#[derive(Default)]
pub struct FakeTools {
    /// Scans wait for one message each before answering.
    gate: Option<Receiver<()>>,
    scan_delay: Option<Duration>,
    fail_scans: bool,
    missing_tool: bool,
    active_scans: AtomicUsize,
    max_active_scans: AtomicUsize,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Receiver<()>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with_scan_delay(delay: Duration) -> Self {
        Self {
            scan_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_scans() -> Self {
        Self {
            fail_scans: true,
            ..Self::default()
        }
    }

    pub fn without_scanner() -> Self {
        Self {
            missing_tool: true,
            ..Self::default()
        }
    }

    /// Working directories the scanner was pointed at, in call order.
    pub fn scanned_dirs(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(program, args)| {
                program == "semgrep" && args.first().map(String::as_str) == Some("scan")
            })
            .filter_map(|(_, args)| args.last().map(PathBuf::from))
            .collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(program, args)| {
                format!("{} {}", program, args.first().cloned().unwrap_or_default())
            })
            .collect()
    }

    pub fn max_concurrent_scans(&self) -> usize {
        self.max_active_scans.load(Ordering::SeqCst)
    }

    fn unzip(&self, args: &[String]) -> Result<ProcessOutput, ProcessError> {
        let source = &args[2];
        let target = &args[4];
        let archive = File::open(source).and_then(|f| {
            zip::ZipArchive::new(f)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        });
        match archive.and_then(|mut a| {
            a.extract(target)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }) {
            Ok(()) => Ok(success("")),
            Err(e) => Ok(failure(9, &format!("unzip: cannot find zipfile directory: {}", e))),
        }
    }

    fn tar(&self, args: &[String]) -> Result<ProcessOutput, ProcessError> {
        let target = Path::new(&args[3]);
        let src = target.join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("app.py"), "import os\nos.system(input())\n").unwrap();
        Ok(success(""))
    }

    fn scan(&self, args: &[String]) -> Result<ProcessOutput, ProcessError> {
        let active = self.active_scans.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_scans.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(Duration::from_secs(30));
        }
        if let Some(delay) = self.scan_delay {
            std::thread::sleep(delay);
        }

        let result = if self.fail_scans {
            Ok(failure(2, "semgrep: invalid configuration"))
        } else {
            let workdir = PathBuf::from(args.last().cloned().unwrap_or_default());
            Ok(success(&report_for(&workdir)))
        };

        self.active_scans.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ProcessRunner for FakeTools {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        self.calls
            .lock()
            .unwrap()
            .push((command.program.clone(), command.args.clone()));

        match command.program.as_str() {
            "semgrep" if self.missing_tool => Err(ProcessError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            "semgrep" => match command.args.first().map(String::as_str) {
                Some("--help") => Ok(success(HELP_TEXT)),
                Some("scan") => self.scan(&command.args),
                _ => Ok(success("")),
            },
            "unzip" => self.unzip(&command.args),
            "tar" => self.tar(&command.args),
            other => Ok(failure(127, &format!("{}: command not found", other))),
        }
    }
}

fn success(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        success: true,
        code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

fn failure(code: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        success: false,
        code: Some(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// One finding per file, paths absolute under `workdir`.
fn report_for(workdir: &Path) -> String {
    let results: Vec<_> = files_under(workdir)
        .into_iter()
        .map(|file| {
            json!({
                "check_id": "python.lang.security.audit.dangerous-system-call",
                "path": file.to_string_lossy(),
                "start": {"line": 2, "col": 1, "offset": 10},
                "end": {"line": 2, "col": 24, "offset": 33},
                "extra": {
                    "lines": "os.system(input())",
                    "message": "Found user input in a system call",
                    "severity": "ERROR",
                    "metadata": {
                        "cwe": ["CWE-78: Improper Neutralization of Special Elements used in an OS Command"],
                        "owasp": "A03:2021 - Injection",
                        "category": "security",
                        "references": null
                    }
                }
            })
        })
        .collect();

    json!({"version": "1.90.0", "results": results, "errors": []}).to_string()
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    let mut entries: Vec<_> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

/// `ScanStore` that keeps every persisted state in memory.
#[derive(Default)]
pub struct RecordingStore {
    persisted: Mutex<Vec<Scan>>,
}

impl RecordingStore {
    pub fn persisted(&self) -> Vec<Scan> {
        self.persisted.lock().unwrap().clone()
    }

    pub fn persist_counts(&self) -> HashMap<Uuid, usize> {
        let mut counts = HashMap::new();
        for scan in self.persisted.lock().unwrap().iter() {
            *counts.entry(scan.id).or_insert(0) += 1;
        }
        counts
    }
}

impl ScanStore for RecordingStore {
    fn persist(&self, scan: &Scan) -> Result<(), DatabaseError> {
        self.persisted.lock().unwrap().push(scan.clone());
        Ok(())
    }
}

/// A store whose writes always fail.
pub struct RejectingStore;

impl ScanStore for RejectingStore {
    fn persist(&self, _scan: &Scan) -> Result<(), DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }
}

/// Records every reported transition in order.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(Uuid, ScanStage)>>,
}

impl RecordingProgress {
    pub fn stages_for(&self, scan_id: Uuid) -> Vec<ScanStage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == scan_id)
            .map(|(_, stage)| *stage)
            .collect()
    }

    pub fn count(&self, stage: ScanStage) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == stage)
            .count()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, scan_id: Uuid, stage: ScanStage) {
        self.events.lock().unwrap().push((scan_id, stage));
    }
}
