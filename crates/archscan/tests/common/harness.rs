//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct provides an isolated environment for exercising
//! the pool and the submission service:
//! - a temporary upload root and database file
//! - fake unpack and scanner tools
//! - archive fixtures built on the fly

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use archscan::pipeline::PipelineConfig;
use archscan::{Database, PoolOptions, ProcessRunner, ScanService, ScanStore, WorkerPool};

use super::fakes::{FakeTools, RecordingProgress};

pub struct TestHarness {
    temp_dir: TempDir,
    /// Where uploads are staged and unpacked.
    pub temp_root: PathBuf,
    pub db: Database,
    pub tools: Arc<FakeTools>,
    pub progress: Arc<RecordingProgress>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_tools(FakeTools::new())
    }

    pub fn with_tools(tools: FakeTools) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let temp_root = temp_dir.path().join("uploads");
        let db = Database::open(&temp_dir.path().join("data").join("archscan.db"))
            .expect("Failed to open database");

        Self {
            temp_dir,
            temp_root,
            db,
            tools: Arc::new(tools),
            progress: Arc::new(RecordingProgress::default()),
        }
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Starts a pool writing to the harness database.
    pub fn start_pool(&self, worker_count: usize) -> Arc<WorkerPool> {
        self.start_pool_with_store(worker_count, Arc::new(self.db.clone()))
    }

    pub fn start_pool_with_store(
        &self,
        worker_count: usize,
        store: Arc<dyn ScanStore>,
    ) -> Arc<WorkerPool> {
        let options = PoolOptions {
            worker_count,
            pipeline: PipelineConfig::default(),
            pro_token: None,
        };
        let pool = WorkerPool::start_with_progress(
            options,
            Arc::clone(&self.tools) as Arc<dyn ProcessRunner>,
            store,
            Arc::clone(&self.progress) as Arc<dyn archscan::ProgressReporter>,
        )
        .expect("Failed to start worker pool");
        Arc::new(pool)
    }

    /// A submission service bound to `pool`.
    pub fn service(&self, pool: &Arc<WorkerPool>) -> ScanService {
        ScanService::new(self.db.clone(), &self.temp_root).with_pool(Arc::clone(pool))
    }

    /// Files left under the upload root.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.temp_root) {
            Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Writes `bytes` to a file under the harness directory and returns its path.
    pub fn write_fixture(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join("fixtures").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

/// Builds a real zip archive holding `files` as `(name, contents)` pairs.
pub fn zip_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start zip entry");
        writer
            .write_all(contents.as_bytes())
            .expect("Failed to write zip entry");
    }
    writer.finish().expect("Failed to finish zip").into_inner()
}

/// A small source tree archived as zip.
pub fn sample_project_zip() -> Vec<u8> {
    zip_archive(&[
        ("project/app.py", "import os\nos.system(input())\n"),
        ("project/lib/util.py", "def helper():\n    return 1\n"),
    ])
}

/// Gzip magic followed by filler; enough for detection, the fake `tar` ignores content.
pub fn gzip_bytes() -> Vec<u8> {
    let mut bytes = vec![0x1f, 0x8b, 0x08, 0x00];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}

/// 7z signature, which no unpacker supports.
pub fn seven_zip_bytes() -> Vec<u8> {
    let mut bytes = vec![b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}
