use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use secrecy::SecretString;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::ScanStore;
use crate::error::WorkerError;
use crate::pipeline::{NoopProgress, Pipeline, PipelineConfig, ProgressReporter, ScanStage};
use crate::process::ProcessRunner;
use crate::secrets;
use crate::worker::job::Scan;
use crate::worker::preflight;

/// Settings fixed for the lifetime of a pool.
pub struct PoolOptions {
    pub worker_count: usize,
    pub pipeline: PipelineConfig,
    /// Pro-tier token; when present the scanner is activated before workers start.
    pub pro_token: Option<SecretString>,
}

impl PoolOptions {
    pub fn from_config(config: &Config) -> Result<Self, WorkerError> {
        Ok(Self {
            worker_count: config.worker_count,
            pipeline: PipelineConfig::from_config(config),
            pro_token: secrets::resolve_scanner_token(&config.pro)?,
        })
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            worker_count: 3,
            pipeline: PipelineConfig::default(),
            pro_token: None,
        }
    }
}

/// Fixed set of worker threads fed through an unbuffered queue.
///
/// [`WorkerPool::submit`] blocks until a worker takes the scan.
/// [`WorkerPool::stop`] closes the queue and waits for every worker to finish
/// the scan it holds.
pub struct WorkerPool {
    sender: RwLock<Option<Sender<Scan>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
    worker_count: usize,
    busy: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    /// Scans handed to the pool whose record has not been written yet.
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl WorkerPool {
    /// Runs the startup checks and launches the workers.
    pub fn start(
        options: PoolOptions,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn ScanStore>,
    ) -> Result<Self, WorkerError> {
        Self::start_with_progress(options, runner, store, Arc::new(NoopProgress))
    }

    /// Like [`WorkerPool::start`], reporting every stage transition to `progress`.
    pub fn start_with_progress(
        options: PoolOptions,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn ScanStore>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self, WorkerError> {
        if options.worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker count must be at least 1".to_string(),
            ));
        }

        preflight::check_tool(runner.as_ref(), &options.pipeline.scanner)?;
        if let Some(token) = &options.pro_token {
            preflight::activate_pro(runner.as_ref(), &options.pipeline.scanner, token)?;
        }

        let pipeline = Arc::new(Pipeline::new(&options.pipeline, runner, Arc::clone(&store)));
        let (sender, receiver) = bounded::<Scan>(0);
        let busy = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicU64::new(0));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::with_capacity(options.worker_count);
        for worker_id in 0..options.worker_count {
            let context = WorkerContext {
                worker_id,
                receiver: receiver.clone(),
                pipeline: Arc::clone(&pipeline),
                store: Arc::clone(&store),
                progress: Arc::clone(&progress),
                busy: Arc::clone(&busy),
                completed: Arc::clone(&completed),
                in_flight: Arc::clone(&in_flight),
            };

            let spawned = thread::Builder::new()
                .name(format!("archscan-worker-{}", worker_id))
                .spawn(move || run_worker(context));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Disconnect the queue so already started workers exit.
                    drop(sender);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", options.worker_count);

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            shutdown: AtomicBool::new(false),
            worker_count: options.worker_count,
            busy,
            completed,
            in_flight,
        })
    }

    /// Hands `scan` to the next free worker, blocking until one accepts it.
    ///
    /// Fails with [`WorkerError::ChannelClosed`] once [`WorkerPool::stop`] has begun.
    pub fn submit(&self, scan: Scan) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(WorkerError::ChannelClosed);
        }

        let guard = self
            .sender
            .read()
            .map_err(|_| WorkerError::ChannelClosed)?;
        let sender = guard.as_ref().ok_or(WorkerError::ChannelClosed)?;

        info!("Adding scan {} to queue", scan.id);
        let id = scan.id;
        lock(&self.in_flight).insert(id);
        if sender.send(scan).is_err() {
            lock(&self.in_flight).remove(&id);
            return Err(WorkerError::ChannelClosed);
        }
        debug!("Scan {} accepted by a worker", id);
        Ok(())
    }

    /// Stops accepting scans and blocks until every worker has exited.
    ///
    /// Submissions already blocked in [`WorkerPool::submit`] are delivered and
    /// run to completion first. Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("Stopping workers");
        }

        // Waits for in-progress submits to be handed off, then closes the queue.
        match self.sender.write() {
            Ok(mut sender) => drop(sender.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }

        let mut workers = match self.workers.lock() {
            Ok(workers) => workers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if workers.is_empty() {
            return;
        }
        for (i, worker) in workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("Workers stopped");
    }

    /// Whether `id` was handed to this pool and its final record is not written yet.
    pub fn is_running(&self, id: Uuid) -> bool {
        lock(&self.in_flight).contains(&id)
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Workers currently running a scan.
    pub fn busy_workers(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    /// Scans that have run to completion since the pool started.
    pub fn completed_scans(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    worker_id: usize,
    receiver: Receiver<Scan>,
    pipeline: Arc<Pipeline>,
    store: Arc<dyn ScanStore>,
    progress: Arc<dyn ProgressReporter>,
    busy: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

fn lock(set: &Mutex<HashSet<Uuid>>) -> MutexGuard<'_, HashSet<Uuid>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn run_worker(ctx: WorkerContext) {
    debug!("Starting worker {}", ctx.worker_id);

    // recv fails only once the queue is closed and empty.
    while let Ok(scan) = ctx.receiver.recv() {
        let id = scan.id;
        ctx.busy.fetch_add(1, Ordering::AcqRel);
        ctx.progress.report(id, ScanStage::Queued);
        debug!("Worker {} claimed scan {}", ctx.worker_id, id);

        let record = scan.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.pipeline.run(scan, ctx.progress.as_ref())
        }));
        if outcome.is_err() {
            error!("Worker {} panicked while running scan {}", ctx.worker_id, id);
            record_panic(&ctx, record);
        }

        lock(&ctx.in_flight).remove(&id);
        ctx.busy.fetch_sub(1, Ordering::AcqRel);
        ctx.completed.fetch_add(1, Ordering::AcqRel);
    }

    debug!("Stopping worker {}", ctx.worker_id);
}

/// Finishes a scan whose pipeline panicked so its record does not stay pending.
fn record_panic(ctx: &WorkerContext, mut scan: Scan) {
    let id = scan.id;
    scan.complete(Err(format!(
        "error running scan {}: scan aborted unexpectedly",
        id
    )));
    ctx.progress.report(id, ScanStage::Failed);
    if let Err(e) = ctx.store.persist(&scan) {
        warn!("Failed to record aborted scan {}: {}", id, e);
    }
}
