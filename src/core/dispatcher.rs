//! Bounded dispatcher handing completed scans to analysis workers.
//!
//! Admission control only: a submission that finds every slot busy is
//! rejected, never queued, so acquisition never waits on analysis.
//!
//! # Design
//!
//! - One dedicated OS thread per slot, each with its own single-threaded
//!   tokio runtime for the executor's async body
//! - Completions flow back over a channel and are reaped by the owner;
//!   there is no callback into the control loop
//! - A panicking job is caught on its worker and reported as a failure
//! - Dropping the task sender unblocks idle workers for shutdown

use std::collections::HashSet;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::{DispatchConfig, StationConfig};
use crate::core::acquisition::{AcquiredScan, ScanDataset};
use crate::core::error::{AnalysisError, DispatchRejected, StationError};

/// Everything an analysis needs besides the scan itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Station that produced the scans.
    pub station_name: String,
    /// Directory with reference cross-sections.
    pub reference_dir: PathBuf,
    /// Fit window start, nm.
    pub wave_start: f64,
    /// Fit window end, nm.
    pub wave_stop: f64,
    /// Order of the background polynomial.
    pub poly_order: u32,
    /// Initial fit parameters.
    pub initial_params: Vec<f64>,
}

impl AnalysisContext {
    /// Extract the analysis context from the station configuration.
    #[must_use]
    pub fn from_config(config: &StationConfig) -> Self {
        Self {
            station_name: config.station_name.clone(),
            reference_dir: config.analysis.reference_dir.clone(),
            wave_start: config.analysis.wave_start,
            wave_stop: config.analysis.wave_stop,
            poly_order: config.analysis.poly_order,
            initial_params: config.analysis.initial_params.clone(),
        }
    }
}

/// One unit of analysis work. The dataset is immutable once submitted.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    /// Scan number of the dataset.
    pub scan_no: u64,
    /// Where the dataset was persisted.
    pub locator: PathBuf,
    /// The dataset.
    pub dataset: Arc<ScanDataset>,
    /// Shared analysis settings.
    pub context: Arc<AnalysisContext>,
}

impl AnalysisJob {
    /// Wrap a freshly acquired scan.
    #[must_use]
    pub fn new(scan: AcquiredScan, context: Arc<AnalysisContext>) -> Self {
        Self {
            scan_no: scan.dataset.scan_sequence_no,
            locator: scan.locator,
            dataset: Arc::new(scan.dataset),
            context,
        }
    }
}

/// What a successful analysis reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Short human-readable result.
    pub summary: String,
}

/// Runs an analysis job to completion.
///
/// Called on a dedicated worker thread inside its own single-threaded
/// tokio runtime, so blocking work does not stall the control loop.
#[async_trait]
pub trait AnalysisExecutor: Send + Sync + Clone + 'static {
    /// Analyse one job.
    async fn analyse(&self, job: AnalysisJob) -> Result<AnalysisReport, AnalysisError>;
}

/// Tracks one in-flight job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle {
    /// Dispatcher-unique job id.
    pub id: u64,
    /// Scan the job analyses.
    pub scan_no: u64,
}

/// A finished job, successful or not.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    /// Handle returned at submission.
    pub handle: JobHandle,
    /// Report or failure.
    pub outcome: Result<AnalysisReport, AnalysisError>,
    /// Wall time spent on the worker.
    pub elapsed: Duration,
}

/// Statistics about dispatcher utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Concurrency ceiling.
    pub capacity: usize,
    /// Jobs in flight as of the last reap.
    pub active_jobs: usize,
    /// Jobs accepted.
    pub submitted: u64,
    /// Jobs refused at the ceiling.
    pub rejected: u64,
    /// Jobs that finished successfully.
    pub completed: u64,
    /// Jobs that failed or panicked.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct DispatchTask {
    handle: JobHandle,
    job: AnalysisJob,
}

/// Admission-controlled pool of analysis workers.
pub struct JobDispatcher<E: AnalysisExecutor> {
    capacity: usize,
    task_tx: Option<Sender<DispatchTask>>,
    done_rx: Receiver<JobCompletion>,
    active: HashSet<JobHandle>,
    finished: Vec<JobCompletion>,
    counters: Arc<DispatchCounters>,
    workers: Vec<JoinHandle<()>>,
    next_id: u64,
    _executor: PhantomData<E>,
}

impl<E: AnalysisExecutor> JobDispatcher<E> {
    /// Start `config.capacity` workers running `executor`.
    ///
    /// # Errors
    ///
    /// - `StationError::Config` if the capacity is zero
    /// - `StationError::Dispatcher` if a worker runtime cannot be built or
    ///   a worker thread cannot be spawned
    pub fn new(config: &DispatchConfig, executor: E) -> Result<Self, StationError> {
        Self::start(config, executor, worker_runtime)
    }

    fn start(
        config: &DispatchConfig,
        executor: E,
        make_runtime: impl Fn() -> std::io::Result<Runtime>,
    ) -> Result<Self, StationError> {
        if config.capacity == 0 {
            return Err(StationError::Config("dispatch capacity must be greater than 0".into()));
        }

        let (task_tx, task_rx) = bounded::<DispatchTask>(config.capacity);
        let (done_tx, done_rx) = unbounded::<JobCompletion>();
        let counters = Arc::new(DispatchCounters::default());

        let mut workers = Vec::with_capacity(config.capacity);
        for worker_id in 0..config.capacity {
            // Built here so a worker never starts without one.
            let rt = make_runtime()
                .map_err(|e| StationError::Dispatcher(format!("worker {worker_id} runtime: {e}")))?;
            let worker = spawn_worker(
                worker_id,
                rt,
                task_rx.clone(),
                done_tx.clone(),
                Arc::clone(&counters),
                executor.clone(),
                config.thread_stack_size,
            )
            .map_err(|e| StationError::Dispatcher(format!("worker {worker_id}: {e}")))?;
            workers.push(worker);
        }

        info!(capacity = config.capacity, "Analysis dispatcher started");

        Ok(Self {
            capacity: config.capacity,
            task_tx: Some(task_tx),
            done_rx,
            active: HashSet::new(),
            finished: Vec::new(),
            counters,
            workers,
            next_id: 0,
            _executor: PhantomData,
        })
    }

    /// Concurrency ceiling.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs in flight as of the last reap.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Submit a job if a slot is free.
    ///
    /// Finished jobs are reaped first, without blocking.
    ///
    /// # Errors
    ///
    /// - `DispatchRejected::AtCapacity` if every slot is busy
    /// - `DispatchRejected::Shutdown` if the dispatcher has been shut down
    pub fn submit(&mut self, job: AnalysisJob) -> Result<JobHandle, DispatchRejected> {
        self.collect_finished();

        let Some(task_tx) = self.task_tx.as_ref() else {
            return Err(DispatchRejected::Shutdown);
        };

        if self.active.len() >= self.capacity {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(DispatchRejected::AtCapacity {
                active: self.active.len(),
                capacity: self.capacity,
            });
        }

        let handle = JobHandle {
            id: self.next_id,
            scan_no: job.scan_no,
        };
        match task_tx.try_send(DispatchTask { handle, job }) {
            Ok(()) => {
                self.next_id += 1;
                self.active.insert(handle);
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = handle.id, scan_no = handle.scan_no, "Analysis job dispatched");
                Ok(handle)
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(DispatchRejected::AtCapacity {
                    active: self.active.len(),
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(DispatchRejected::Shutdown),
        }
    }

    /// Remove finished jobs from the active set and return them.
    pub fn reap(&mut self) -> Vec<JobCompletion> {
        self.collect_finished();
        std::mem::take(&mut self.finished)
    }

    /// Wait up to `timeout` for every active job to finish.
    pub fn drain(&mut self, timeout: Duration) -> Vec<JobCompletion> {
        let deadline = Instant::now() + timeout;
        self.collect_finished();
        while !self.active.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(completion) => self.record(completion),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        std::mem::take(&mut self.finished)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            capacity: self.capacity,
            active_jobs: self.active.len(),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work and join idle workers.
    ///
    /// Workers still running a job get up to 2 seconds each; after that
    /// they are detached.
    pub fn shutdown(&mut self) {
        if self.task_tx.take().is_none() {
            return;
        }
        info!("Shutting down analysis dispatcher");

        let worker_count = self.workers.len();
        for (idx, worker) in self.workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(worker_id = idx, "Worker joined"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => warn!(worker_id = idx, "Worker still busy - detaching"),
            }
            drop(join_thread);
        }

        info!(worker_count, "Analysis dispatcher shut down");
    }

    fn collect_finished(&mut self) {
        while let Ok(completion) = self.done_rx.try_recv() {
            self.record(completion);
        }
    }

    fn record(&mut self, completion: JobCompletion) {
        self.active.remove(&completion.handle);
        let elapsed_ms = u64::try_from(completion.elapsed.as_millis()).unwrap_or(u64::MAX);
        match &completion.outcome {
            Ok(report) => info!(
                job_id = completion.handle.id,
                scan_no = completion.handle.scan_no,
                elapsed_ms,
                summary = %report.summary,
                "Analysis complete"
            ),
            Err(e) => warn!(
                job_id = completion.handle.id,
                scan_no = completion.handle.scan_no,
                elapsed_ms,
                error = %e,
                "Analysis failed"
            ),
        }
        self.finished.push(completion);
    }
}

impl<E: AnalysisExecutor> Drop for JobDispatcher<E> {
    fn drop(&mut self) {
        // Drop the sender so idle workers exit; busy ones finish and exit on their own.
        if self.task_tx.take().is_some() {
            debug!("JobDispatcher dropped without explicit shutdown - workers will be detached");
        }
    }
}

fn worker_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn spawn_worker<E: AnalysisExecutor>(
    worker_id: usize,
    rt: Runtime,
    task_rx: Receiver<DispatchTask>,
    done_tx: Sender<JobCompletion>,
    counters: Arc<DispatchCounters>,
    executor: E,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("analysis-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "Analysis worker started");

            // Blocks until work arrives; returns Err once the sender is dropped.
            while let Ok(task) = task_rx.recv() {
                let DispatchTask { handle, job } = task;
                debug!(worker_id, job_id = handle.id, scan_no = handle.scan_no, "Worker executing job");

                let started = Instant::now();
                let outcome = catch_unwind(AssertUnwindSafe(|| rt.block_on(executor.analyse(job))))
                    .unwrap_or_else(|panic| Err(AnalysisError::Panicked(panic_message(panic.as_ref()))));

                if outcome.is_ok() {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }

                let completion = JobCompletion {
                    handle,
                    outcome,
                    elapsed: started.elapsed(),
                };
                if done_tx.send(completion).is_err() {
                    debug!(worker_id, "Dispatcher gone, dropping completion");
                }
            }

            debug!(worker_id, "Analysis worker exiting");
        })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
