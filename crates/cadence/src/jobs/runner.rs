//! Job runner for dispatched requests.
//!
//! Connects the [`JobQueue`] to an [`AnalysisBackend`]. The runner owns the
//! table of executing jobs and hands the queue an `is_job_running` oracle
//! backed by that table, so a document never has two jobs in flight.
//!
//! # Design
//! - A document is marked running while the queue lock is still held, before
//!   its task is spawned, so concurrent passes cannot pick it again
//! - Jobs execute as tokio tasks, bounded by a semaphore
//! - Finished jobs update the registry, publish a [`JobOutcome`], then wake
//!   the dispatcher so queued follow-ups for the same document can run
//! - Cancellation is cooperative via a shared token

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::document_store::DocumentKey;
use crate::jobs::config::SchedulerConfig;
use crate::jobs::queue::JobQueue;
use crate::jobs::request::{JobRequest, JobRequestType};
use crate::perf::{JobTimings, Stopwatch};
use crate::state::WorldState;

/// Jobs slower than this are reported in verbose perf mode
const SLOW_JOB_BUDGET: Duration = Duration::from_millis(500);

/// Failure of a single job
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The parser could not produce a translation unit
    #[error("parse failed for {path:?}: {message}")]
    ParseFailed { path: PathBuf, message: String },

    /// The runner shut down before the job finished
    #[error("job cancelled")]
    Cancelled,

    /// Any other backend failure
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// What a successful job produced.
///
/// Payloads (tokens, completion items) stay with the backend; the runner only
/// needs enough to route the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    /// Annotations were computed for this document revision
    DocumentAnnotations { revision: u32 },
    /// The preamble was built
    Preamble,
    /// Completions were computed for the request with this ticket
    Completions { ticket_number: u64, count: usize },
}

/// The analysis engine the runner executes requests against
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn run(&self, request: &JobRequest) -> Result<JobOutput, AnalysisError>;
}

/// A finished job, published on the outcome channel
#[derive(Debug)]
pub struct JobOutcome {
    pub request: JobRequest,
    pub result: Result<JobOutput, AnalysisError>,
    pub elapsed: Duration,
}

/// Entry in the table of executing jobs
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub request_type: JobRequestType,
    pub started_at: Instant,
}

struct Shared {
    state: Arc<RwLock<WorldState>>,
    backend: Arc<dyn AnalysisBackend>,
    queue: Mutex<JobQueue>,
    running: Arc<DashMap<DocumentKey, RunningJob>>,
    permits: Semaphore,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
    wakeup: Notify,
    timings: JobTimings,
    cancellation_token: CancellationToken,
}

/// Runs queued job requests against an analysis backend
pub struct Jobs {
    shared: Arc<Shared>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Jobs {
    /// Create a runner and the receiver its outcomes are published on.
    ///
    /// The runner starts in manual mode: nothing is dispatched until
    /// [`Jobs::process`] is called or [`Jobs::spawn_dispatcher`] starts the
    /// background loop.
    pub fn new(
        state: Arc<RwLock<WorldState>>,
        backend: Arc<dyn AnalysisBackend>,
        config: SchedulerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<JobOutcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        let running: Arc<DashMap<DocumentKey, RunningJob>> = Arc::new(DashMap::new());

        let mut queue = JobQueue::new(config.clone());
        let oracle = running.clone();
        queue.set_is_job_running_handler(move |file_path, project_part_id| {
            oracle.contains_key(&DocumentKey::new(file_path, project_part_id.clone()))
        });

        log::info!(
            "Job runner created (max_concurrent_jobs={}, max_batch_size={:?}, defer_hidden_documents={})",
            config.max_concurrent_jobs,
            config.max_batch_size,
            config.defer_hidden_documents
        );

        let shared = Arc::new(Shared {
            state,
            backend,
            queue: Mutex::new(queue),
            running,
            permits: Semaphore::new(config.max_concurrent_jobs.max(1)),
            outcomes,
            wakeup: Notify::new(),
            timings: JobTimings::new(),
            cancellation_token: CancellationToken::new(),
        });

        let jobs = Self {
            shared,
            worker_handle: Mutex::new(None),
        };
        (jobs, receiver)
    }

    /// Start a background loop that processes the queue whenever a request
    /// is added or a job finishes
    pub fn spawn_dispatcher(&self) {
        let mut worker_handle = lock(&self.worker_handle);
        if worker_handle.is_some() {
            return;
        }

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            log::info!("Job dispatcher started");
            loop {
                tokio::select! {
                    _ = shared.cancellation_token.cancelled() => {
                        log::info!("Job dispatcher stopped");
                        break;
                    }
                    _ = shared.wakeup.notified() => {
                        shared.dispatch().await;
                    }
                }
            }
        });

        *worker_handle = Some(handle);
        // Pick up anything queued before the loop existed
        self.shared.wakeup.notify_one();
    }

    /// Queue a request
    pub fn add(&self, request: JobRequest) {
        lock(&self.shared.queue).add(request);
        self.shared.wakeup.notify_one();
    }

    /// Queue a request stamped with the registry's current state
    pub async fn enqueue(&self, request_type: JobRequestType, key: &DocumentKey) -> JobRequest {
        let request = {
            let state = self.shared.state.read().await;
            JobRequest::new(request_type, key, &*state)
        };
        self.add(request.clone());
        request
    }

    /// Process the queue once and start every dispatchable request.
    ///
    /// Returns the requests that were started.
    pub async fn process(&self) -> Vec<JobRequest> {
        self.shared.dispatch().await
    }

    pub fn is_job_running(&self, key: &DocumentKey) -> bool {
        self.shared.running.contains_key(key)
    }

    /// Documents with a job currently executing
    pub fn running_jobs(&self) -> Vec<DocumentKey> {
        self.shared
            .running
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn queue_size(&self) -> usize {
        lock(&self.shared.queue).size()
    }

    pub fn queued_requests(&self) -> Vec<JobRequest> {
        lock(&self.shared.queue).queue().to_vec()
    }

    /// Durations of finished jobs, per request kind
    pub fn timings(&self) -> &JobTimings {
        &self.shared.timings
    }

    pub fn state(&self) -> Arc<RwLock<WorldState>> {
        self.shared.state.clone()
    }

    /// Stop dispatching and cancel executing jobs
    pub fn shutdown(&self) {
        if self.shared.cancellation_token.is_cancelled() {
            return;
        }
        log::info!("Shutting down job runner");
        self.shared.cancellation_token.cancel();

        if let Some(handle) = lock(&self.worker_handle).take() {
            handle.abort();
        }
    }
}

impl Drop for Jobs {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    async fn dispatch(self: &Arc<Self>) -> Vec<JobRequest> {
        if self.cancellation_token.is_cancelled() {
            return Vec::new();
        }

        let stopwatch = Stopwatch::start("process_queue");
        let jobs_to_run = {
            let state = self.state.read().await;
            let mut queue = lock(&self.queue);
            let jobs_to_run = queue.process_queue(&*state);

            let started_at = Instant::now();
            for request in &jobs_to_run {
                self.running.insert(
                    request.key(),
                    RunningJob {
                        request_type: request.request_type,
                        started_at,
                    },
                );
            }
            jobs_to_run
        };
        stopwatch.stop();

        for request in &jobs_to_run {
            log::trace!("Starting {}", request);
            tokio::spawn(self.clone().execute_job(request.clone()));
        }

        jobs_to_run
    }

    async fn execute_job(self: Arc<Self>, request: JobRequest) {
        let key = request.key();
        let stopwatch = Stopwatch::start(request.request_type.as_str()).with_budget(SLOW_JOB_BUDGET);

        let result = tokio::select! {
            _ = self.cancellation_token.cancelled() => Err(AnalysisError::Cancelled),
            result = self.run_with_permit(&request) => result,
        };
        let elapsed = stopwatch.stop();
        self.timings.record(request.request_type, elapsed);

        self.apply_result(&key, &request, &result).await;
        self.running.remove(&key);

        match &result {
            Ok(output) => log::trace!("Finished {} in {:?}: {:?}", request, elapsed, output),
            Err(AnalysisError::Cancelled) => log::debug!("Cancelled {}", request),
            Err(e) => log::warn!("{} failed: {}", request, e),
        }

        if self
            .outcomes
            .send(JobOutcome {
                request,
                result,
                elapsed,
            })
            .is_err()
        {
            log::trace!("Job outcome receiver dropped");
        }

        self.wakeup.notify_one();
    }

    async fn run_with_permit(&self, request: &JobRequest) -> Result<JobOutput, AnalysisError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AnalysisError::Cancelled)?;
        self.backend.run(request).await
    }

    /// Record what the job learned about its document.
    ///
    /// Skipped when the copy the job ran for was closed, even if the same key
    /// has been opened again since.
    async fn apply_result(
        &self,
        key: &DocumentKey,
        request: &JobRequest,
        result: &Result<JobOutput, AnalysisError>,
    ) {
        let parsed = result.is_ok() && request.request_type.produces_parse();
        let parse_failed = matches!(result, Err(AnalysisError::ParseFailed { .. }));
        if !parsed && !parse_failed {
            return;
        }

        let mut state = self.state.write().await;
        if !state.documents.is_open_since(key, request.document_opened_at) {
            log::trace!("Document {} was closed while its job ran", key);
            return;
        }

        if parsed {
            state.documents.mark_parsed(key, request.document_revision);
        } else {
            state.documents.set_has_parse_or_reparse_failed(key, true);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("Recovering from poisoned job runner lock");
        poisoned.into_inner()
    })
}
