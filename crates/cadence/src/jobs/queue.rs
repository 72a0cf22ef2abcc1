//
// jobs/queue.rs
//
// Pending job requests: staleness pruning, prioritization and dispatch
//

use std::collections::HashSet;
use std::path::Path;

use crate::document_store::DocumentKey;
use crate::jobs::config::SchedulerConfig;
use crate::jobs::request::JobRequest;
use crate::project_parts::ProjectPartId;
use crate::state::RegistryView;

/// Oracle answering whether a job is executing for a document
pub type IsJobRunningHandler = Box<dyn Fn(&Path, &ProjectPartId) -> bool + Send + Sync>;

/// Priority of a request's document (lower = higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DocumentPriority {
    /// Shown in the focused editor
    CurrentEditor = 0,
    /// Shown in some editor split
    Visible = 1,
    /// Open but not shown, or not open at all
    Hidden = 2,
}

/// Queue of pending job requests.
///
/// The queue never owns registry or execution state. Registry state is read
/// through a [`RegistryView`] passed to each call, and whether a document
/// already has a job executing is asked of the injected handler. All calls
/// are synchronous and must be serialized by the caller.
pub struct JobQueue {
    queue: Vec<JobRequest>,
    is_job_running: IsJobRunningHandler,
    config: SchedulerConfig,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Create an empty queue whose handler reports nothing running
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            queue: Vec::new(),
            is_job_running: Box::new(|_, _| false),
            config,
        }
    }

    /// Append a request. No filtering or duplicate suppression happens here.
    pub fn add(&mut self, request: JobRequest) {
        log::trace!("Queueing {}", request);
        self.queue.push(request);
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending requests in current order
    pub fn queue(&self) -> &[JobRequest] {
        &self.queue
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Install the oracle that reports whether a document has a job executing
    pub fn set_is_job_running_handler<F>(&mut self, handler: F)
    where
        F: Fn(&Path, &ProjectPartId) -> bool + Send + Sync + 'static,
    {
        self.is_job_running = Box::new(handler);
    }

    /// Stable sort: current editor document first, then visible, then the rest
    pub fn prioritize_requests<R>(&mut self, registry: &R)
    where
        R: RegistryView + ?Sized,
    {
        self.queue
            .sort_by_cached_key(|request| Self::priority(request, registry));
    }

    /// Prune stale requests, prioritize, and take the batch that can run now.
    ///
    /// A request stays queued if its document already has a job executing,
    /// or if an earlier request for the same document was taken in this pass.
    /// Never fails; returns an empty batch when nothing is eligible.
    pub fn process_queue<R>(&mut self, registry: &R) -> Vec<JobRequest>
    where
        R: RegistryView + ?Sized,
    {
        self.remove_outdated_requests(registry);
        self.prioritize_requests(registry);
        let jobs_to_run = self.take_jobs_to_run(registry);

        log::debug!(
            "Processed job queue: {} to run, {} still queued",
            jobs_to_run.len(),
            self.queue.len()
        );
        jobs_to_run
    }

    /// Priority of the document a request targets
    pub fn priority<R>(request: &JobRequest, registry: &R) -> DocumentPriority
    where
        R: RegistryView + ?Sized,
    {
        match registry.document(&request.key()) {
            Some(state) if state.is_used_by_current_editor => DocumentPriority::CurrentEditor,
            Some(state) if state.is_visible_in_editor => DocumentPriority::Visible,
            _ => DocumentPriority::Hidden,
        }
    }

    fn remove_outdated_requests<R>(&mut self, registry: &R)
    where
        R: RegistryView + ?Sized,
    {
        self.queue.retain(|request| match request.staleness(registry) {
            Some(reason) => {
                log::trace!("Dropping outdated request {} ({:?})", request, reason);
                false
            }
            None => true,
        });
    }

    fn take_jobs_to_run<R>(&mut self, registry: &R) -> Vec<JobRequest>
    where
        R: RegistryView + ?Sized,
    {
        let max_batch_size = self.config.max_batch_size.unwrap_or(usize::MAX);
        let mut taken_documents: HashSet<DocumentKey> = HashSet::new();
        let mut jobs_to_run = Vec::new();
        let mut remaining = Vec::with_capacity(self.queue.len());

        for request in self.queue.drain(..) {
            if jobs_to_run.len() >= max_batch_size {
                remaining.push(request);
                continue;
            }

            let key = request.key();
            if taken_documents.contains(&key) {
                remaining.push(request);
                continue;
            }

            if (self.is_job_running)(&request.file_path, &request.project_part_id) {
                log::trace!("Job already running for {}, keeping {} queued", key, request);
                remaining.push(request);
                continue;
            }

            if self.config.defer_hidden_documents
                && Self::priority(&request, registry) == DocumentPriority::Hidden
            {
                remaining.push(request);
                continue;
            }

            taken_documents.insert(key);
            jobs_to_run.push(request);
        }

        self.queue = remaining;
        jobs_to_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::request::JobRequestType;
    use crate::state::WorldState;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FILE_1: &str = "/src/translationunits.cpp";
    const FILE_2: &str = "/src/skippedsourceranges.cpp";

    fn project() -> ProjectPartId {
        ProjectPartId::from("/path/to/projectfile")
    }

    fn key(path: &str) -> DocumentKey {
        DocumentKey::new(path, project())
    }

    fn setup() -> WorldState {
        let mut state = WorldState::new();
        state.create_or_update_project(project(), Vec::new());
        state.open_document(key(FILE_1));
        state.open_document(key(FILE_2));
        state
    }

    fn request(state: &WorldState, path: &str, kind: JobRequestType) -> JobRequest {
        JobRequest::new(kind, &key(path), state)
    }

    #[test]
    fn test_default_handler_reports_nothing_running() {
        let state = setup();
        let mut queue = JobQueue::default();
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));
        queue.add(request(&state, FILE_2, JobRequestType::CompleteCode));

        assert_eq!(queue.process_queue(&state).len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_batch_preserves_priority_order() {
        let mut state = setup();
        let mut queue = JobQueue::default();
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));
        queue.add(request(&state, FILE_2, JobRequestType::CompleteCode));
        state
            .documents
            .set_used_by_current_editor(Some(Path::new(FILE_2)));

        let batch = queue.process_queue(&state);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].file_path, PathBuf::from(FILE_2));
        assert_eq!(batch[1].file_path, PathBuf::from(FILE_1));
    }

    #[test]
    fn test_prioritize_is_stable_within_priority() {
        let state = setup();
        let mut queue = JobQueue::default();
        let first = request(&state, FILE_1, JobRequestType::UpdateDocumentAnnotations);
        let second = request(&state, FILE_2, JobRequestType::RequestDocumentAnnotations);
        let third = request(&state, FILE_1, JobRequestType::CompleteCode);
        queue.add(first.clone());
        queue.add(second.clone());
        queue.add(third.clone());

        queue.prioritize_requests(&state);

        assert_eq!(queue.queue(), &[first, second, third]);
    }

    #[test]
    fn test_oracle_consulted_with_request_identity() {
        let state = setup();
        let mut queue = JobQueue::default();
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));
        queue.add(request(&state, FILE_2, JobRequestType::CompleteCode));

        queue.set_is_job_running_handler(|path, project_part_id| {
            path == Path::new(FILE_1) && project_part_id.as_str() == "/path/to/projectfile"
        });

        let batch = queue.process_queue(&state);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].file_path, PathBuf::from(FILE_2));
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.queue()[0].file_path, PathBuf::from(FILE_1));
    }

    #[test]
    fn test_oracle_not_consulted_for_second_request_of_taken_document() {
        let state = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut queue = JobQueue::default();
        let counter = calls.clone();
        queue.set_is_job_running_handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));

        queue.process_queue(&state);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defer_hidden_documents() {
        let mut state = setup();
        state
            .documents
            .set_visible_in_editors(&[PathBuf::from(FILE_2)]);
        let mut queue = JobQueue::new(SchedulerConfig {
            defer_hidden_documents: true,
            ..SchedulerConfig::default()
        });
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));
        queue.add(request(&state, FILE_2, JobRequestType::CompleteCode));

        let batch = queue.process_queue(&state);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].file_path, PathBuf::from(FILE_2));
        assert_eq!(queue.size(), 1);

        // Once the document becomes visible it is dispatched
        state
            .documents
            .set_visible_in_editors(&[PathBuf::from(FILE_1)]);
        assert_eq!(queue.process_queue(&state).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_max_batch_size() {
        let state = setup();
        let mut queue = JobQueue::new(SchedulerConfig {
            max_batch_size: Some(1),
            ..SchedulerConfig::default()
        });
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));
        queue.add(request(&state, FILE_2, JobRequestType::CompleteCode));

        let batch = queue.process_queue(&state);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].file_path, PathBuf::from(FILE_1));
        assert_eq!(queue.queue()[0].file_path, PathBuf::from(FILE_2));
    }

    #[test]
    fn test_priority_of_closed_document_is_hidden() {
        let mut state = setup();
        state
            .documents
            .set_used_by_current_editor(Some(Path::new(FILE_1)));
        let req = request(&state, FILE_1, JobRequestType::CompleteCode);
        assert_eq!(JobQueue::priority(&req, &state), DocumentPriority::CurrentEditor);

        state.close_document(&key(FILE_1));
        assert_eq!(JobQueue::priority(&req, &state), DocumentPriority::Hidden);
    }

    #[test]
    fn test_stale_requests_pruned_even_when_document_running() {
        let mut state = setup();
        let mut queue = JobQueue::default();
        queue.set_is_job_running_handler(|_, _| true);
        queue.add(request(&state, FILE_1, JobRequestType::UpdateDocumentAnnotations));
        queue.add(request(&state, FILE_1, JobRequestType::CompleteCode));

        state.update_document(&key(FILE_1));
        let batch = queue.process_queue(&state);

        assert!(batch.is_empty());
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.queue()[0].request_type, JobRequestType::CompleteCode);
    }
}
