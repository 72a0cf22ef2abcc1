//
// jobs/property_tests.rs
//
// Property-based tests for the job queue
//

#![cfg(test)]

use proptest::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;

use super::queue::{DocumentPriority, JobQueue};
use super::request::{JobRequest, JobRequestType};
use crate::document_store::DocumentKey;
use crate::project_parts::ProjectPartId;
use crate::state::{EditorActivity, WorldState};

const DOCUMENT_COUNT: usize = 4;

// ============================================================================
// Generators
// ============================================================================

fn project() -> ProjectPartId {
    ProjectPartId::from("/path/to/projectfile")
}

fn document_path(index: usize) -> PathBuf {
    PathBuf::from(format!("/src/file{}.cpp", index))
}

fn document_key(index: usize) -> DocumentKey {
    DocumentKey::new(document_path(index), project())
}

fn request_type() -> impl Strategy<Value = JobRequestType> {
    prop::sample::select(JobRequestType::ALL.to_vec())
}

/// (document index, kind) pairs
fn requests() -> impl Strategy<Value = Vec<(usize, JobRequestType)>> {
    prop::collection::vec((0..DOCUMENT_COUNT, request_type()), 0..24)
}

/// Optional active document plus a visibility mask
fn activity() -> impl Strategy<Value = (Option<usize>, Vec<bool>)> {
    (
        prop::option::of(0..DOCUMENT_COUNT),
        prop::collection::vec(any::<bool>(), DOCUMENT_COUNT),
    )
}

fn world((active, visible): &(Option<usize>, Vec<bool>)) -> WorldState {
    let mut state = WorldState::new();
    state.create_or_update_project(project(), Vec::new());
    for index in 0..DOCUMENT_COUNT {
        state.open_document(document_key(index));
    }
    state.apply_editor_activity(EditorActivity {
        active_path: active.map(document_path),
        visible_paths: visible
            .iter()
            .enumerate()
            .filter(|(_, shown)| **shown)
            .map(|(index, _)| document_path(index))
            .collect(),
    });
    state
}

fn fill(queue: &mut JobQueue, state: &WorldState, requests: &[(usize, JobRequestType)]) {
    for (index, kind) in requests {
        queue.add(JobRequest::new(*kind, &document_key(*index), state));
    }
}

// ============================================================================
// Queue properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Adding N requests grows the queue by exactly N
    #[test]
    fn prop_add_grows_size(requests in requests()) {
        let state = world(&(None, vec![false; DOCUMENT_COUNT]));
        let mut queue = JobQueue::default();
        fill(&mut queue, &state, &requests);
        prop_assert_eq!(queue.size(), requests.len());
    }

    /// A single pass never hands out two requests for one document
    #[test]
    fn prop_one_request_per_document_per_pass(
        requests in requests(),
        activity in activity(),
    ) {
        let state = world(&activity);
        let mut queue = JobQueue::default();
        fill(&mut queue, &state, &requests);

        let batch = queue.process_queue(&state);

        let distinct: HashSet<DocumentKey> = batch.iter().map(|r| r.key()).collect();
        prop_assert_eq!(distinct.len(), batch.len());
        prop_assert_eq!(batch.len() + queue.size(), requests.len());
    }

    /// Nothing is handed out for a document whose job is executing
    #[test]
    fn prop_running_documents_are_skipped(
        requests in requests(),
        running in 0..DOCUMENT_COUNT,
    ) {
        let state = world(&(None, vec![false; DOCUMENT_COUNT]));
        let mut queue = JobQueue::default();
        let running_path = document_path(running);
        queue.set_is_job_running_handler(move |path, _| path == running_path.as_path());
        fill(&mut queue, &state, &requests);

        let batch = queue.process_queue(&state);

        prop_assert!(batch.iter().all(|r| r.file_path != document_path(running)));
        let held = requests.iter().filter(|(index, _)| *index == running).count();
        prop_assert_eq!(
            queue.queue().iter().filter(|r| r.file_path == document_path(running)).count(),
            held
        );
    }

    /// Prioritizing twice yields the same order as prioritizing once
    #[test]
    fn prop_prioritize_idempotent(requests in requests(), activity in activity()) {
        let state = world(&activity);
        let mut queue = JobQueue::default();
        fill(&mut queue, &state, &requests);

        queue.prioritize_requests(&state);
        let once = queue.queue().to_vec();
        queue.prioritize_requests(&state);

        prop_assert_eq!(queue.queue(), once.as_slice());
    }

    /// After prioritization, priorities are non-decreasing along the queue
    #[test]
    fn prop_prioritize_orders_by_editor_activity(
        requests in requests(),
        activity in activity(),
    ) {
        let state = world(&activity);
        let mut queue = JobQueue::default();
        fill(&mut queue, &state, &requests);

        queue.prioritize_requests(&state);

        let priorities: Vec<DocumentPriority> = queue
            .queue()
            .iter()
            .map(|r| JobQueue::priority(r, &state))
            .collect();
        prop_assert!(priorities.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    /// Completion requests survive edits and unsaved-buffer changes
    #[test]
    fn prop_completion_survives_edits(edits in 1..5usize, buffers in 0..3usize) {
        let mut state = world(&(Some(0), vec![true; DOCUMENT_COUNT]));
        let mut queue = JobQueue::default();
        queue.add(JobRequest::new(JobRequestType::CompleteCode, &document_key(0), &state));
        queue.add(JobRequest::new(
            JobRequestType::UpdateDocumentAnnotations,
            &document_key(0),
            &state,
        ));

        for _ in 0..edits {
            state.update_document(&document_key(0));
        }
        for index in 0..buffers {
            state.update_unsaved_file(document_path(index), String::from("int x;"));
        }

        let batch = queue.process_queue(&state);

        prop_assert_eq!(batch.len(), 1);
        prop_assert_eq!(batch[0].request_type, JobRequestType::CompleteCode);
        prop_assert!(queue.is_empty());
    }
}
