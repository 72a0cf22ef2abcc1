//
// state.rs
//
// Registry of documents, projects and unsaved buffers
//

use std::path::PathBuf;

use serde::Deserialize;

use crate::document_store::{DocumentKey, DocumentState, DocumentStore};
use crate::project_parts::{ProjectPartId, ProjectParts};
use crate::time_point::TimePoint;
use crate::unsaved_files::UnsavedFiles;

/// Read-only view of the registry, as consumed by the job queue.
///
/// Absence is a normal answer: a closed document or removed project makes
/// any request that refers to it stale.
pub trait RegistryView {
    /// Look up an open document
    fn document(&self, key: &DocumentKey) -> Option<&DocumentState>;

    /// Current change stamp of a project, or None if it does not exist
    fn project_change_time_point(&self, id: &ProjectPartId) -> Option<TimePoint>;

    /// Current stamp of the global unsaved-files clock
    fn unsaved_files_change_time_point(&self) -> TimePoint;
}

/// Editor notification describing which files the user is looking at
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorActivity {
    /// File in the focused editor
    pub active_path: Option<PathBuf>,
    /// Files shown in any editor split
    #[serde(default)]
    pub visible_paths: Vec<PathBuf>,
}

/// Global registry state
#[derive(Debug, Default)]
pub struct WorldState {
    pub documents: DocumentStore,
    pub projects: ProjectParts,
    pub unsaved_files: UnsavedFiles,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_document(&mut self, key: DocumentKey) {
        if !self.projects.contains(&key.project_part_id) {
            log::debug!(
                "Opening {} before its project part is known; requests stay stale until it is",
                key
            );
        }
        self.documents.open(key);
    }

    /// Record an edit to an open document, returning its new revision
    pub fn update_document(&mut self, key: &DocumentKey) -> Option<u32> {
        self.documents.update(key)
    }

    pub fn close_document(&mut self, key: &DocumentKey) -> bool {
        self.documents.close(key)
    }

    /// Create or reconfigure a project and flag its documents for reparse
    pub fn create_or_update_project(&mut self, id: ProjectPartId, arguments: Vec<String>) -> TimePoint {
        let stamp = self.projects.create_or_update(id.clone(), arguments);
        let affected = self.documents.mark_project_needs_reparse(&id);
        if affected > 0 {
            log::debug!("Project part {} changed; {} documents need reparse", id, affected);
        }
        stamp
    }

    pub fn remove_project(&mut self, id: &ProjectPartId) -> bool {
        self.projects.remove(id)
    }

    pub fn update_unsaved_file(&mut self, file_path: PathBuf, content: String) {
        self.unsaved_files.create_or_update(file_path, content);
    }

    pub fn remove_unsaved_file(&mut self, file_path: &std::path::Path) -> bool {
        self.unsaved_files.remove(file_path)
    }

    /// Apply an editor focus/visibility notification
    pub fn apply_editor_activity(&mut self, activity: EditorActivity) {
        log::trace!(
            "Editor activity: active={:?}, visible={}",
            activity.active_path,
            activity.visible_paths.len()
        );
        self.documents
            .set_used_by_current_editor(activity.active_path.as_deref());
        self.documents.set_visible_in_editors(&activity.visible_paths);
    }
}

impl RegistryView for WorldState {
    fn document(&self, key: &DocumentKey) -> Option<&DocumentState> {
        self.documents.get(key)
    }

    fn project_change_time_point(&self, id: &ProjectPartId) -> Option<TimePoint> {
        self.projects.get(id).map(|part| part.last_change_time_point)
    }

    fn unsaved_files_change_time_point(&self) -> TimePoint {
        self.unsaved_files.last_change_time_point()
    }
}
