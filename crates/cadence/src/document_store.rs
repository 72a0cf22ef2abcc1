//
// document_store.rs
//
// Registry of open documents with editor and parse flags
//

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::project_parts::ProjectPartId;
use crate::time_point::TimePoint;

// ============================================================================
// Document Identity
// ============================================================================

/// Identity of an open document.
///
/// The same file may be open under more than one project part; each pairing
/// is a separate document with its own revision and parse state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub file_path: PathBuf,
    pub project_part_id: ProjectPartId,
}

impl DocumentKey {
    pub fn new(file_path: impl Into<PathBuf>, project_part_id: impl Into<ProjectPartId>) -> Self {
        Self {
            file_path: file_path.into(),
            project_part_id: project_part_id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.file_path.display(), self.project_part_id)
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Counters for DocumentStore activity
#[derive(Debug, Clone, Default)]
pub struct DocumentStoreMetrics {
    /// Total number of documents opened (re-opens included)
    pub documents_opened: u64,
    /// Total number of documents closed
    pub documents_closed: u64,
    /// Total number of edits applied
    pub documents_updated: u64,
    /// Number of parse failures recorded
    pub parse_failures: u64,
}

// ============================================================================
// Document State
// ============================================================================

/// State the scheduler reads for an open document
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub key: DocumentKey,
    /// Stamp taken when this copy of the document was opened; a re-open gets a new one
    pub opened_at: TimePoint,
    /// Edit counter, incremented on every update
    pub document_revision: u32,
    /// Shown in some editor split
    pub is_visible_in_editor: bool,
    /// Shown in the editor that has focus
    pub is_used_by_current_editor: bool,
    /// The most recent parse or reparse failed
    pub has_parse_or_reparse_failed: bool,
    /// Edited (or its project changed) since the last successful parse
    pub needs_reparse: bool,
    /// When the last successful parse finished
    pub last_parse_time_point: Option<TimePoint>,
}

impl DocumentState {
    fn new(key: DocumentKey) -> Self {
        Self {
            key,
            opened_at: TimePoint::now(),
            document_revision: 0,
            is_visible_in_editor: false,
            is_used_by_current_editor: false,
            has_parse_or_reparse_failed: false,
            needs_reparse: true,
            last_parse_time_point: None,
        }
    }

    /// A document is intact while its last parse did not fail
    pub fn is_intact(&self) -> bool {
        !self.has_parse_or_reparse_failed
    }
}

// ============================================================================
// Document Store
// ============================================================================

/// Store for open documents.
///
/// Documents are kept in open order. All mutations are visible to the next
/// read; a closed document is simply absent.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: IndexMap<DocumentKey, DocumentState>,
    metrics: DocumentStoreMetrics,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document.
    ///
    /// Re-opening an already open document starts it over at revision 0 but
    /// keeps its editor flags, since the editor still shows it.
    pub fn open(&mut self, key: DocumentKey) -> &DocumentState {
        self.metrics.documents_opened += 1;

        let mut state = DocumentState::new(key.clone());
        if let Some(previous) = self.documents.get(&key) {
            log::trace!("Re-opening document {}", key);
            state.is_visible_in_editor = previous.is_visible_in_editor;
            state.is_used_by_current_editor = previous.is_used_by_current_editor;
        } else {
            log::trace!("Opening document {}", key);
        }

        let (index, _) = self.documents.insert_full(key, state);
        &self.documents[index]
    }

    /// Record an edit. Returns the new revision, or None if the document is not open.
    pub fn update(&mut self, key: &DocumentKey) -> Option<u32> {
        let Some(state) = self.documents.get_mut(key) else {
            log::trace!("Ignoring update for document that is not open: {}", key);
            return None;
        };

        state.document_revision = state.document_revision.wrapping_add(1);
        state.needs_reparse = true;
        self.metrics.documents_updated += 1;

        log::trace!("Document {} now at revision {}", key, state.document_revision);
        Some(state.document_revision)
    }

    /// Close a document. Returns false if it was not open.
    pub fn close(&mut self, key: &DocumentKey) -> bool {
        let removed = self.documents.shift_remove(key).is_some();
        if removed {
            self.metrics.documents_closed += 1;
            log::trace!("Closed document {}", key);
        }
        removed
    }

    pub fn get(&self, key: &DocumentKey) -> Option<&DocumentState> {
        self.documents.get(key)
    }

    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.documents.contains_key(key)
    }

    /// Whether the document is open and is the same copy that was opened at `opened_at`
    pub fn is_open_since(&self, key: &DocumentKey, opened_at: TimePoint) -> bool {
        self.documents
            .get(key)
            .is_some_and(|state| state.opened_at == opened_at)
    }

    /// Replace the set of visible files.
    ///
    /// Visibility is per file path; every project's document for a listed
    /// path becomes visible, everything else becomes invisible.
    pub fn set_visible_in_editors(&mut self, file_paths: &[PathBuf]) {
        for state in self.documents.values_mut() {
            state.is_visible_in_editor = file_paths.contains(&state.key.file_path);
        }
    }

    /// Mark the file shown in the focused editor, or none.
    pub fn set_used_by_current_editor(&mut self, file_path: Option<&Path>) {
        for state in self.documents.values_mut() {
            state.is_used_by_current_editor = Some(state.key.file_path.as_path()) == file_path;
        }
    }

    /// Set or clear the parse-failed flag. Returns false if the document is not open.
    pub fn set_has_parse_or_reparse_failed(&mut self, key: &DocumentKey, failed: bool) -> bool {
        let Some(state) = self.documents.get_mut(key) else {
            return false;
        };
        if failed && !state.has_parse_or_reparse_failed {
            self.metrics.parse_failures += 1;
        }
        state.has_parse_or_reparse_failed = failed;
        true
    }

    /// Record a successful parse of `parsed_revision`.
    ///
    /// The document stays flagged for reparse if it was edited since that
    /// revision. Returns false if the document is not open.
    pub fn mark_parsed(&mut self, key: &DocumentKey, parsed_revision: u32) -> bool {
        let Some(state) = self.documents.get_mut(key) else {
            return false;
        };
        state.has_parse_or_reparse_failed = false;
        state.needs_reparse = state.document_revision != parsed_revision;
        state.last_parse_time_point = Some(TimePoint::now());
        true
    }

    /// Flag every document of a project for reparse (its configuration changed)
    pub fn mark_project_needs_reparse(&mut self, project_part_id: &ProjectPartId) -> usize {
        let mut count = 0;
        for state in self.documents.values_mut() {
            if &state.key.project_part_id == project_part_id {
                state.needs_reparse = true;
                count += 1;
            }
        }
        count
    }

    /// Keys of all open documents, in open order
    pub fn keys(&self) -> Vec<DocumentKey> {
        self.documents.keys().cloned().collect()
    }

    /// Documents that were edited since their last successful parse
    pub fn documents_needing_reparse(&self) -> Vec<DocumentKey> {
        self.documents
            .values()
            .filter(|state| state.needs_reparse)
            .map(|state| state.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn metrics(&self) -> &DocumentStoreMetrics {
        &self.metrics
    }
}
