//
// jobs/request.rs
//
// Job requests and the per-kind staleness policy
//

use std::fmt;
use std::path::PathBuf;

use crate::document_store::DocumentKey;
use crate::project_parts::ProjectPartId;
use crate::state::RegistryView;
use crate::time_point::TimePoint;

/// Kind of analysis a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobRequestType {
    /// Reparse and publish fresh annotations after an edit
    UpdateDocumentAnnotations,
    /// Publish annotations for the current parse on demand
    RequestDocumentAnnotations,
    /// Compute completions at a cursor position
    CompleteCode,
    /// Build the preamble for a newly opened document
    CreateInitialDocumentPreamble,
}

impl JobRequestType {
    pub const ALL: [JobRequestType; 4] = [
        JobRequestType::UpdateDocumentAnnotations,
        JobRequestType::RequestDocumentAnnotations,
        JobRequestType::CompleteCode,
        JobRequestType::CreateInitialDocumentPreamble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateDocumentAnnotations => "UpdateDocumentAnnotations",
            Self::RequestDocumentAnnotations => "RequestDocumentAnnotations",
            Self::CompleteCode => "CompleteCode",
            Self::CreateInitialDocumentPreamble => "CreateInitialDocumentPreamble",
        }
    }

    /// Staleness checks that apply to this kind
    pub fn requirements(self) -> Requirements {
        requirements_for_type(self)
    }

    /// Whether a successful run leaves the document freshly parsed
    pub fn produces_parse(self) -> bool {
        matches!(
            self,
            Self::UpdateDocumentAnnotations | Self::CreateInitialDocumentPreamble
        )
    }
}

impl fmt::Display for JobRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// Snapshot comparisons a request must pass to still be worth running.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Requirements: u8 {
        /// The document is still open
        const DOCUMENT_OPEN = 1 << 0;
        /// The project part still exists
        const PROJECT_EXISTS = 1 << 1;
        /// The project part has not changed since the snapshot
        const CURRENT_PROJECT_PART = 1 << 2;
        /// The document has not been edited since the snapshot
        const CURRENT_DOCUMENT_REVISION = 1 << 3;
        /// No unsaved buffer has changed since the snapshot
        const CURRENT_UNSAVED_FILES = 1 << 4;
        /// The document's last parse did not fail
        const DOCUMENT_INTACT = 1 << 5;
    }
}

const ALWAYS: Requirements = Requirements::DOCUMENT_OPEN
    .union(Requirements::PROJECT_EXISTS)
    .union(Requirements::DOCUMENT_INTACT);

const ANNOTATIONS: Requirements = ALWAYS
    .union(Requirements::CURRENT_PROJECT_PART)
    .union(Requirements::CURRENT_DOCUMENT_REVISION)
    .union(Requirements::CURRENT_UNSAVED_FILES);

const PREAMBLE: Requirements = ALWAYS.union(Requirements::CURRENT_PROJECT_PART);

/// Staleness policy, one row per request kind.
///
/// Completion is only cancelled by a closed document, a missing project or a
/// broken parse: the live buffer is exactly what it should complete against.
pub const REQUIREMENTS_TABLE: [(JobRequestType, Requirements); 4] = [
    (JobRequestType::UpdateDocumentAnnotations, ANNOTATIONS),
    (JobRequestType::RequestDocumentAnnotations, ANNOTATIONS),
    (JobRequestType::CompleteCode, ALWAYS),
    (JobRequestType::CreateInitialDocumentPreamble, PREAMBLE),
];

/// Look up the staleness checks for a request kind
pub fn requirements_for_type(request_type: JobRequestType) -> Requirements {
    REQUIREMENTS_TABLE[table_row(request_type)].1
}

fn table_row(request_type: JobRequestType) -> usize {
    match request_type {
        JobRequestType::UpdateDocumentAnnotations => 0,
        JobRequestType::RequestDocumentAnnotations => 1,
        JobRequestType::CompleteCode => 2,
        JobRequestType::CreateInitialDocumentPreamble => 3,
    }
}

/// The first check a stale request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    DocumentClosed,
    ProjectDoesNotExist,
    CurrentProjectPartChanged,
    CurrentDocumentRevisionChanged,
    CurrentUnsavedFilesChanged,
    DocumentNotIntact,
}

/// A scheduled unit of work.
///
/// The snapshot fields record registry state at enqueue time and are never
/// updated afterwards; staleness is judged by comparing them to live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub request_type: JobRequestType,
    pub file_path: PathBuf,
    pub project_part_id: ProjectPartId,
    pub document_revision: u32,
    /// Open stamp of the document copy the request was made for
    pub document_opened_at: TimePoint,
    pub unsaved_files_change_time_point: TimePoint,
    pub project_change_time_point: TimePoint,
    pub requirements: Requirements,

    // Completion position and the ticket echoed back with its result
    pub line: u32,
    pub column: u32,
    pub ticket_number: u64,
}

impl JobRequest {
    /// Create a request stamped with the registry's current state.
    ///
    /// A document or project that does not exist yet is stamped with zero
    /// values; such a request is stale until it appears.
    pub fn new<R>(request_type: JobRequestType, key: &DocumentKey, registry: &R) -> Self
    where
        R: RegistryView + ?Sized,
    {
        let (document_revision, document_opened_at) = registry
            .document(key)
            .map(|state| (state.document_revision, state.opened_at))
            .unwrap_or((0, TimePoint::origin()));
        let project_change_time_point = registry
            .project_change_time_point(&key.project_part_id)
            .unwrap_or_else(TimePoint::origin);

        Self {
            request_type,
            file_path: key.file_path.clone(),
            project_part_id: key.project_part_id.clone(),
            document_revision,
            document_opened_at,
            unsaved_files_change_time_point: registry.unsaved_files_change_time_point(),
            project_change_time_point,
            requirements: requirements_for_type(request_type),
            line: 0,
            column: 0,
            ticket_number: 0,
        }
    }

    /// Attach a completion position and ticket
    pub fn with_completion_position(mut self, line: u32, column: u32, ticket_number: u64) -> Self {
        self.line = line;
        self.column = column;
        self.ticket_number = ticket_number;
        self
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.file_path.clone(), self.project_part_id.clone())
    }

    /// Whether this request targets the given document
    pub fn is_for(&self, key: &DocumentKey) -> bool {
        self.file_path == key.file_path && self.project_part_id == key.project_part_id
    }

    /// Check the request against live registry state.
    ///
    /// Returns the first failed check, or None if the request is still worth
    /// running.
    pub fn staleness<R>(&self, registry: &R) -> Option<Staleness>
    where
        R: RegistryView + ?Sized,
    {
        let requirements = self.requirements;

        if requirements.intersects(
            Requirements::DOCUMENT_OPEN
                | Requirements::DOCUMENT_INTACT
                | Requirements::CURRENT_DOCUMENT_REVISION,
        ) {
            let key = self.key();
            let Some(document) = registry.document(&key) else {
                return requirements
                    .contains(Requirements::DOCUMENT_OPEN)
                    .then_some(Staleness::DocumentClosed);
            };

            if requirements.contains(Requirements::DOCUMENT_INTACT) && !document.is_intact() {
                return Some(Staleness::DocumentNotIntact);
            }

            // Revisions restart when a document is re-opened, so any difference counts
            if requirements.contains(Requirements::CURRENT_DOCUMENT_REVISION)
                && document.document_revision != self.document_revision
            {
                return Some(Staleness::CurrentDocumentRevisionChanged);
            }
        }

        if requirements.contains(Requirements::CURRENT_UNSAVED_FILES)
            && registry
                .unsaved_files_change_time_point()
                .is_after(self.unsaved_files_change_time_point)
        {
            return Some(Staleness::CurrentUnsavedFilesChanged);
        }

        if requirements
            .intersects(Requirements::PROJECT_EXISTS | Requirements::CURRENT_PROJECT_PART)
        {
            match registry.project_change_time_point(&self.project_part_id) {
                None if requirements.contains(Requirements::PROJECT_EXISTS) => {
                    return Some(Staleness::ProjectDoesNotExist);
                }
                None => {}
                Some(live) => {
                    if requirements.contains(Requirements::CURRENT_PROJECT_PART)
                        && live.is_after(self.project_change_time_point)
                    {
                        return Some(Staleness::CurrentProjectPartChanged);
                    }
                }
            }
        }

        None
    }
}

impl fmt::Display for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for {} [{}] at revision {}",
            self.request_type,
            self.file_path.display(),
            self.project_part_id,
            self.document_revision
        )
    }
}
