//
// project_parts.rs
//
// Registry of project configurations
//

use std::collections::HashMap;
use std::fmt;

use crate::time_point::TimePoint;

/// Identity of a project part (one compiler configuration)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ProjectPartId(String);

impl ProjectPartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectPartId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProjectPartId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProjectPartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A project configuration known to the registry
#[derive(Debug, Clone)]
pub struct ProjectPart {
    pub id: ProjectPartId,
    /// Compiler arguments for documents of this project
    pub arguments: Vec<String>,
    /// Stamp of the most recent create or update
    pub last_change_time_point: TimePoint,
}

/// Live set of project configurations.
///
/// Every `create_or_update` takes a fresh stamp, so a project that is removed
/// and re-created never compares equal to requests made against its earlier
/// incarnation.
#[derive(Debug, Default)]
pub struct ProjectParts {
    parts: HashMap<ProjectPartId, ProjectPart>,
}

impl ProjectParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a project, or replace the configuration of an existing one.
    ///
    /// Returns the new change stamp.
    pub fn create_or_update(&mut self, id: ProjectPartId, arguments: Vec<String>) -> TimePoint {
        let last_change_time_point = TimePoint::now();
        let replaced = self
            .parts
            .insert(
                id.clone(),
                ProjectPart {
                    id: id.clone(),
                    arguments,
                    last_change_time_point,
                },
            )
            .is_some();

        log::trace!(
            "{} project part {} at {}",
            if replaced { "Updated" } else { "Created" },
            id,
            last_change_time_point
        );
        last_change_time_point
    }

    /// Remove a project. Returns false if it was not known.
    pub fn remove(&mut self, id: &ProjectPartId) -> bool {
        let removed = self.parts.remove(id).is_some();
        if removed {
            log::trace!("Removed project part {}", id);
        }
        removed
    }

    pub fn get(&self, id: &ProjectPartId) -> Option<&ProjectPart> {
        self.parts.get(id)
    }

    pub fn contains(&self, id: &ProjectPartId) -> bool {
        self.parts.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ProjectPartId> {
        self.parts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
