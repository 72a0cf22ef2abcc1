//
// unsaved_files.rs
//
// Editor buffers whose content differs from disk
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::time_point::TimePoint;

/// Unsaved buffer contents with a single change clock.
///
/// The clock is global rather than per file: any mutation advances it, which
/// over-invalidates requests for unrelated documents in exchange for a cheap
/// comparison.
#[derive(Debug)]
pub struct UnsavedFiles {
    files: HashMap<PathBuf, String>,
    last_change_time_point: TimePoint,
}

impl Default for UnsavedFiles {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
            last_change_time_point: TimePoint::now(),
        }
    }
}

impl UnsavedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record new unsaved content for a file
    pub fn create_or_update(&mut self, file_path: PathBuf, content: String) {
        log::trace!(
            "Unsaved content for {} ({} bytes)",
            file_path.display(),
            content.len()
        );
        self.files.insert(file_path, content);
        self.bump();
    }

    /// Drop the unsaved content for a file (saved or reverted).
    ///
    /// The clock only advances if something was removed.
    pub fn remove(&mut self, file_path: &Path) -> bool {
        let removed = self.files.remove(file_path).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    pub fn get(&self, file_path: &Path) -> Option<&str> {
        self.files.get(file_path).map(String::as_str)
    }

    pub fn contains(&self, file_path: &Path) -> bool {
        self.files.contains_key(file_path)
    }

    pub fn last_change_time_point(&self) -> TimePoint {
        self.last_change_time_point
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn bump(&mut self) {
        self.last_change_time_point = TimePoint::now();
    }
}
