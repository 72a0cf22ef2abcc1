// lib.rs - Incremental job scheduler for editor analysis backends
//
// The registry (documents, project parts, unsaved buffers) lives in `state`.
// Work against it is described by `jobs::JobRequest`, filtered and ordered by
// `jobs::JobQueue`, and executed by `jobs::Jobs`.

pub mod document_store;
pub mod jobs;
pub mod perf;
pub mod project_parts;
pub mod state;
pub mod time_point;
pub mod unsaved_files;
