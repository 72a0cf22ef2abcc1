//
// jobs/config.rs
//
// Scheduler configuration and settings parsing
//

/// Job scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once
    pub max_concurrent_jobs: usize,
    /// Maximum number of requests handed out per queue pass (None = unbounded)
    pub max_batch_size: Option<usize>,
    /// Leave requests for documents that are neither visible nor current queued
    pub defer_hidden_documents: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_batch_size: None,
            defer_hidden_documents: false,
        }
    }
}

/// Parse scheduler configuration from editor settings.
///
/// Reads the top-level `jobs` section. Only keys present in the JSON are
/// applied; the rest keep their defaults from `SchedulerConfig::default()`.
///
/// Supported keys:
/// - `maxConcurrentJobs`: positive integer
/// - `maxBatchSize`: positive integer, or 0 / null for unbounded
/// - `deferHiddenDocuments`: boolean
///
/// Returns None if the `jobs` section is missing.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use cadence::jobs::parse_scheduler_config;
///
/// let settings = json!({
///     "jobs": { "maxConcurrentJobs": 2, "deferHiddenDocuments": true }
/// });
/// let cfg = parse_scheduler_config(&settings).unwrap();
/// assert_eq!(cfg.max_concurrent_jobs, 2);
/// assert!(cfg.defer_hidden_documents);
/// assert_eq!(cfg.max_batch_size, None);
/// ```
pub fn parse_scheduler_config(settings: &serde_json::Value) -> Option<SchedulerConfig> {
    let jobs = settings.get("jobs")?;

    let mut config = SchedulerConfig::default();

    if let Some(v) = jobs.get("maxConcurrentJobs").and_then(|v| v.as_u64()) {
        if v > 0 {
            config.max_concurrent_jobs = v as usize;
        } else {
            log::warn!("Ignoring jobs.maxConcurrentJobs = 0");
        }
    }
    if let Some(v) = jobs.get("maxBatchSize") {
        if v.is_null() {
            config.max_batch_size = None;
        } else if let Some(n) = v.as_u64() {
            config.max_batch_size = (n > 0).then_some(n as usize);
        }
    }
    if let Some(v) = jobs.get("deferHiddenDocuments").and_then(|v| v.as_bool()) {
        config.defer_hidden_documents = v;
    }

    log::info!("Job scheduler configuration loaded from settings:");
    log::info!("  max_concurrent_jobs: {}", config.max_concurrent_jobs);
    log::info!("  max_batch_size: {:?}", config.max_batch_size);
    log::info!("  defer_hidden_documents: {}", config.defer_hidden_documents);

    Some(config)
}
