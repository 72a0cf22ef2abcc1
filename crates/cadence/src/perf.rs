// perf.rs - Job and queue-pass timing
//
// Every finished job is recorded in `JobTimings`, per request kind. Logging of
// individual timings is controlled via the CADENCE_PERF environment variable:
//
//   CADENCE_PERF=1        # Log each queue pass and job duration
//   CADENCE_PERF=verbose  # Also warn about jobs slower than their budget

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::jobs::JobRequestType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerfMode {
    Off,
    On,
    Verbose,
}

static PERF_MODE: OnceLock<PerfMode> = OnceLock::new();

fn parse_perf_mode(value: Option<&str>) -> PerfMode {
    match value.map(|v| v.trim().to_lowercase()) {
        None => PerfMode::Off,
        Some(v) if v.is_empty() || v == "0" || v == "false" => PerfMode::Off,
        Some(v) if v == "verbose" => PerfMode::Verbose,
        Some(_) => PerfMode::On,
    }
}

fn perf_mode() -> PerfMode {
    *PERF_MODE.get_or_init(|| parse_perf_mode(std::env::var("CADENCE_PERF").ok().as_deref()))
}

/// Times one queue pass or job.
///
/// ```
/// use std::time::Duration;
/// use cadence::perf::Stopwatch;
///
/// let stopwatch = Stopwatch::start("process_queue").with_budget(Duration::from_millis(50));
/// let elapsed = stopwatch.stop();
/// assert!(elapsed < Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct Stopwatch {
    label: &'static str,
    start: Instant,
    budget: Option<Duration>,
}

impl Stopwatch {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
            budget: None,
        }
    }

    /// Warn (in verbose mode) when the timed work takes longer than `budget`
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Stop timing, log according to CADENCE_PERF, and return the duration
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        let mode = perf_mode();
        if mode == PerfMode::Off {
            return elapsed;
        }

        log::info!("[PERF] {} took {:?}", self.label, elapsed);
        if let Some(budget) = self.budget {
            if mode == PerfMode::Verbose && elapsed > budget {
                log::warn!("[PERF] {} over budget ({:?} > {:?})", self.label, elapsed, budget);
            }
        }
        elapsed
    }
}

/// Aggregate timing of one request kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobTypeTiming {
    /// Jobs finished, whatever their result
    pub count: u64,
    pub total: Duration,
    pub slowest: Duration,
}

impl JobTypeTiming {
    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

/// Per-kind job timings, shared by the runner's tasks
#[derive(Debug, Default)]
pub struct JobTimings {
    by_type: DashMap<JobRequestType, JobTypeTiming>,
}

impl JobTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, request_type: JobRequestType, elapsed: Duration) {
        let mut timing = self.by_type.entry(request_type).or_default();
        timing.count += 1;
        timing.total += elapsed;
        timing.slowest = timing.slowest.max(elapsed);
    }

    pub fn get(&self, request_type: JobRequestType) -> JobTypeTiming {
        self.by_type
            .get(&request_type)
            .map(|timing| *timing)
            .unwrap_or_default()
    }

    /// Timings of every kind that has run, in `JobRequestType::ALL` order
    pub fn snapshot(&self) -> Vec<(JobRequestType, JobTypeTiming)> {
        JobRequestType::ALL
            .iter()
            .filter_map(|kind| self.by_type.get(kind).map(|timing| (*kind, *timing)))
            .collect()
    }
}
