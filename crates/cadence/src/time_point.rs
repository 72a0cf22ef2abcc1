//
// time_point.rs
//
// Process-wide change clock for registry timestamps
//

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Next value handed out by `TimePoint::now`. Zero is reserved for `origin`.
static CLOCK: AtomicU64 = AtomicU64::new(1);

/// A stamp on the registry's change clock.
///
/// Every call to [`TimePoint::now`] returns a value strictly greater than any
/// value returned before it, across all threads. Project and unsaved-file
/// changes are stamped with it, and job requests snapshot those stamps, so
/// "changed since the request was made" is a plain ordering comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimePoint(u64);

impl TimePoint {
    /// Take a fresh stamp from the clock
    pub fn now() -> Self {
        Self(CLOCK.fetch_add(1, Ordering::Relaxed))
    }

    /// The stamp older than every stamp `now` can return
    pub const fn origin() -> Self {
        Self(0)
    }

    /// Whether this stamp was taken after `other`
    pub fn is_after(self, other: TimePoint) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
