//! Source of "now" for scheduling and status transitions.

use chrono::{DateTime, SubsecRound, Utc};

/// Supplies the current time. Injected so sweeps can be driven by tests.
pub trait Clock {
    /// Current time, truncated to whole seconds.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}
