use chrono::{DateTime, FixedOffset, Utc};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch (for audit records only).
    pub fn unix_us(&self) -> u64 {
        Utc::now().timestamp_micros().max(0) as u64
    }

    /// Milliseconds the caller's clock is ahead of ours (negative when behind).
    pub fn skew_ms(&self, client_time: &DateTime<FixedOffset>) -> i64 {
        client_time.signed_duration_since(Utc::now()).num_milliseconds()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
