use chrono::{DateTime, Utc};

/// Source of wall-clock time for ids and message timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
