//! Sample timestamp source

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Wall clock used to stamp samples
pub trait Clock: Send + Sync + Debug {
    /// Current UTC instant
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
