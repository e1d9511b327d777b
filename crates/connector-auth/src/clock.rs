//! Time source for cache staleness decisions.

use std::fmt;
use std::time::SystemTime;

/// Source of the current time.
///
/// The metadata cache asks a `Clock` instead of calling `SystemTime::now`
/// so refresh behaviour can be driven deterministically.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
