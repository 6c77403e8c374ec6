//! Time source abstraction for supporting both real-time and simulated time.
//!
//! The process keeps one global time source. Group workers and the logger read
//! the current instant through it, which lets the `simulate` command walk a
//! whole day in fast-forward while every log line carries the simulated time.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};

/// Global time source instance, defaults to RealTimeSource
static TIME_SOURCE: OnceCell<Arc<dyn TimeSource>> = OnceCell::new();

/// Trait for abstracting time operations
pub trait TimeSource: Send + Sync {
    /// Get the current instant
    fn now(&self) -> DateTime<Utc>;

    /// Check if this is a simulated time source
    fn is_simulated(&self) -> bool;
}

/// Real-time implementation that uses the system clock
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Fast-forward clock that only moves when told to.
pub struct SimulatedTimeSource {
    current: Mutex<DateTime<Utc>>,
}

impl SimulatedTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the simulated clock forward.
    pub fn advance(&self, step: ChronoDuration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += step;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Install the process-wide time source.
///
/// Can only be called once; later calls fail.
pub fn init(source: Arc<dyn TimeSource>) -> anyhow::Result<()> {
    TIME_SOURCE
        .set(source)
        .map_err(|_| anyhow::anyhow!("Time source already initialized"))
}

/// Whether a time source has been installed explicitly.
pub fn is_initialized() -> bool {
    TIME_SOURCE.get().is_some()
}

fn source() -> &'static Arc<dyn TimeSource> {
    TIME_SOURCE.get_or_init(|| Arc::new(RealTimeSource))
}

/// Current instant from the global time source.
pub fn now() -> DateTime<Utc> {
    source().now()
}

pub fn is_simulated() -> bool {
    source().is_simulated()
}
