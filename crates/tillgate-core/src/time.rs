//! Time abstraction for testable timing decisions.
//!
//! Cooldowns and retry delays are expressed as absolute wall-clock
//! timestamps compared against an injected clock. The resilience layer
//! never sleeps or owns a timer; tests advance a [`TestClock`] to simulate
//! cooldown expiry deterministically.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};

/// Clock abstraction for wall-clock time.
///
/// Production code uses [`SystemClock`]; tests inject a [`TestClock`] with
/// controllable progression.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock with controllable progression.
///
/// Stores the current time as milliseconds since the Unix epoch so clones
/// share the same underlying timeline.
#[derive(Debug, Clone)]
pub struct TestClock {
    epoch_millis: Arc<AtomicI64>,
}

impl TestClock {
    /// Creates a test clock starting at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a test clock starting at a specific time.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { epoch_millis: Arc::new(AtomicI64::new(start.timestamp_millis())) }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: std::time::Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.epoch_millis.fetch_add(millis, Ordering::AcqRel);
    }

    /// Jumps the clock to a specific time. May move backwards.
    pub fn set(&self, time: DateTime<Utc>) {
        self.epoch_millis.store(time.timestamp_millis(), Ordering::Release);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.epoch_millis.load(Ordering::Acquire);
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
