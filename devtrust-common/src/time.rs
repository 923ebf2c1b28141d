//! Wall-clock collaborator
//!
//! Certificate validity depends on the device clock, and embedded devices
//! boot with an unsynchronized clock until NTP (or an RTC) has run. The
//! identity manager asks a [`TimeSource`] both for the time and whether that
//! time can be trusted yet.

use chrono::{Datelike, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// First year a synchronized clock can plausibly report.
pub const MIN_SYNCED_YEAR: i32 = 2024;

/// Source of the current time and its synchronization state
pub trait TimeSource: Send + Sync {
    /// Current time as seconds since the Unix epoch
    fn now_unix(&self) -> i64;

    /// Whether the clock has been synchronized against a trusted reference
    fn is_synchronized(&self) -> bool;
}

/// Host clock. Considered synchronized once it reports a plausible year.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn is_synchronized(&self) -> bool {
        Utc::now().year() >= MIN_SYNCED_YEAR
    }
}

/// Settable clock for tests and simulations
#[derive(Debug)]
pub struct FixedTimeSource {
    now: AtomicI64,
    synchronized: AtomicBool,
}

impl FixedTimeSource {
    pub fn new(now_unix: i64, synchronized: bool) -> Self {
        Self {
            now: AtomicI64::new(now_unix),
            synchronized: AtomicBool::new(synchronized),
        }
    }

    /// A synchronized clock reading the current host time
    pub fn synced_now() -> Self {
        Self::new(Utc::now().timestamp(), true)
    }

    /// A clock stuck at the epoch that has never been synchronized,
    /// which is what a freshly booted device without RTC reports
    pub fn unsynced() -> Self {
        Self::new(0, false)
    }

    pub fn set_now(&self, now_unix: i64) {
        self.now.store(now_unix, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set_synchronized(&self, synchronized: bool) {
        self.synchronized.store(synchronized, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::SeqCst)
    }
}

/// Format a Unix timestamp as ISO-8601 UTC (`2025-01-31T12:00:00Z`)
pub fn format_iso8601(unix: i64) -> String {
    match Utc.timestamp_opt(unix, 0).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => "1970-01-01T00:00:00Z".to_string(),
    }
}

/// Parse an ISO-8601 / RFC 3339 UTC timestamp. Returns `None` when malformed.
pub fn parse_iso8601(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}
