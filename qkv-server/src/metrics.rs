//! # Server Metrics
//!
//! Counters for the acceptor and the worker pool plus a histogram of session
//! durations, measured from dequeue to close.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events without locks.
//! 2. **Fixed Buckets**: Histogram buckets live in a contiguous array.
//! 3. **Plain Snapshots**: Readers get a plain struct, never live atomics.
//!
//! ## Notes
//! - `Ordering::Relaxed` everywhere: no reader needs cross-field consistency.
//! - Bucket boundaries are in milliseconds because a session spans several
//!   network round trips.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default session duration bucket boundaries in milliseconds.
pub const DEFAULT_SESSION_BUCKETS_MS: [u64; 10] = [1, 2, 5, 10, 25, 50, 100, 250, 1_000, 5_000];

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `END` was processed and the reply sent.
    Replied,
    /// The peer closed before a complete message arrived.
    PeerClosed,
    /// The message completed without an `END` command; nothing was sent.
    Unterminated,
    /// Server shutdown interrupted the session.
    Cancelled,
    /// Connection I/O failed.
    Failed,
}

/// Snapshot of all server metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Connections accepted and enqueued.
    pub accepted_total: u64,
    /// Failed `accept()` attempts.
    pub accept_errors_total: u64,
    /// Sessions started by workers.
    pub sessions_total: u64,
    /// Sessions currently running.
    pub sessions_active: u64,
    /// Sessions that ended with a reply.
    pub replies_total: u64,
    /// Sessions that ended on an I/O error.
    pub session_errors_total: u64,
    /// Commands executed against the store.
    pub commands_total: u64,
    /// Writes dropped for a missing value sentinel.
    pub malformed_writes_total: u64,
    /// Session duration histogram.
    pub session_duration: DurationSnapshot,
}

/// Snapshot of the duration histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationSnapshot {
    /// Bucket boundaries in milliseconds.
    pub bounds_ms: Vec<u64>,
    /// Bucket counts, with the overflow bucket last.
    pub buckets: Vec<u64>,
    /// Number of samples.
    pub samples: u64,
    /// Sum of all samples in milliseconds.
    pub sum_ms: u64,
}

/// Thread-safe metrics aggregator shared by the acceptor and all workers.
#[derive(Debug)]
pub struct Metrics {
    accepted_total: AtomicU64,
    accept_errors_total: AtomicU64,
    sessions_total: AtomicU64,
    sessions_active: AtomicU64,
    replies_total: AtomicU64,
    session_errors_total: AtomicU64,
    commands_total: AtomicU64,
    malformed_writes_total: AtomicU64,
    session_duration: DurationHistogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates an aggregator with the default duration buckets.
    pub fn new() -> Self {
        Metrics {
            accepted_total: AtomicU64::new(0),
            accept_errors_total: AtomicU64::new(0),
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            replies_total: AtomicU64::new(0),
            session_errors_total: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            malformed_writes_total: AtomicU64::new(0),
            session_duration: DurationHistogram::new(DEFAULT_SESSION_BUCKETS_MS.to_vec()),
        }
    }

    pub fn record_accept(&self) {
        self.accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accept_error(&self) {
        self.accept_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker picking up a connection.
    pub fn record_session_start(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session ending, however it ended.
    pub fn record_session_end(&self, end: SessionEnd, elapsed: Duration) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
        match end {
            SessionEnd::Replied => {
                self.replies_total.fetch_add(1, Ordering::Relaxed);
            }
            SessionEnd::Failed => {
                self.session_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            SessionEnd::PeerClosed | SessionEnd::Unterminated | SessionEnd::Cancelled => {}
        }
        self.session_duration.record(elapsed);
    }

    /// Records the commands executed by one message.
    pub fn record_commands(&self, executed: usize, malformed_writes: usize) {
        self.commands_total
            .fetch_add(executed as u64, Ordering::Relaxed);
        self.malformed_writes_total
            .fetch_add(malformed_writes as u64, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters and histogram buckets.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted_total: self.accepted_total.load(Ordering::Relaxed),
            accept_errors_total: self.accept_errors_total.load(Ordering::Relaxed),
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            replies_total: self.replies_total.load(Ordering::Relaxed),
            session_errors_total: self.session_errors_total.load(Ordering::Relaxed),
            commands_total: self.commands_total.load(Ordering::Relaxed),
            malformed_writes_total: self.malformed_writes_total.load(Ordering::Relaxed),
            session_duration: self.session_duration.snapshot(),
        }
    }
}

/// Fixed-bucket duration histogram. Linear bucket scan; the list is short.
#[derive(Debug)]
pub struct DurationHistogram {
    bounds_ms: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_ms: AtomicU64,
    samples: AtomicU64,
}

impl DurationHistogram {
    /// Creates a histogram with ascending bucket boundaries (milliseconds).
    pub fn new(bounds_ms: Vec<u64>) -> Self {
        let buckets = (0..=bounds_ms.len()).map(|_| AtomicU64::new(0)).collect();
        DurationHistogram {
            bounds_ms,
            buckets,
            sum_ms: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(millis, Ordering::Relaxed);

        let idx = self
            .bounds_ms
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(self.bounds_ms.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DurationSnapshot {
        DurationSnapshot {
            bounds_ms: self.bounds_ms.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
        }
    }
}
