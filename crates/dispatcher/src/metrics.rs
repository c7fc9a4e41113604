//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters for one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Beats received from the block source
    beats_received: AtomicU64,
    /// Rounds where every queue succeeded
    rounds_completed: AtomicU64,
    /// Rounds that ended in a fatal error
    rounds_failed: AtomicU64,
    /// Height of the latest beat
    last_height: AtomicU64,
    /// Duration of the latest completed round (microseconds)
    last_round_us: AtomicU64,
    /// Consumers seeded by `set_initial_beat`
    consumers_seeded: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beats_received(&self) -> u64 {
        self.beats_received.load(Ordering::Relaxed)
    }

    /// Record a new beat
    pub fn record_beat(&self, height: u32) {
        self.beats_received.fetch_add(1, Ordering::Relaxed);
        self.last_height.store(u64::from(height), Ordering::Relaxed);
        observability::record_beat_received(height);
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed.load(Ordering::Relaxed)
    }

    /// Record a round where every queue succeeded
    pub fn record_round_completed(&self, elapsed: Duration) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        self.last_round_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
        observability::record_round_duration(elapsed);
    }

    pub fn rounds_failed(&self) -> u64 {
        self.rounds_failed.load(Ordering::Relaxed)
    }

    /// Record a round that ended in a fatal error
    pub fn record_round_failed(&self) {
        self.rounds_failed.fetch_add(1, Ordering::Relaxed);
        observability::record_fatal_error();
    }

    pub fn last_height(&self) -> u64 {
        self.last_height.load(Ordering::Relaxed)
    }

    pub fn last_round(&self) -> Duration {
        Duration::from_micros(self.last_round_us.load(Ordering::Relaxed))
    }

    pub fn consumers_seeded(&self) -> u64 {
        self.consumers_seeded.load(Ordering::Relaxed)
    }

    pub fn record_seeded(&self, count: usize) {
        self.consumers_seeded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            beats_received: self.beats_received(),
            rounds_completed: self.rounds_completed(),
            rounds_failed: self.rounds_failed(),
            last_height: self.last_height(),
            last_round: self.last_round(),
            consumers_seeded: self.consumers_seeded(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub beats_received: u64,
    pub rounds_completed: u64,
    pub rounds_failed: u64,
    pub last_height: u64,
    pub last_round: Duration,
    pub consumers_seeded: u64,
}
