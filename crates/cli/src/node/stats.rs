//! Node statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MetricsSummary;

/// Statistics from a node run
#[derive(Debug, Clone)]
pub struct NodeStats {
    /// Blocks mined by the synthetic source
    pub blocks_mined: u64,

    /// Dispatcher counters at shutdown
    pub dispatch: MetricsSnapshot,

    /// Aggregated round and block interval statistics
    pub summary: MetricsSummary,

    /// Total duration of the node run
    pub duration: Duration,

    /// Number of registered queues
    pub queues: usize,

    /// Number of registered consumers
    pub consumers: usize,

    /// Fatal error that halted dispatch, if any
    pub fatal: Option<String>,
}

impl NodeStats {
    /// Dispatched beats per second
    pub fn beats_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.dispatch.rounds_completed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Node Statistics                         ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Blocks mined: {}", self.blocks_mined);
        println!("   ├─ Beats received: {}", self.dispatch.beats_received);
        println!("   ├─ Beats/s: {:.2}", self.beats_per_sec());
        println!("   ├─ Queues: {}", self.queues);
        println!("   └─ Consumers: {}", self.consumers);

        println!("\n📈 Dispatch");
        println!("   ├─ Rounds completed: {}", self.dispatch.rounds_completed);
        println!("   ├─ Rounds failed: {}", self.dispatch.rounds_failed);
        println!("   ├─ Consumers seeded: {}", self.dispatch.consumers_seeded);
        println!("   ├─ Round duration (ms): {}", self.summary.round_ms);
        println!("   └─ Block interval (ms): {}", self.summary.block_interval_ms);

        if let Some(ref fatal) = self.fatal {
            println!("\n⛔ Fatal error");
            println!("   └─ {}", fatal);
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use observability::DispatchStatsAggregator;

    fn stats(rounds: u64, duration: Duration) -> NodeStats {
        NodeStats {
            blocks_mined: rounds,
            dispatch: MetricsSnapshot {
                beats_received: rounds,
                rounds_completed: rounds,
                rounds_failed: 0,
                last_height: rounds,
                last_round: Duration::ZERO,
                consumers_seeded: 0,
            },
            summary: DispatchStatsAggregator::new().summary(),
            duration,
            queues: 1,
            consumers: 1,
            fatal: None,
        }
    }

    #[test]
    fn test_beats_per_sec() {
        assert!((stats(10, Duration::from_secs(2)).beats_per_sec() - 5.0).abs() < 1e-9);
        assert_eq!(stats(10, Duration::ZERO).beats_per_sec(), 0.0);
    }
}
