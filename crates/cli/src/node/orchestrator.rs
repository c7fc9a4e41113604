//! Node orchestrator - wires the block source to the dispatcher.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use block_source::{BlockProducer, ChainNotifier, ProducerConfig};
use contracts::{Beat, NodeBlueprint};
use dispatcher::DispatchMetrics;
use observability::DispatchStatsAggregator;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NodeStats;
use crate::error::CliError;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The node blueprint
    pub blueprint: NodeBlueprint,

    /// Node timeout (None = run until the source closes or shutdown)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Runs one block source and one dispatcher until completion
pub struct Node {
    config: NodeConfig,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Run the node.
    ///
    /// Returns when the source is exhausted, `shutdown` is cancelled, the
    /// timeout expires, or a consumer fails. A consumer failure is reported
    /// through `NodeStats::fatal`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<NodeStats> {
        let started = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        let notifier = ChainNotifier::new(blueprint.source.buffer_size);
        let mut dispatcher = dispatcher::create_dispatcher(notifier.clone(), blueprint)
            .context("Failed to create dispatcher")?
            .with_shutdown(&shutdown);

        info!(
            queues = dispatcher.queue_count(),
            consumers = blueprint.consumer_count(),
            "Dispatcher configured"
        );

        let producer_stop = shutdown.child_token();
        let producer = BlockProducer::new(notifier, ProducerConfig::from(&blueprint.source));
        let producer_handle = producer.spawn(producer_stop.clone());

        if blueprint.dispatcher.set_initial_beat {
            if let Err(e) = dispatcher.set_initial_beat().await {
                producer_stop.cancel();
                return Err(CliError::startup(e.to_string()).into());
            }
        }

        if let Err(e) = dispatcher.start().await {
            producer_stop.cancel();
            return Err(CliError::startup(e.to_string()).into());
        }

        let stats_stop = CancellationToken::new();
        let watcher = tokio::spawn(watch_beats(
            dispatcher.subscribe_beats(),
            dispatcher.metrics_handle(),
            stats_stop.clone(),
        ));

        let deadline = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = dispatcher.join() => {
                info!("Block source exhausted, dispatch loop exited");
            }
            _ = shutdown.cancelled() => {
                dispatcher.stop().await;
            }
            _ = deadline => {
                warn!(timeout_secs = ?self.config.timeout.map(|t| t.as_secs()), "Node timed out");
                dispatcher.stop().await;
            }
        }

        info!("Shutting down node...");
        producer_stop.cancel();
        stats_stop.cancel();

        let blocks_mined = producer_handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "Block producer task failed");
            0
        });
        let aggregator = watcher.await.unwrap_or_else(|e| {
            warn!(error = %e, "Beat watcher task failed");
            DispatchStatsAggregator::new()
        });

        let mut summary = aggregator.summary();
        for queue in &blueprint.queues {
            summary
                .consumer_counts
                .insert(queue.name.clone(), queue.consumers.len());
        }

        let stats = NodeStats {
            blocks_mined,
            dispatch: dispatcher.metrics(),
            summary,
            duration: started.elapsed(),
            queues: dispatcher.queue_count(),
            consumers: blueprint.consumer_count(),
            fatal: dispatcher.fatal_error().map(|e| e.to_string()),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            beats_per_sec = format!("{:.2}", stats.beats_per_sec()),
            "Node shutdown complete"
        );

        Ok(stats)
    }
}

/// Aggregate block intervals and round durations while the node runs.
///
/// Beats can coalesce in the watch channel; intervals are measured
/// between observed beats.
async fn watch_beats(
    mut beats: watch::Receiver<Option<Beat>>,
    metrics: Arc<DispatchMetrics>,
    stop: CancellationToken,
) -> DispatchStatsAggregator {
    let mut aggregator = DispatchStatsAggregator::new();
    let mut last_arrival: Option<Instant> = None;
    let mut last_height: Option<u32> = None;
    let mut recorded_rounds = 0;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            changed = beats.changed() => {
                if changed.is_err() {
                    break;
                }
                let height = beats.borrow_and_update().as_ref().map(Beat::height);

                let now = Instant::now();
                if let Some(prev) = last_arrival {
                    aggregator.record_interval(now.duration_since(prev));
                }
                last_arrival = Some(now);

                // A new beat means the previous round passed the barrier.
                record_completed(&mut aggregator, &metrics, &mut recorded_rounds, last_height);
                last_height = height;
            }
        }
    }

    record_completed(&mut aggregator, &metrics, &mut recorded_rounds, last_height);
    if metrics.rounds_failed() > 0 {
        if let Some(height) = last_height {
            aggregator.record_failure(height);
        }
    }

    debug!(rounds = recorded_rounds, "Beat watcher stopped");
    aggregator
}

fn record_completed(
    aggregator: &mut DispatchStatsAggregator,
    metrics: &DispatchMetrics,
    recorded_rounds: &mut u64,
    height: Option<u32>,
) {
    let completed = metrics.rounds_completed();
    if completed > *recorded_rounds {
        if let Some(height) = height {
            aggregator.record_round(height, metrics.last_round());
        }
        *recorded_rounds = completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ConsumerConfig, ConsumerType, QueueConfig, SourceConfig};
    use std::collections::HashMap;

    fn blueprint(max_blocks: u64, consumers: Vec<ConsumerConfig>) -> NodeBlueprint {
        NodeBlueprint {
            version: Default::default(),
            source: SourceConfig {
                start_height: 100,
                block_interval_ms: 5,
                max_blocks,
                buffer_size: 4,
            },
            dispatcher: Default::default(),
            queues: vec![QueueConfig {
                name: "chain".into(),
                consumers,
            }],
        }
    }

    fn log_consumer(name: &str) -> ConsumerConfig {
        ConsumerConfig {
            name: name.into(),
            consumer_type: ConsumerType::Log,
            params: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_node_runs_until_source_exhausted() {
        let node = Node::new(NodeConfig {
            blueprint: blueprint(5, vec![log_consumer("arbitrator")]),
            timeout: Some(Duration::from_secs(10)),
            metrics_port: None,
        });

        let stats = node.run(CancellationToken::new()).await.unwrap();

        assert_eq!(stats.blocks_mined, 5);
        assert!(stats.fatal.is_none());
        // The seeded block is not dispatched; everything above it is.
        assert_eq!(stats.dispatch.consumers_seeded, 1);
        assert_eq!(stats.dispatch.last_height, 104);
        assert!((1..=4).contains(&stats.dispatch.rounds_completed));
        assert_eq!(stats.dispatch.rounds_failed, 0);
        assert_eq!(stats.queues, 1);
    }

    #[tokio::test]
    async fn test_single_block_source_is_normal_stop() {
        for _ in 0..10 {
            let node = Node::new(NodeConfig {
                blueprint: blueprint(1, vec![log_consumer("arbitrator")]),
                timeout: Some(Duration::from_secs(10)),
                metrics_port: None,
            });

            let stats = node.run(CancellationToken::new()).await.unwrap();

            assert_eq!(stats.blocks_mined, 1);
            assert!(stats.fatal.is_none());
            assert_eq!(stats.dispatch.consumers_seeded, 1);
            assert_eq!(stats.dispatch.rounds_completed, 0);
        }
    }

    #[tokio::test]
    async fn test_single_block_dispatched_without_initial_beat() {
        let mut bp = blueprint(1, vec![log_consumer("arbitrator")]);
        bp.dispatcher.set_initial_beat = false;
        let node = Node::new(NodeConfig {
            blueprint: bp,
            timeout: Some(Duration::from_secs(10)),
            metrics_port: None,
        });

        let stats = node.run(CancellationToken::new()).await.unwrap();

        assert!(stats.fatal.is_none());
        assert_eq!(stats.dispatch.consumers_seeded, 0);
        assert_eq!(stats.dispatch.rounds_completed, 1);
        assert_eq!(stats.dispatch.last_height, 100);
    }

    #[tokio::test]
    async fn test_node_reports_fatal_consumer() {
        let fault = ConsumerConfig {
            name: "drill".into(),
            consumer_type: ConsumerType::Fault,
            params: HashMap::from([("fail_at_height".into(), "102".into())]),
        };
        let node = Node::new(NodeConfig {
            blueprint: blueprint(0, vec![log_consumer("arbitrator"), fault]),
            timeout: Some(Duration::from_secs(10)),
            metrics_port: None,
        });

        let shutdown = CancellationToken::new();
        let stats = node.run(shutdown.clone()).await.unwrap();

        assert!(shutdown.is_cancelled());
        let fatal = stats.fatal.unwrap();
        assert!(fatal.contains("height 102"), "{fatal}");
        assert_eq!(stats.dispatch.rounds_failed, 1);
    }
}
