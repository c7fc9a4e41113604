//! BlockProducer - mines a synthetic chain into a ChainNotifier

use std::time::Duration;

use contracts::{BlockEpoch, BlockHash, ContractError, SourceConfig};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ChainNotifier;

/// Block producer configuration
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Height of the first mined block
    pub start_height: u32,
    /// Time between blocks
    pub interval: Duration,
    /// Blocks to mine (0 = unlimited)
    pub max_blocks: u64,
    /// Close the notifier once `max_blocks` is reached
    pub close_when_done: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            interval: Duration::from_secs(1),
            max_blocks: 0,
            close_when_done: true,
        }
    }
}

impl From<&SourceConfig> for ProducerConfig {
    fn from(config: &SourceConfig) -> Self {
        Self {
            start_height: config.start_height,
            interval: config.block_interval(),
            max_blocks: config.max_blocks,
            close_when_done: true,
        }
    }
}

/// Derive the epoch following `prev`: `sha256(prev_hash || height_be)`
pub fn next_epoch(prev: Option<BlockEpoch>, height: u32) -> BlockEpoch {
    let parent = prev.map(|e| e.hash).unwrap_or(BlockHash::ZERO);

    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update(height.to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();

    BlockEpoch::new(height, BlockHash::new(digest))
}

/// Synthetic miner
pub struct BlockProducer {
    notifier: ChainNotifier,
    config: ProducerConfig,
}

impl BlockProducer {
    pub fn new(notifier: ChainNotifier, config: ProducerConfig) -> Self {
        Self { notifier, config }
    }

    /// Mine one block on top of the notifier's tip
    pub async fn mine_one(&self) -> Result<BlockEpoch, ContractError> {
        let tip = self.notifier.tip();
        let height = match tip {
            Some(tip) => tip.height + 1,
            None => self.config.start_height,
        };
        let epoch = next_epoch(tip, height);
        self.notifier.connect_block(epoch).await?;
        Ok(epoch)
    }

    /// Run the miner in the background.
    ///
    /// The first block is mined immediately. Resolves to the number of
    /// blocks mined.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) -> u64 {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut mined: u64 = 0;

        info!(
            start_height = self.config.start_height,
            interval_ms = self.config.interval.as_millis() as u64,
            max_blocks = self.config.max_blocks,
            "block producer started"
        );

        loop {
            if self.config.max_blocks > 0 && mined >= self.config.max_blocks {
                debug!(mined, "block producer reached max_blocks");
                if self.config.close_when_done {
                    self.notifier.close();
                }
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(mined, "block producer shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    // A full subscriber buffer applies back-pressure here.
                    let result = tokio::select! {
                        _ = shutdown.cancelled() => None,
                        result = self.mine_one() => Some(result),
                    };
                    match result {
                        None => break,
                        Some(Ok(_)) => mined += 1,
                        Some(Err(ContractError::SourceClosed)) => {
                            debug!(mined, "notifier closed, block producer exiting");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "failed to mine block");
                            break;
                        }
                    }
                }
            }
        }

        info!(mined, "block producer stopped");
        mined
    }
}
