//! LogConsumer - logs every beat via tracing

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use contracts::{Beat, BlockEpoch, Consumer, ContractError};
use tracing::{info, instrument};

/// Consumer that logs beat summaries, optionally simulating work
pub struct LogConsumer {
    name: String,
    delay: Option<Duration>,
    current: Mutex<Option<BlockEpoch>>,
}

impl LogConsumer {
    /// Create a new LogConsumer with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            current: Mutex::new(None),
        }
    }

    /// Sleep for `delay` while processing each beat
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Latest beat seen through seeding or processing
    pub fn current_epoch(&self) -> Option<BlockEpoch> {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_current(&self, beat: &Beat) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(beat.epoch());
    }
}

#[async_trait]
impl Consumer for LogConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_consumer_process",
        skip(self, beat),
        fields(consumer = %self.name, height = beat.height())
    )]
    async fn process_beat(&self, beat: &Beat) -> Result<(), ContractError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        info!(
            consumer = %self.name,
            height = beat.height(),
            hash = %beat.hash(),
            "beat received"
        );
        self.set_current(beat);
        Ok(())
    }

    fn seed_beat(&self, beat: &Beat) {
        info!(consumer = %self.name, height = beat.height(), "current height seeded");
        self.set_current(beat);
    }
}
