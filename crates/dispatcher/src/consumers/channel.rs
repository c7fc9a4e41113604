//! BeatConsumer - hands beats to a subsystem's own event loop
//!
//! Subsystems that already run a main loop embed a `BeatConsumer`, register
//! it with the dispatcher, and `select!` on the paired `BeatReceiver`. Each
//! beat arrives as a `BeatRequest` that must be answered with
//! `notify_processed` before the dispatcher moves on.

use std::sync::Mutex;

use async_trait::async_trait;
use contracts::{Beat, Consumer, ContractError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

/// One beat awaiting processing by the subsystem
#[derive(Debug)]
pub struct BeatRequest {
    beat: Beat,
    done: oneshot::Sender<Result<(), ContractError>>,
}

impl BeatRequest {
    pub fn beat(&self) -> &Beat {
        &self.beat
    }

    /// Report the outcome back to the dispatcher
    pub fn notify_processed(self, result: Result<(), ContractError>) {
        if self.done.send(result).is_err() {
            debug!(height = self.beat.height(), "dispatcher no longer waiting for result");
        }
    }
}

/// Subsystem side of a `BeatConsumer`
#[derive(Debug)]
pub struct BeatReceiver {
    requests: mpsc::Receiver<BeatRequest>,
}

impl BeatReceiver {
    /// Next beat to process, `None` once the consumer is dropped
    pub async fn recv(&mut self) -> Option<BeatRequest> {
        self.requests.recv().await
    }
}

/// Channel-backed consumer
pub struct BeatConsumer {
    name: String,
    requests: mpsc::Sender<BeatRequest>,
    current: Mutex<Option<Beat>>,
}

impl BeatConsumer {
    /// Create the consumer and the receiver its subsystem listens on
    pub fn new(name: impl Into<String>) -> (Self, BeatReceiver) {
        let (tx, rx) = mpsc::channel(1);
        let consumer = Self {
            name: name.into(),
            requests: tx,
            current: Mutex::new(None),
        };
        (consumer, BeatReceiver { requests: rx })
    }

    /// Latest beat seeded or successfully processed
    pub fn current_beat(&self) -> Option<Beat> {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set_current(&self, beat: &Beat) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(beat.clone());
    }
}

#[async_trait]
impl Consumer for BeatConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "beat_consumer_process",
        skip(self, beat),
        fields(consumer = %self.name, height = beat.height())
    )]
    async fn process_beat(&self, beat: &Beat) -> Result<(), ContractError> {
        let (done, result) = oneshot::channel();
        let request = BeatRequest {
            beat: beat.clone(),
            done,
        };

        self.requests
            .send(request)
            .await
            .map_err(|_| ContractError::consumer(&self.name, "subsystem stopped receiving beats"))?;

        let outcome = result.await.map_err(|_| {
            ContractError::consumer(&self.name, "subsystem dropped beat without a result")
        })?;

        if outcome.is_ok() {
            self.set_current(beat);
        }
        outcome
    }

    fn seed_beat(&self, beat: &Beat) {
        self.set_current(beat);
    }
}
