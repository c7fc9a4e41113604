//! BlockSource trait - ordered new-block notifications

use std::fmt;

use tokio::sync::mpsc;

use crate::{BlockEpoch, ContractError};

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Live subscription to new block epochs.
///
/// The cancel action runs exactly once: on `cancel()` or on drop,
/// whichever comes first.
pub struct BlockEpochEvent {
    epochs: mpsc::Receiver<BlockEpoch>,
    cancel: Option<CancelFn>,
}

impl BlockEpochEvent {
    /// Create a subscription with a release action
    pub fn new(
        epochs: mpsc::Receiver<BlockEpoch>,
        cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            epochs,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a subscription with nothing to release
    pub fn from_receiver(epochs: mpsc::Receiver<BlockEpoch>) -> Self {
        Self {
            epochs,
            cancel: None,
        }
    }

    /// Next epoch, or `None` once the source closed the stream
    pub async fn recv(&mut self) -> Option<BlockEpoch> {
        self.epochs.recv().await
    }

    /// Release the subscription
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            self.epochs.close();
            cancel();
        }
    }
}

impl Drop for BlockEpochEvent {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BlockEpochEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockEpochEvent")
            .field("released", &self.cancel.is_none())
            .finish()
    }
}

/// Source of totally-ordered block notifications
#[trait_variant::make(BlockSource: Send)]
pub trait LocalBlockSource {
    /// Subscribe to new blocks.
    ///
    /// With `best_block = None` the current tip is delivered immediately,
    /// followed by one epoch per new block. With `Some(best)` the source
    /// first replays every known block above `best.height`.
    ///
    /// # Errors
    /// Returns a subscription error if the source cannot register the client.
    async fn register_block_epoch_ntfn(
        &self,
        best_block: Option<BlockEpoch>,
    ) -> Result<BlockEpochEvent, ContractError>;
}
