//! ChainNotifier - fans connected blocks out to epoch subscribers

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use contracts::{BlockEpoch, BlockEpochEvent, BlockSource, ContractError};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

/// Number of connected blocks retained for backfilling late subscribers
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// In-memory chain tip notifier.
///
/// Cloning is cheap; every clone observes the same chain.
#[derive(Clone)]
pub struct ChainNotifier {
    state: Arc<Mutex<NotifierState>>,
    // Serializes `connect_block` so every subscriber sees heights in order.
    connect_lock: Arc<tokio::sync::Mutex<()>>,
    buffer: usize,
}

struct NotifierState {
    tip: Option<BlockEpoch>,
    history: VecDeque<BlockEpoch>,
    history_limit: usize,
    subscribers: HashMap<u64, mpsc::Sender<BlockEpoch>>,
    next_id: u64,
    closed: bool,
}

impl ChainNotifier {
    /// Create a notifier with the given per-subscriber buffer
    pub fn new(buffer: usize) -> Self {
        Self::with_history_limit(buffer, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(buffer: usize, history_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState {
                tip: None,
                history: VecDeque::new(),
                history_limit: history_limit.max(1),
                subscribers: HashMap::new(),
                next_id: 0,
                closed: false,
            })),
            connect_lock: Arc::new(tokio::sync::Mutex::new(())),
            buffer: buffer.max(1),
        }
    }

    /// Current best block, if any block was connected
    pub fn tip(&self) -> Option<BlockEpoch> {
        lock(&self.state).tip
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Connect a new block on top of the current tip.
    ///
    /// Waits for buffer space on every subscriber; epochs are never dropped.
    /// Returns the number of subscribers notified.
    ///
    /// # Errors
    /// `BlockOutOfOrder` if the height does not extend the tip,
    /// `SourceClosed` after `close`.
    #[instrument(name = "chain_notifier_connect", skip(self), fields(height = epoch.height))]
    pub async fn connect_block(&self, epoch: BlockEpoch) -> Result<usize, ContractError> {
        let _guard = self.connect_lock.lock().await;

        let subscribers: Vec<(u64, mpsc::Sender<BlockEpoch>)> = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(ContractError::SourceClosed);
            }
            if let Some(tip) = state.tip {
                if epoch.height <= tip.height {
                    return Err(ContractError::BlockOutOfOrder {
                        tip: tip.height,
                        height: epoch.height,
                    });
                }
            }

            state.tip = Some(epoch);
            state.history.push_back(epoch);
            while state.history.len() > state.history_limit {
                state.history.pop_front();
            }

            state
                .subscribers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut notified = 0;
        for (id, tx) in subscribers {
            if tx.send(epoch).await.is_ok() {
                notified += 1;
            } else {
                trace!(subscriber = id, "subscriber gone, removing");
                lock(&self.state).subscribers.remove(&id);
            }
        }

        metrics::counter!("blockbeat_source_blocks_connected_total").increment(1);
        metrics::gauge!("blockbeat_source_tip_height").set(epoch.height as f64);
        debug!(height = epoch.height, hash = %epoch.hash, subscribers = notified, "block connected");

        Ok(notified)
    }

    /// End every subscription stream.
    ///
    /// Subscribers observe a closed stream, which is normal termination.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if !state.closed {
            state.closed = true;
            let dropped = state.subscribers.len();
            state.subscribers.clear();
            debug!(subscribers = dropped, "chain notifier closed");
        }
    }

    fn subscribe(&self, best_block: Option<BlockEpoch>) -> Result<BlockEpochEvent, ContractError> {
        let mut state = lock(&self.state);

        let backlog: Vec<BlockEpoch> = match best_block {
            None => state.tip.into_iter().collect(),
            Some(best) => {
                if let Some(oldest) = state.history.front() {
                    if best.height.saturating_add(1) < oldest.height {
                        warn!(
                            best = best.height,
                            oldest = oldest.height,
                            "requested backfill is older than retained history"
                        );
                    }
                }
                state
                    .history
                    .iter()
                    .filter(|e| e.height > best.height)
                    .copied()
                    .collect()
            }
        };

        let (tx, rx) = mpsc::channel(self.buffer.max(backlog.len()));
        for epoch in &backlog {
            // Capacity covers the whole backlog.
            let _ = tx.try_send(*epoch);
        }

        if state.closed {
            // Dropping the sender ends the stream after the backlog.
            debug!(backlog = backlog.len(), "subscribed to closed chain notifier");
            return Ok(BlockEpochEvent::from_receiver(rx));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);

        debug!(
            subscriber = id,
            backlog = backlog.len(),
            "block epoch subscription registered"
        );

        let weak: Weak<Mutex<NotifierState>> = Arc::downgrade(&self.state);
        Ok(BlockEpochEvent::new(rx, move || {
            if let Some(state) = weak.upgrade() {
                lock(&state).subscribers.remove(&id);
                trace!(subscriber = id, "block epoch subscription cancelled");
            }
        }))
    }
}

impl BlockSource for ChainNotifier {
    async fn register_block_epoch_ntfn(
        &self,
        best_block: Option<BlockEpoch>,
    ) -> Result<BlockEpochEvent, ContractError> {
        self.subscribe(best_block)
    }
}

fn lock(state: &Mutex<NotifierState>) -> MutexGuard<'_, NotifierState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
