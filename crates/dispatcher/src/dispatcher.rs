//! BlockbeatDispatcher - fans each new block out to consumer queues
//!
//! Queues are notified concurrently; consumers within a queue are notified
//! sequentially. Every queue must finish beat `n` before beat `n + 1` is
//! accepted from the block source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    Beat, BlockEpochEvent, BlockSource, Consumer, ConsumerConfig, ConsumerType, NodeBlueprint,
};
use tokio::sync::{oneshot, watch};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, Instrument};

use crate::consumers::{FaultConsumer, LogConsumer};
use crate::error::DispatchError;
use crate::fatal::{FatalErrorHandler, FatalHook};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::queue::{same_consumer, ConsumerQueue, QueueId};

/// Dispatcher configuration
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Per-consumer processing timeout (None = wait indefinitely)
    pub process_timeout: Option<Duration>,
}

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Unstarted,
    Running,
    Stopped,
}

/// Block-driven fan-out dispatcher
pub struct BlockbeatDispatcher<N> {
    notifier: N,
    config: DispatcherConfig,
    queues: BTreeMap<QueueId, ConsumerQueue>,
    counter: u32,
    beat: Arc<watch::Sender<Option<Beat>>>,
    quit: CancellationToken,
    fatal: FatalErrorHandler,
    metrics: Arc<DispatchMetrics>,
    state: DispatcherState,
    seeded: bool,
    loop_handle: Option<JoinHandle<()>>,
}

impl<N> BlockbeatDispatcher<N>
where
    N: BlockSource + Sync,
{
    /// Create a dispatcher reading blocks from `notifier`
    pub fn new(notifier: N) -> Self {
        Self::with_config(notifier, DispatcherConfig::default())
    }

    pub fn with_config(notifier: N, config: DispatcherConfig) -> Self {
        let (beat, _) = watch::channel(None);
        Self {
            notifier,
            config,
            queues: BTreeMap::new(),
            counter: 0,
            beat: Arc::new(beat),
            quit: CancellationToken::new(),
            fatal: FatalErrorHandler::default(),
            metrics: Arc::new(DispatchMetrics::new()),
            state: DispatcherState::Unstarted,
            seeded: false,
            loop_handle: None,
        }
    }

    /// Tie the dispatcher to a process-wide shutdown token.
    ///
    /// Cancelling `parent` stops dispatch; a fatal error cancels `parent`.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.quit = parent.child_token();
        self.fatal = FatalErrorHandler::new(Some(parent.clone()), None);
        self
    }

    /// Replace the fatal error handler
    pub fn with_fatal_handler(mut self, fatal: FatalErrorHandler) -> Self {
        self.fatal = fatal;
        self
    }

    /// Install a callback for the first fatal error, keeping the
    /// process shutdown token (if any)
    pub fn on_fatal(mut self, parent: Option<&CancellationToken>, hook: FatalHook) -> Self {
        self.fatal = FatalErrorHandler::new(parent.cloned(), Some(hook));
        self
    }

    /// Register consumers into a new queue; they are notified in order.
    ///
    /// # Errors
    /// `AlreadyStarted`/`Stopped` after `start`, `DuplicateConsumer` if a
    /// consumer instance is already registered.
    pub fn register_queue(
        &mut self,
        consumers: Vec<Arc<dyn Consumer>>,
    ) -> Result<QueueId, DispatchError> {
        self.ensure_unstarted()?;

        let qid = QueueId(self.counter + 1);
        for (idx, consumer) in consumers.iter().enumerate() {
            if let Some(existing) = self.queues.values().find(|q| q.contains(consumer)) {
                return Err(DispatchError::DuplicateConsumer {
                    consumer: consumer.name().to_string(),
                    queue_id: existing.id(),
                });
            }
            if consumers[..idx].iter().any(|c| same_consumer(c, consumer)) {
                return Err(DispatchError::DuplicateConsumer {
                    consumer: consumer.name().to_string(),
                    queue_id: qid,
                });
            }
        }

        self.counter += 1;
        info!(
            queue_id = %qid,
            consumers = consumers.len(),
            "Registered queue with blockbeat consumers"
        );
        for consumer in &consumers {
            debug!(consumer = consumer.name(), queue_id = %qid, "Consumer registered");
        }

        self.queues.insert(qid, ConsumerQueue::new(qid, consumers));
        Ok(qid)
    }

    /// Fetch the current tip once and seed every consumer with it.
    ///
    /// Returns without seeding if shutdown is signalled first. Must be
    /// called before `start`, and seeds at most once (`AlreadySeeded`).
    #[instrument(name = "dispatcher_set_initial_beat", skip(self))]
    pub async fn set_initial_beat(&mut self) -> Result<(), DispatchError> {
        self.ensure_unstarted()?;
        if self.seeded {
            return Err(DispatchError::AlreadySeeded);
        }

        let mut epochs = self
            .notifier
            .register_block_epoch_ntfn(None)
            .await
            .map_err(DispatchError::Subscription)?;

        let best = tokio::select! {
            epoch = epochs.recv() => Some(epoch),
            _ = self.quit.cancelled() => None,
        };
        epochs.cancel();

        let best = match best {
            None => {
                debug!("Shutdown signalled before initial block arrived");
                return Ok(());
            }
            Some(None) => return Err(DispatchError::SourceClosed),
            Some(Some(epoch)) => epoch,
        };

        info!(height = best.height, hash = %best.hash, "Received initial block");

        let beat = Beat::new(best);
        let mut seeded = 0;
        for queue in self.queues.values() {
            for consumer in queue.consumers() {
                consumer.seed_beat(&beat);
                seeded += 1;
            }
        }
        self.metrics.record_seeded(seeded);
        self.beat.send_replace(Some(beat));
        self.seeded = true;

        Ok(())
    }

    /// Subscribe to new blocks and spawn the dispatch loop.
    ///
    /// Returns once the loop is running; does not wait for a beat. If an
    /// initial beat was set, the subscription resumes above its height.
    ///
    /// # Errors
    /// `NoConsumers` if no queue is registered, `Subscription` if the block
    /// source refuses the client.
    #[instrument(name = "dispatcher_start", skip(self))]
    pub async fn start(&mut self) -> Result<(), DispatchError> {
        self.ensure_unstarted()?;

        if self.queues.is_empty() {
            return Err(DispatchError::NoConsumers);
        }

        let resume_from = self.beat.borrow().as_ref().map(Beat::epoch);
        let epochs = self
            .notifier
            .register_block_epoch_ntfn(resume_from)
            .await
            .map_err(DispatchError::Subscription)?;

        info!(
            queues = self.queues.len(),
            resume_from = resume_from.map(|e| e.height),
            "BlockbeatDispatcher is starting"
        );

        let dispatch_loop = DispatchLoop {
            queues: self.queues.values().cloned().collect(),
            beat: Arc::clone(&self.beat),
            quit: self.quit.clone(),
            fatal: self.fatal.clone(),
            metrics: Arc::clone(&self.metrics),
            process_timeout: self.config.process_timeout,
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(
            dispatch_loop
                .run(epochs, ready_tx)
                .instrument(info_span!("blockbeat_dispatcher")),
        );
        self.loop_handle = Some(handle);
        self.state = DispatcherState::Running;

        ready_rx.await.map_err(|_| {
            DispatchError::LoopTerminated("dispatch loop exited before it was ready".into())
        })?;

        debug!("BlockbeatDispatcher started");
        Ok(())
    }

    /// Signal shutdown and wait for the dispatch loop to exit.
    ///
    /// In-flight consumer calls run to completion first.
    #[instrument(name = "dispatcher_stop", skip(self))]
    pub async fn stop(&mut self) {
        info!("BlockbeatDispatcher is stopping");
        self.quit.cancel();
        self.join().await;
        debug!("BlockbeatDispatcher stopped");
    }

    /// Wait for the dispatch loop to exit on its own (source closed or
    /// fatal error)
    ///
    /// Cancel safe: the loop handle is kept until the loop has exited.
    pub async fn join(&mut self) {
        if let Some(handle) = self.loop_handle.as_mut() {
            let result = handle.await;
            self.loop_handle = None;
            if let Err(e) = result {
                error!(error = %e, "Dispatch loop task panicked");
                self.fatal
                    .trigger(DispatchError::LoopTerminated(e.to_string()));
            }
        }
        self.state = DispatcherState::Stopped;
    }

    /// Token observed by every wait inside the dispatcher
    pub fn shutdown_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// The current beat (None before the first block)
    pub fn current_beat(&self) -> Option<Beat> {
        self.beat.borrow().clone()
    }

    /// Watch beat replacements
    pub fn subscribe_beats(&self) -> watch::Receiver<Option<Beat>> {
        self.beat.subscribe()
    }

    /// Registered queues in id order
    pub fn queues(&self) -> impl Iterator<Item = &ConsumerQueue> {
        self.queues.values()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn fatal_handler(&self) -> &FatalErrorHandler {
        &self.fatal
    }

    /// First fatal error, if dispatch halted on one
    pub fn fatal_error(&self) -> Option<Arc<DispatchError>> {
        self.fatal.error()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared counters, updated live by the dispatch loop
    pub fn metrics_handle(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }

    fn ensure_unstarted(&self) -> Result<(), DispatchError> {
        match self.state {
            DispatcherState::Unstarted => Ok(()),
            DispatcherState::Running => Err(DispatchError::AlreadyStarted),
            DispatcherState::Stopped => Err(DispatchError::Stopped),
        }
    }
}

/// State moved into the dispatch loop task
struct DispatchLoop {
    queues: Vec<ConsumerQueue>,
    beat: Arc<watch::Sender<Option<Beat>>>,
    quit: CancellationToken,
    fatal: FatalErrorHandler,
    metrics: Arc<DispatchMetrics>,
    process_timeout: Option<Duration>,
}

/// Outcome of waiting on the per-round barrier
enum RoundEvent {
    Joined(Option<Result<(QueueId, Result<(), DispatchError>), JoinError>>),
    Shutdown,
}

impl DispatchLoop {
    async fn run(self, mut epochs: BlockEpochEvent, ready: oneshot::Sender<()>) {
        let _ = ready.send(());

        loop {
            let next = tokio::select! {
                biased;
                _ = self.quit.cancelled() => {
                    debug!("BlockbeatDispatcher quit signal received");
                    break;
                }
                epoch = epochs.recv() => epoch,
            };

            let Some(epoch) = next else {
                debug!("Block epoch channel closed");
                break;
            };

            info!(
                height = epoch.height,
                hash = %epoch.hash,
                "Received new block, notifying consumers"
            );

            let started = Instant::now();
            let beat = Beat::new(epoch);
            self.beat.send_replace(Some(beat.clone()));
            self.metrics.record_beat(epoch.height);

            match self.notify_queues(&beat).instrument(beat.span().clone()).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    self.metrics.record_round_completed(elapsed);
                    info!(
                        parent: beat.span(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Notified all consumers on new block"
                    );
                }
                Err(err) => {
                    self.metrics.record_round_failed();
                    self.fatal.trigger(err);
                    break;
                }
            }
        }

        epochs.cancel();
    }

    /// Run one dispatch round: every queue in parallel, then a full barrier.
    async fn notify_queues(&self, beat: &Beat) -> Result<(), DispatchError> {
        let mut tasks = JoinSet::new();
        let mut task_queues: BTreeMap<Id, QueueId> = BTreeMap::new();

        for queue in &self.queues {
            debug!(
                queue_id = %queue.id(),
                consumers = queue.len(),
                "Notifying queue"
            );

            let qid = queue.id();
            let queue = queue.clone();
            let round_beat = beat.clone();
            let timeout = self.process_timeout;
            let handle = tasks.spawn(
                async move {
                    let result = queue.dispatch_sequential(&round_beat, timeout).await;
                    (qid, result)
                }
                .instrument(beat.span().clone()),
            );
            task_queues.insert(handle.id(), qid);
        }

        let mut first_error: Option<DispatchError> = None;
        let mut draining = false;

        while !tasks.is_empty() {
            let event = if draining {
                RoundEvent::Joined(tasks.join_next().await)
            } else {
                tokio::select! {
                    joined = tasks.join_next() => RoundEvent::Joined(joined),
                    _ = self.quit.cancelled() => RoundEvent::Shutdown,
                }
            };

            let joined = match event {
                RoundEvent::Shutdown => {
                    debug!(
                        pending = tasks.len(),
                        "Shutdown observed mid-round, waiting for in-flight queues"
                    );
                    draining = true;
                    continue;
                }
                RoundEvent::Joined(None) => break,
                RoundEvent::Joined(Some(joined)) => joined,
            };

            let (qid, result) = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let qid = task_queues
                        .get(&join_err.id())
                        .copied()
                        .unwrap_or(QueueId(0));
                    let err = DispatchError::TaskPanicked {
                        height: beat.height(),
                        message: join_err.to_string(),
                    };
                    (qid, Err(err))
                }
            };

            match result {
                Ok(()) => {
                    observability::record_queue_dispatched(qid.get(), true);
                    debug!(queue_id = %qid, "Notified queue");
                }
                Err(err) => {
                    observability::record_queue_dispatched(qid.get(), false);
                    error!(
                        severity = "critical",
                        queue_id = %qid,
                        error = %err,
                        "Queue failed to process block"
                    );
                    first_error.get_or_insert(DispatchError::Queue {
                        queue_id: qid,
                        height: beat.height(),
                        source: Box::new(err),
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Create a consumer from configuration
#[instrument(
    name = "dispatcher_create_consumer",
    skip(config),
    fields(consumer = %config.name, consumer_type = ?config.consumer_type)
)]
pub fn create_consumer(config: &ConsumerConfig) -> Result<Arc<dyn Consumer>, DispatchError> {
    match config.consumer_type {
        ConsumerType::Log => {
            let mut consumer = LogConsumer::new(&config.name);
            if let Some(delay) = config.params.get("delay_ms") {
                let ms: u64 = delay.parse().map_err(|_| {
                    DispatchError::consumer_creation(&config.name, format!("invalid delay_ms '{delay}'"))
                })?;
                consumer = consumer.with_delay(Duration::from_millis(ms));
            }
            Ok(Arc::new(consumer))
        }
        ConsumerType::Fault => {
            let height = config
                .params
                .get("fail_at_height")
                .ok_or_else(|| DispatchError::consumer_creation(&config.name, "missing fail_at_height"))?;
            let height: u32 = height.parse().map_err(|_| {
                DispatchError::consumer_creation(
                    &config.name,
                    format!("invalid fail_at_height '{height}'"),
                )
            })?;
            Ok(Arc::new(FaultConsumer::new(&config.name, height)))
        }
    }
}

/// Convenience function to build a dispatcher with the blueprint's queues
/// registered in order
#[instrument(name = "dispatcher_create", skip(notifier, blueprint))]
pub fn create_dispatcher<N>(
    notifier: N,
    blueprint: &NodeBlueprint,
) -> Result<BlockbeatDispatcher<N>, DispatchError>
where
    N: BlockSource + Sync,
{
    let config = DispatcherConfig {
        process_timeout: blueprint.dispatcher.process_timeout(),
    };
    let mut dispatcher = BlockbeatDispatcher::with_config(notifier, config);

    for queue in &blueprint.queues {
        let consumers = queue
            .consumers
            .iter()
            .map(create_consumer)
            .collect::<Result<Vec<_>, _>>()?;
        let qid = dispatcher.register_queue(consumers)?;
        debug!(queue = %queue.name, queue_id = %qid, "Queue created from blueprint");
    }

    Ok(dispatcher)
}
