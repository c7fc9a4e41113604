//! Consumer queues - sequential notification within a queue

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{Beat, Consumer};
use tokio::task::JoinSet;
use tracing::{debug, trace, Instrument};

use crate::error::DispatchError;

/// Queue identifier, unique within one dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub(crate) u32);

impl QueueId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of consumers notified one after another.
///
/// Cloning shares the consumer list.
#[derive(Clone)]
pub struct ConsumerQueue {
    id: QueueId,
    consumers: Arc<[Arc<dyn Consumer>]>,
}

impl ConsumerQueue {
    pub(crate) fn new(id: QueueId, consumers: Vec<Arc<dyn Consumer>>) -> Self {
        Self {
            id,
            consumers: consumers.into(),
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Consumers in registration order
    pub fn consumers(&self) -> &[Arc<dyn Consumer>] {
        &self.consumers
    }

    pub fn consumer_names(&self) -> Vec<&str> {
        self.consumers.iter().map(|c| c.name()).collect()
    }

    pub(crate) fn contains(&self, consumer: &Arc<dyn Consumer>) -> bool {
        self.consumers.iter().any(|c| same_consumer(c, consumer))
    }

    /// Notify every consumer of this queue in registration order
    pub async fn dispatch_sequential(
        &self,
        beat: &Beat,
        timeout: Option<Duration>,
    ) -> Result<(), DispatchError> {
        dispatch_sequential(&self.consumers, beat, timeout).await
    }
}

impl fmt::Debug for ConsumerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerQueue")
            .field("id", &self.id)
            .field("consumers", &self.consumer_names())
            .finish()
    }
}

/// Pointer identity of two consumer handles
pub(crate) fn same_consumer(a: &Arc<dyn Consumer>, b: &Arc<dyn Consumer>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Notify consumers one by one, stopping at the first error.
///
/// Consumers after the failing one do not see this beat.
pub async fn dispatch_sequential(
    consumers: &[Arc<dyn Consumer>],
    beat: &Beat,
    timeout: Option<Duration>,
) -> Result<(), DispatchError> {
    for consumer in consumers {
        notify_consumer(consumer.as_ref(), beat, timeout).await?;
    }
    Ok(())
}

/// Notify all consumers in parallel and wait for every one of them.
///
/// Returns the first error observed once all calls have returned.
pub async fn dispatch_concurrent(
    consumers: &[Arc<dyn Consumer>],
    beat: &Beat,
    timeout: Option<Duration>,
) -> Result<(), DispatchError> {
    let mut tasks = JoinSet::new();
    for consumer in consumers {
        let consumer = Arc::clone(consumer);
        let beat = beat.clone();
        let span = beat.span().clone();
        tasks.spawn(
            async move { notify_consumer(consumer.as_ref(), &beat, timeout).await }
                .instrument(span),
        );
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| DispatchError::TaskPanicked {
            height: beat.height(),
            message: e.to_string(),
        });
        if let Err(err) = result.and_then(|r| r) {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn notify_consumer(
    consumer: &dyn Consumer,
    beat: &Beat,
    timeout: Option<Duration>,
) -> Result<(), DispatchError> {
    let name = consumer.name();
    let height = beat.height();
    let started = Instant::now();

    trace!(consumer = name, height, "notifying consumer");

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, consumer.process_beat(beat)).await {
            Ok(result) => result,
            Err(_) => {
                observability::record_consumer_processed(name, started.elapsed(), false);
                return Err(DispatchError::ProcessTimeout {
                    consumer: name.to_string(),
                    height,
                    timeout: limit,
                });
            }
        },
        None => consumer.process_beat(beat).await,
    };

    let elapsed = started.elapsed();
    observability::record_consumer_processed(name, elapsed, result.is_ok());

    result.map_err(|source| DispatchError::ConsumerFailed {
        consumer: name.to_string(),
        height,
        source,
    })?;

    debug!(
        consumer = name,
        height,
        elapsed_us = elapsed.as_micros() as u64,
        "consumer processed beat"
    );
    Ok(())
}
