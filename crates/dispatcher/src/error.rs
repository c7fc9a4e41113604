//! Dispatcher error types

use std::time::Duration;

use contracts::ContractError;
use thiserror::Error;

use crate::queue::QueueId;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `start` called with no registered queue
    #[error("no consumers registered")]
    NoConsumers,

    /// Registration or startup after the dispatcher started
    #[error("dispatcher already started")]
    AlreadyStarted,

    /// A stopped dispatcher cannot be reused
    #[error("dispatcher is stopped")]
    Stopped,

    /// `set_initial_beat` already seeded the consumers
    #[error("initial beat already set")]
    AlreadySeeded,

    /// The same consumer instance registered twice
    #[error("consumer '{consumer}' is already registered in queue {queue_id}")]
    DuplicateConsumer { consumer: String, queue_id: QueueId },

    /// Block source rejected the subscription
    #[error("register block epoch ntfn: {0}")]
    Subscription(#[source] ContractError),

    /// Block source closed before delivering the current tip
    #[error("block source closed before delivering the current tip")]
    SourceClosed,

    /// Consumer returned an error from `process_beat`
    #[error("consumer '{consumer}' failed to process block at height {height}: {source}")]
    ConsumerFailed {
        consumer: String,
        height: u32,
        #[source]
        source: ContractError,
    },

    /// Consumer exceeded the configured processing timeout
    #[error("consumer '{consumer}' did not process block at height {height} within {timeout:?}")]
    ProcessTimeout {
        consumer: String,
        height: u32,
        timeout: Duration,
    },

    /// A spawned notification task panicked
    #[error("notification task panicked at height {height}: {message}")]
    TaskPanicked { height: u32, message: String },

    /// A queue failed during a dispatch round
    #[error("queue {queue_id} failed to process block at height {height}: {source}")]
    Queue {
        queue_id: QueueId,
        height: u32,
        #[source]
        source: Box<DispatchError>,
    },

    /// Consumer creation from configuration failed
    #[error("failed to create consumer '{name}': {message}")]
    ConsumerCreation { name: String, message: String },

    /// The dispatch loop task died unexpectedly
    #[error("dispatch loop terminated unexpectedly: {0}")]
    LoopTerminated(String),
}

impl DispatchError {
    /// Create a consumer creation error
    pub fn consumer_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConsumerCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
