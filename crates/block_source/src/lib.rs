//! # Block Source
//!
//! In-process providers of ordered new-block notifications.
//!
//! - `ChainNotifier`: tip tracking and subscriber fan-out, implements `BlockSource`
//! - `BlockProducer`: mines a synthetic hash-linked chain into a notifier

mod notifier;
mod producer;

pub use contracts::{BlockEpoch, BlockEpochEvent, BlockSource};
pub use notifier::{ChainNotifier, DEFAULT_HISTORY_LIMIT};
pub use producer::{next_epoch, BlockProducer, ProducerConfig};
