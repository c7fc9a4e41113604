//! Built-in consumer implementations

mod channel;
mod fault;
mod log;

pub use channel::{BeatConsumer, BeatReceiver, BeatRequest};
pub use fault::FaultConsumer;
pub use log::LogConsumer;
