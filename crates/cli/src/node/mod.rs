//! Node orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Node, NodeConfig};
pub use stats::NodeStats;
