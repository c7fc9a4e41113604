//! Consumer trait - dispatcher output interface

use async_trait::async_trait;

use crate::{Beat, ContractError};

/// A subsystem that reacts to every new block.
///
/// Consumers are registered into a queue before the dispatcher starts and
/// are shared with the dispatcher as `Arc<dyn Consumer>`.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Stable name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Process one beat to completion.
    ///
    /// The next beat is not delivered until every queue has returned from
    /// this one.
    ///
    /// # Errors
    /// Any error is escalated by the dispatcher as fatal.
    async fn process_beat(&self, beat: &Beat) -> Result<(), ContractError>;

    /// Seed the consumer's current beat during startup.
    ///
    /// Called at most once, before steady-state dispatch. Must not block.
    fn seed_beat(&self, beat: &Beat);
}
