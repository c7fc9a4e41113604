//! FaultConsumer - fails at a configured height

use async_trait::async_trait;
use contracts::{Beat, Consumer, ContractError};
use tracing::warn;

/// Consumer that fails every beat at or above `fail_at_height`.
///
/// Used to exercise fatal escalation end to end.
pub struct FaultConsumer {
    name: String,
    fail_at_height: u32,
}

impl FaultConsumer {
    pub fn new(name: impl Into<String>, fail_at_height: u32) -> Self {
        Self {
            name: name.into(),
            fail_at_height,
        }
    }
}

#[async_trait]
impl Consumer for FaultConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_beat(&self, beat: &Beat) -> Result<(), ContractError> {
        if beat.height() >= self.fail_at_height {
            warn!(consumer = %self.name, height = beat.height(), "injected fault");
            return Err(ContractError::consumer(
                &self.name,
                format!("injected fault at height {}", beat.height()),
            ));
        }
        Ok(())
    }

    fn seed_beat(&self, _beat: &Beat) {}
}
