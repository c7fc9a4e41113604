//! NodeBlueprint - Config Loader output
//!
//! Describes a complete blockbeat node: block source, dispatcher settings,
//! and the consumer queues to register.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete node configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NodeBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Synthetic block source settings
    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,

    /// Dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Consumer queues, registered in order
    #[validate(nested)]
    pub queues: Vec<QueueConfig>,
}

impl NodeBlueprint {
    /// Total number of consumers across all queues
    pub fn consumer_count(&self) -> usize {
        self.queues.iter().map(|q| q.consumers.len()).sum()
    }
}

/// Block source configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Height of the first mined block
    #[serde(default)]
    pub start_height: u32,

    /// Interval between mined blocks in milliseconds
    #[serde(default = "default_block_interval_ms")]
    #[validate(range(min = 1, message = "block interval must be positive"))]
    pub block_interval_ms: u64,

    /// Number of blocks to mine (0 = unlimited)
    #[serde(default)]
    pub max_blocks: u64,

    /// Per-subscriber notification buffer
    #[serde(default = "default_buffer_size")]
    #[validate(range(min = 1, message = "buffer size must be positive"))]
    pub buffer_size: usize,
}

impl SourceConfig {
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            block_interval_ms: default_block_interval_ms(),
            max_blocks: 0,
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_block_interval_ms() -> u64 {
    1000
}

fn default_buffer_size() -> usize {
    16
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Seed every consumer with the current tip before starting
    #[serde(default = "default_set_initial_beat")]
    pub set_initial_beat: bool,

    /// Per-consumer processing timeout in milliseconds (None = no timeout)
    #[serde(default)]
    pub process_timeout_ms: Option<u64>,
}

impl DispatcherSettings {
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            set_initial_beat: default_set_initial_beat(),
            process_timeout_ms: None,
        }
    }
}

fn default_set_initial_beat() -> bool {
    true
}

/// One queue of sequentially notified consumers
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueueConfig {
    /// Queue label (diagnostics only)
    #[validate(length(min = 1, message = "queue name must not be empty"))]
    pub name: String,

    /// Consumers in notification order
    #[validate(nested)]
    pub consumers: Vec<ConsumerConfig>,
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsumerConfig {
    /// Consumer name
    #[validate(length(min = 1, message = "consumer name must not be empty"))]
    pub name: String,

    /// Consumer type
    pub consumer_type: ConsumerType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Built-in consumer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerType {
    /// Logs every beat; optional `delay_ms` simulates processing time
    Log,
    /// Fails at `fail_at_height`; used for fatal-escalation drills
    Fault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = r#"{
            "queues": [{
                "name": "chain",
                "consumers": [{ "name": "arbitrator", "consumer_type": "log" }]
            }]
        }"#;
        let bp: NodeBlueprint = serde_json::from_str(json).unwrap();

        assert_eq!(bp.version, ConfigVersion::V1);
        assert_eq!(bp.source.block_interval_ms, 1000);
        assert_eq!(bp.source.buffer_size, 16);
        assert!(bp.dispatcher.set_initial_beat);
        assert_eq!(bp.dispatcher.process_timeout(), None);
        assert_eq!(bp.consumer_count(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let bp = NodeBlueprint {
            version: ConfigVersion::V1,
            source: SourceConfig {
                block_interval_ms: 0,
                ..Default::default()
            },
            dispatcher: DispatcherSettings::default(),
            queues: vec![],
        };
        assert!(bp.validate().is_err());
    }
}
