//! Configuration parsing
//!
//! TOML (primary) and JSON formats.

use contracts::{ContractError, NodeBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<NodeBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<NodeBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<NodeBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ConsumerType;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[source]
start_height = 100
block_interval_ms = 250

[[queues]]
name = "chain"

[[queues.consumers]]
name = "chain_arbitrator"
consumer_type = "log"

[[queues.consumers]]
name = "sweeper"
consumer_type = "log"
params = { delay_ms = "5" }
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.source.start_height, 100);
        assert_eq!(bp.queues.len(), 1);
        assert_eq!(bp.queues[0].consumers.len(), 2);
        assert_eq!(bp.queues[0].consumers[1].params["delay_ms"], "5");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "dispatcher": { "set_initial_beat": false, "process_timeout_ms": 500 },
            "queues": [{
                "name": "links",
                "consumers": [{
                    "name": "drill",
                    "consumer_type": "fault",
                    "params": { "fail_at_height": "12" }
                }]
            }]
        }"#;
        let bp = parse_json(content).unwrap();
        assert!(!bp.dispatcher.set_initial_beat);
        assert_eq!(bp.dispatcher.process_timeout_ms, Some(500));
        assert_eq!(bp.queues[0].consumers[0].consumer_type, ConsumerType::Fault);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
