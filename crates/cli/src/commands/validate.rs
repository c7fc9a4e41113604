//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ConsumerType, NodeBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    queue_count: usize,
    consumer_count: usize,
    start_height: u32,
    max_blocks: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match super::load_blueprint(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    queue_count: blueprint.queues.len(),
                    consumer_count: blueprint.consumer_count(),
                    start_height: blueprint.source.start_height,
                    max_blocks: blueprint.source.max_blocks,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("{:#}", e)),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &NodeBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for queue in &blueprint.queues {
        for consumer in &queue.consumers {
            if consumer.consumer_type == ConsumerType::Fault {
                let height = consumer
                    .params
                    .get("fail_at_height")
                    .map(String::as_str)
                    .unwrap_or("?");
                warnings.push(format!(
                    "Consumer '{}' in queue '{}' is a fault consumer - the node halts at height {}",
                    consumer.name, queue.name, height
                ));
            }
        }
    }

    if blueprint.source.max_blocks == 0 && blueprint.dispatcher.process_timeout_ms.is_none() {
        warnings.push(
            "Unlimited block source with no process timeout - a stuck consumer stalls every queue"
                .to_string(),
        );
    }

    if !blueprint.dispatcher.set_initial_beat {
        warnings.push("dispatcher.set_initial_beat is false - consumers start without a seed beat".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Queues: {}", summary.queue_count);
            println!("  Consumers: {}", summary.consumer_count);
            println!("  Start height: {}", summary.start_height);
            println!("  Max blocks: {}", summary.max_blocks);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_fault_warning() {
        let file = write_config(
            r#"
[source]
max_blocks = 10

[[queues]]
name = "chain"

[[queues.consumers]]
name = "drill"
consumer_type = "fault"
params = { fail_at_height = "5" }
"#,
        );

        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });

        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("halts at height 5")));
        assert_eq!(result.summary.unwrap().consumer_count, 1);
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_config(&ValidateArgs {
            config: "/nonexistent/blockbeat.toml".into(),
            json: true,
        });

        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }
}
