//! Configuration validation
//!
//! Rules:
//! - field constraints declared on the blueprint types
//! - at least one queue, every queue non-empty
//! - queue names unique
//! - consumer names unique across all queues (a consumer lives in one queue)
//! - type-specific consumer params parse
//! - process timeout, when set, is positive

use std::collections::HashSet;

use contracts::{ConsumerConfig, ConsumerType, ContractError, NodeBlueprint};
use ::validator::Validate;

/// Validate a NodeBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_queues_present(blueprint)?;
    validate_queue_names(blueprint)?;
    validate_consumer_names(blueprint)?;
    validate_consumer_params(blueprint)?;
    validate_dispatcher(blueprint)?;
    Ok(())
}

fn validate_fields(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

fn validate_queues_present(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    if blueprint.queues.is_empty() {
        return Err(ContractError::config_validation(
            "queues",
            "at least one consumer queue is required",
        ));
    }
    for queue in &blueprint.queues {
        if queue.consumers.is_empty() {
            return Err(ContractError::config_validation(
                format!("queues[name={}].consumers", queue.name),
                "queue has no consumers",
            ));
        }
    }
    Ok(())
}

fn validate_queue_names(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for queue in &blueprint.queues {
        if !seen.insert(&queue.name) {
            return Err(ContractError::config_validation(
                format!("queues[name={}]", queue.name),
                "duplicate queue name",
            ));
        }
    }
    Ok(())
}

/// Consumer names are unique across every queue
fn validate_consumer_names(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for queue in &blueprint.queues {
        for consumer in &queue.consumers {
            if !seen.insert(&consumer.name) {
                return Err(ContractError::config_validation(
                    format!("queues[{}].consumers[name={}]", queue.name, consumer.name),
                    "duplicate consumer name",
                ));
            }
        }
    }
    Ok(())
}

fn validate_consumer_params(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    for queue in &blueprint.queues {
        for consumer in &queue.consumers {
            check_params(&queue.name, consumer)?;
        }
    }
    Ok(())
}

fn check_params(queue: &str, consumer: &ConsumerConfig) -> Result<(), ContractError> {
    let field = |key: &str| format!("queues[{}].consumers[{}].params.{key}", queue, consumer.name);

    match consumer.consumer_type {
        ConsumerType::Log => {
            if let Some(delay) = consumer.params.get("delay_ms") {
                delay.parse::<u64>().map_err(|_| {
                    ContractError::config_validation(
                        field("delay_ms"),
                        format!("expected milliseconds, got '{delay}'"),
                    )
                })?;
            }
        }
        ConsumerType::Fault => {
            let height = consumer.params.get("fail_at_height").ok_or_else(|| {
                ContractError::config_validation(
                    field("fail_at_height"),
                    "fault consumer requires fail_at_height",
                )
            })?;
            height.parse::<u32>().map_err(|_| {
                ContractError::config_validation(
                    field("fail_at_height"),
                    format!("expected block height, got '{height}'"),
                )
            })?;
        }
    }
    Ok(())
}

fn validate_dispatcher(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    if blueprint.dispatcher.process_timeout_ms == Some(0) {
        return Err(ContractError::config_validation(
            "dispatcher.process_timeout_ms",
            "process timeout must be > 0 when set",
        ));
    }
    Ok(())
}
