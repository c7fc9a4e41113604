//! Layered error definitions
//!
//! Categorized by source: config / block source / consumer

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Block Source Errors =====
    /// The block source refused a subscription
    #[error("block epoch subscription failed: {message}")]
    Subscription { message: String },

    /// A block was connected at or below the current tip
    #[error("block at height {height} does not extend tip {tip}")]
    BlockOutOfOrder { tip: u32, height: u32 },

    /// The block source closed before delivering an epoch
    #[error("block source closed")]
    SourceClosed,

    // ===== Consumer Errors =====
    /// Consumer failed to process a beat
    #[error("consumer '{consumer}' error: {message}")]
    Consumer { consumer: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create subscription error
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription {
            message: message.into(),
        }
    }

    /// Create consumer processing error
    pub fn consumer(consumer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consumer {
            consumer: consumer.into(),
            message: message.into(),
        }
    }
}
