//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)，默认只放开 blockbeat 各 crate 的日志
//! - Prometheus 指标导出
//! - Blockbeat 分发指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_config, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig {
//!     log_level: "debug".into(),
//!     ..Default::default()
//! })?;
//!
//! // 每轮分发
//! observability::record_beat_received(epoch.height);
//! observability::record_round_duration(started.elapsed());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_beat_received, record_consumer_processed, record_fatal_error, record_queue_dispatched,
    record_round_duration, DispatchStatsAggregator, MetricsSummary, RunningStats, StatsSummary,
};

/// Crates whose logs follow the configured level; everything else is `warn`
const BLOCKBEAT_TARGETS: &[&str] = &[
    "blockbeat",
    "dispatcher",
    "block_source",
    "config_loader",
    "lnwire",
    "observability",
];

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// blockbeat 各 crate 的日志级别，`RUST_LOG` 优先
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// Default filter directive: `warn` globally, `level` for blockbeat crates.
///
/// `blockbeat_filter("debug")` yields `warn,blockbeat=debug,dispatcher=debug,...`.
pub fn blockbeat_filter(level: &str) -> String {
    let mut directive = String::from("warn");
    for target in BLOCKBEAT_TARGETS {
        directive.push(',');
        directive.push_str(target);
        directive.push('=');
        directive.push_str(level);
    }
    directive
}

/// 初始化 tracing 订阅器，并按需启动 Prometheus 导出
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(blockbeat_filter(&config.log_level)))
        .with_context(|| format!("Invalid log level '{}'", config.log_level))?;

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::info!(
        service = "blockbeat",
        version = env!("CARGO_PKG_VERSION"),
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由 CLI 初始化、运行时才决定端口的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_prometheus(port)
}

fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;

    tracing::info!(port, "Prometheus endpoint serving blockbeat_* metrics");
    Ok(())
}
