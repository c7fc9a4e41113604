//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Blockbeat - block-driven fan-out dispatcher
#[derive(Parser, Debug)]
#[command(
    name = "blockbeat",
    author,
    version,
    about = "Block-driven fan-out dispatcher",
    long_about = "Runs a blockbeat node: a synthetic block source feeding a dispatcher.\n\n\
                  Every new block is delivered to each configured consumer queue. Queues \n\
                  run concurrently, consumers within a queue run in order, and any \n\
                  consumer error halts the node."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BLOCKBEAT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "BLOCKBEAT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the block source and dispatcher
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "blockbeat.toml", env = "BLOCKBEAT_CONFIG")]
    pub config: PathBuf,

    /// Override the number of blocks to mine (0 = unlimited)
    #[arg(long, env = "BLOCKBEAT_MAX_BLOCKS")]
    pub max_blocks: Option<u64>,

    /// Override the block interval in milliseconds
    #[arg(long, env = "BLOCKBEAT_BLOCK_INTERVAL_MS")]
    pub block_interval_ms: Option<u64>,

    /// Node timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "BLOCKBEAT_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running the node
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BLOCKBEAT_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "blockbeat.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "blockbeat.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show consumer parameters
    #[arg(long)]
    pub params: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "blockbeat",
            "-v",
            "run",
            "--config",
            "node.toml",
            "--max-blocks",
            "5",
            "--timeout",
            "30",
        ]);

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("node.toml"));
                assert_eq!(args.max_blocks, Some(5));
                assert_eq!(args.block_interval_ms, None);
                assert_eq!(args.timeout, 30);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["blockbeat", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
