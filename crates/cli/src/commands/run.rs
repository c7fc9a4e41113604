//! `run` command implementation.

use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::node::{Node, NodeConfig};

/// Execute the `run` command
pub async fn run_node(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;

    // Apply CLI overrides
    if let Some(max_blocks) = args.max_blocks {
        info!(max_blocks, "Overriding max_blocks from CLI");
        blueprint.source.max_blocks = max_blocks;
    }
    if let Some(interval_ms) = args.block_interval_ms {
        info!(interval_ms, "Overriding block interval from CLI");
        blueprint.source.block_interval_ms = interval_ms;
    }
    config_loader::ConfigLoader::validate(&blueprint)?;

    info!(
        start_height = blueprint.source.start_height,
        block_interval_ms = blueprint.source.block_interval_ms,
        max_blocks = blueprint.source.max_blocks,
        queues = blueprint.queues.len(),
        consumers = blueprint.consumer_count(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let node = Node::new(NodeConfig {
        blueprint,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                warn!("Received shutdown signal, stopping node...");
                signal_token.cancel();
            }
            _ = signal_token.cancelled() => {}
        }
    });

    info!("Starting node...");
    let stats = node.run(shutdown.clone()).await?;
    shutdown.cancel();

    stats.print_summary();

    if let Some(fatal) = stats.fatal {
        return Err(CliError::fatal(fatal).into());
    }

    info!("Blockbeat node finished");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::NodeBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Source:");
    println!("  Start height: {}", blueprint.source.start_height);
    println!("  Block interval: {} ms", blueprint.source.block_interval_ms);
    match blueprint.source.max_blocks {
        0 => println!("  Max blocks: unlimited"),
        n => println!("  Max blocks: {}", n),
    }

    println!("\nQueues ({}):", blueprint.queues.len());
    for queue in &blueprint.queues {
        let names: Vec<&str> = queue.consumers.iter().map(|c| c.name.as_str()).collect();
        println!("  - {} [{}]", queue.name, names.join(" -> "));
    }

    println!("\nDispatcher:");
    println!("  Set initial beat: {}", blueprint.dispatcher.set_initial_beat);
    match blueprint.dispatcher.process_timeout_ms {
        Some(ms) => println!("  Process timeout: {} ms", ms),
        None => println!("  Process timeout: none"),
    }

    println!();
}
