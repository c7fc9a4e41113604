//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::NodeBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    source: SourceInfo,
    dispatcher: DispatcherInfo,
    queues: Vec<QueueInfo>,
}

#[derive(Serialize)]
struct SourceInfo {
    start_height: u32,
    block_interval_ms: u64,
    max_blocks: u64,
    buffer_size: usize,
}

#[derive(Serialize)]
struct DispatcherInfo {
    set_initial_beat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct QueueInfo {
    name: String,
    consumers: Vec<ConsumerInfo>,
}

#[derive(Serialize)]
struct ConsumerInfo {
    name: String,
    consumer_type: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = super::load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &NodeBlueprint, args: &InfoArgs) -> ConfigInfo {
    let queues = blueprint
        .queues
        .iter()
        .map(|q| QueueInfo {
            name: q.name.clone(),
            consumers: q
                .consumers
                .iter()
                .map(|c| ConsumerInfo {
                    name: c.name.clone(),
                    consumer_type: format!("{:?}", c.consumer_type),
                    params: if args.params {
                        c.params.clone()
                    } else {
                        HashMap::new()
                    },
                })
                .collect(),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        source: SourceInfo {
            start_height: blueprint.source.start_height,
            block_interval_ms: blueprint.source.block_interval_ms,
            max_blocks: blueprint.source.max_blocks,
            buffer_size: blueprint.source.buffer_size,
        },
        dispatcher: DispatcherInfo {
            set_initial_beat: blueprint.dispatcher.set_initial_beat,
            process_timeout_ms: blueprint.dispatcher.process_timeout_ms,
        },
        queues,
    }
}

fn print_config_info(blueprint: &NodeBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Blockbeat Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let source = &blueprint.source;
    println!("⛓  Block Source");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Start height: {}", source.start_height);
    println!("   ├─ Block interval: {} ms", source.block_interval_ms);
    println!("   ├─ Buffer size: {}", source.buffer_size);
    match source.max_blocks {
        0 => println!("   └─ Max blocks: unlimited"),
        n => println!("   └─ Max blocks: {}", n),
    }

    println!("\n📬 Queues ({})", blueprint.queues.len());
    for (i, queue) in blueprint.queues.iter().enumerate() {
        let is_last = i == blueprint.queues.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({} consumers)", prefix, queue.name, queue.consumers.len());

        for (j, consumer) in queue.consumers.iter().enumerate() {
            let consumer_prefix = if j == queue.consumers.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            if args.params && !consumer.params.is_empty() {
                let mut params: Vec<String> = consumer
                    .params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                params.sort();
                println!(
                    "   {}  {} {} ({:?}, {})",
                    child_prefix,
                    consumer_prefix,
                    consumer.name,
                    consumer.consumer_type,
                    params.join(", ")
                );
            } else {
                println!(
                    "   {}  {} {} ({:?})",
                    child_prefix, consumer_prefix, consumer.name, consumer.consumer_type
                );
            }
        }
    }

    let dispatcher = &blueprint.dispatcher;
    println!("\n⚙️  Dispatcher");
    println!("   ├─ Set initial beat: {}", dispatcher.set_initial_beat);
    match dispatcher.process_timeout_ms {
        Some(ms) => println!("   └─ Process timeout: {} ms", ms),
        None => println!("   └─ Process timeout: none"),
    }

    println!();
}
