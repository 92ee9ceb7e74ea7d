use std::path::PathBuf;

use bucketring::{ClusterConfig, HashRing};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bucketring")]
#[command(about = "inspect how a consistent hashing ring routes keys", long_about = None)]
struct Cli {
    #[arg(long)]
    config_path: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Prints the node and bucket of each key
    Route { keys: Vec<String> },
    /// Prints the whole bucket table
    Buckets,
    /// Prints the fallback sequence of nodes for a key
    Iter {
        key: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Prints how many buckets change owner when a node is added or removed
    Rebalance {
        #[arg(long, conflicts_with = "remove", required_unless_present = "remove")]
        add: Option<String>,
        #[arg(long)]
        remove: Option<String>,
    },
}

#[derive(Serialize)]
struct RouteOutput<'a> {
    key: &'a str,
    node: Option<String>,
    bucket: Option<usize>,
}

#[derive(Serialize)]
struct RebalanceOutput {
    buckets_number: usize,
    moved: usize,
    moved_fraction: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let config = ClusterConfig::from_path(&args.config_path)?;
    let ring = HashRing::from_config(config)?;

    match args.command {
        Commands::Route { keys } => {
            let mut output = Vec::with_capacity(keys.len());
            for key in keys.iter() {
                let routed = ring.route_with_index(key)?;
                output.push(RouteOutput {
                    key,
                    node: routed.as_ref().map(|(node, _)| node.to_string()),
                    bucket: routed.map(|(_, bucket)| bucket),
                });
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Buckets => {
            let buckets: Vec<String> = ring
                .snapshot()?
                .buckets()
                .iter()
                .map(|node| node.to_string())
                .collect();
            println!("{}", serde_json::to_string_pretty(&buckets)?);
        }
        Commands::Iter { key, limit } => {
            let nodes: Vec<String> = ring
                .iter_from_key(&key)?
                .take(limit.unwrap_or(usize::MAX))
                .map(|node| node.to_string())
                .collect();
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
        Commands::Rebalance { add, remove } => {
            let before = ring.snapshot()?.buckets();
            if let Some(node) = add {
                ring.add_node(node)?;
            } else if let Some(node) = remove {
                ring.remove_node(&node)?;
            }
            let after = ring.snapshot()?.buckets();

            // an empty table on either side means every bucket changed
            let moved = if before.len() != after.len() {
                ring.buckets_number()
            } else {
                before.iter().zip(after.iter()).filter(|(b, a)| b != a).count()
            };
            let output = RebalanceOutput {
                buckets_number: ring.buckets_number(),
                moved,
                moved_fraction: moved as f64 / ring.buckets_number() as f64,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
