use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use econos_pipeline::PlanOptions;
use econos_types::Wei;
use std::path::PathBuf;
use std::sync::Arc;

mod api;
mod config;
mod logging;
mod node;

use config::EconosConfig;
use node::EconosNode;

#[derive(Parser)]
#[command(name = "econos")]
#[command(about = "Econos Master - machine-to-machine marketplace orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "econos.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the master node (event stream, sweeper, HTTP API)
    Start,

    /// Plan a request against the current capability cache without
    /// executing or touching the chain
    Plan {
        /// Free-form request text
        request: String,

        /// Budget ceiling in ether
        #[arg(long)]
        max_budget_ether: Option<f64>,
    },

    /// Print the aggregated worker capability summary
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EconosConfig::load(&cli.config)?;
    logging::init_logging(&config.logging);

    match cli.command {
        Commands::Start => {
            let node = Arc::new(EconosNode::new(config)?);
            node.run().await
        }

        Commands::Plan {
            request,
            max_budget_ether,
        } => {
            let node = Arc::new(EconosNode::new(config)?);
            node.index.refresh().await;

            let options = PlanOptions {
                max_budget: max_budget_ether.map(Wei::from_ether),
                duration_secs: None,
            };
            let plan = node
                .planner
                .plan(&request, &options)
                .await
                .context("planning failed")?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }

        Commands::Capabilities => {
            let node = Arc::new(EconosNode::new(config)?);
            node.index.refresh().await;
            let summary = node.index.discover().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}
