#![forbid(unsafe_code)]
//! Full node: restores the chain, optionally mines, serves the REST API.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use emberchain::api;
use emberchain::config::load_config;
use emberchain::crypto::address_to_hex;
use emberchain::node::Node;

#[derive(Parser)]
#[command(name = "ember-node", about = "Emberchain full node")]
struct Args {
    /// Path to the TOML config file. A missing file means built-in defaults.
    #[arg(short, long, default_value = "ember.toml")]
    config: String,

    /// Start mining regardless of the config flag.
    #[arg(long)]
    mine: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    let mine = args.mine || config.mining.enabled;

    let node = Arc::new(Node::init(config)?);
    info!("Node address: {}", address_to_hex(&node.address()));

    if mine {
        node.start_mining();
    }

    let api_node = node.clone();
    let server = tokio::spawn(async move {
        if let Err(err) = api::serve(api_node).await {
            error!("API server failed: {}", err);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    node.stop_mining();
    server.abort();

    Ok(())
}
